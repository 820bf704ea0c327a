use quarry_core::ShortHash;

use crate::ring::{ring_angle_degrees, ring_distance, ring_position, EntryKind, RingEntry};

/// Smallest slot array any batch gets, regardless of symbol count.
pub const MIN_SLOT_CAPACITY: usize = 128;

/// Required slot-array size for a batch of `symbol_count` symbols.
///
/// Oversizing by 4× keeps the ring sparse enough that the greedy pass
/// converges quickly; undersizing is a structural contract violation (there
/// is no dynamic-growth fallback), enforced by [`assign_slots`].
pub fn slot_capacity_for(symbol_count: usize) -> usize {
    MIN_SLOT_CAPACITY.max(symbol_count * 4)
}

/// Tuning for [`assign_slots`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotMapConfig {
    /// Independent hash seeds per slot/symbol. Each item appears this many
    /// times on the ring.
    pub seeds: u32,
    /// Ring re-derivation rounds before non-convergence is treated as a
    /// defect. The default matches long-observed behavior; it is not a
    /// derived bound.
    pub max_rounds: u32,
    /// Emit per-pairing `tracing` diagnostics (including ring angles).
    pub trace_ring: bool,
}

impl Default for SlotMapConfig {
    fn default() -> SlotMapConfig {
        SlotMapConfig {
            seeds: 8,
            max_rounds: 5,
            trace_ring: false,
        }
    }
}

/// Result of [`assign_slots`]: one distinct slot per symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolSlotMap {
    capacity: usize,
    slots: Vec<u32>,
}

impl SymbolSlotMap {
    /// The slot array size the assignment ran against.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slot index for the `symbol_index`-th input symbol. Always in
    /// `1..capacity`.
    pub fn slot_of(&self, symbol_index: usize) -> u32 {
        self.slots[symbol_index]
    }

    /// Per-symbol slots, in input order.
    pub fn slots(&self) -> &[u32] {
        &self.slots
    }

    /// The oversized array view: for every slot, the symbol occupying it.
    /// Unassigned slots (index 0 always among them) hold `None`.
    pub fn slot_array(&self) -> Vec<Option<u32>> {
        let mut array = vec![None; self.capacity];
        for (symbol_index, slot) in self.slots.iter().enumerate() {
            array[*slot as usize] = Some(symbol_index as u32);
        }
        array
    }
}

/// Assigns every symbol a distinct slot in `1..capacity` by consistent-hash
/// proximity.
///
/// `symbols` must be distinct and `capacity` at least
/// [`slot_capacity_for`]`(symbols.len())`; both are caller contracts,
/// checked with assertions. The assignment depends only on the symbols'
/// content hashes and `capacity`, so identical inputs map identically, and
/// growing the batch tends to leave prior symbols on their slots (ring
/// proximity, not insertion order, drives pairing; this is a tendency,
/// not a guarantee).
///
/// # Panics
/// On an undersized capacity, and if any symbol is still unpaired after
/// [`SlotMapConfig::max_rounds`] rounds. Both are defects in the caller or
/// configuration, not recoverable conditions.
pub fn assign_slots(
    symbols: &[ShortHash],
    capacity: usize,
    config: &SlotMapConfig,
) -> SymbolSlotMap {
    assert!(
        capacity >= slot_capacity_for(symbols.len()),
        "slot capacity {capacity} is undersized for {} symbols",
        symbols.len()
    );
    assert!(config.seeds > 0, "at least one hash seed is required");

    let mut slot_taken = vec![false; capacity];
    let mut slot_for_symbol: Vec<Option<u32>> = vec![None; symbols.len()];
    let mut unassigned = symbols.len();

    for round in 0..config.max_rounds {
        if unassigned == 0 {
            break;
        }

        let ring = build_ring(symbols, &slot_taken, &slot_for_symbol, config);
        let mut candidates = Vec::new();
        collect_candidates(&ring, Direction::Forward, &mut candidates);
        collect_candidates(&ring, Direction::Reverse, &mut candidates);
        // Closest pairing wins first; slot and symbol indices break ties so
        // the outcome never depends on sort internals.
        candidates.sort_unstable();

        let before = unassigned;
        for Candidate {
            distance,
            slot,
            symbol,
        } in candidates
        {
            if slot_taken[slot as usize] || slot_for_symbol[symbol as usize].is_some() {
                continue;
            }
            slot_taken[slot as usize] = true;
            slot_for_symbol[symbol as usize] = Some(slot);
            unassigned -= 1;

            if config.trace_ring {
                tracing::trace!(
                    target: "quarry.refs",
                    symbol,
                    slot,
                    distance,
                    "paired symbol with slot"
                );
            }
        }

        if config.trace_ring {
            tracing::debug!(
                target: "quarry.refs",
                round,
                assigned = before - unassigned,
                remaining = unassigned,
                ring_entries = ring.len(),
                "completed assignment round"
            );
        }
    }

    assert!(
        unassigned == 0,
        "symbol slot assignment failed to converge within {} rounds \
         ({unassigned} of {} symbols unpaired at capacity {capacity})",
        config.max_rounds,
        symbols.len()
    );

    SymbolSlotMap {
        capacity,
        slots: slot_for_symbol
            .into_iter()
            .map(|slot| slot.expect("all symbols paired"))
            .collect(),
    }
}

/// Ring entries for the still-free slots and still-unpaired symbols, sorted
/// by position (ties broken by kind then index, for determinism).
fn build_ring(
    symbols: &[ShortHash],
    slot_taken: &[bool],
    slot_for_symbol: &[Option<u32>],
    config: &SlotMapConfig,
) -> Vec<RingEntry> {
    let capacity = slot_taken.len();
    let mut ring = Vec::with_capacity((capacity + symbols.len()) * config.seeds as usize);

    // Slot 0 is intentionally skipped: it stays free as the serialization
    // sentinel for "no symbol".
    for slot in 1..capacity {
        if slot_taken[slot] {
            continue;
        }
        for seed in 0..config.seeds {
            ring.push(RingEntry {
                position: ring_position(slot as u64, 0, seed),
                kind: EntryKind::Slot,
                index: slot as u32,
            });
        }
    }

    for (symbol, hash) in symbols.iter().enumerate() {
        if slot_for_symbol[symbol].is_some() {
            continue;
        }
        let (high, low) = hash.halves();
        for seed in 0..config.seeds {
            let position = ring_position(high, low, seed);
            if config.trace_ring {
                tracing::trace!(
                    target: "quarry.refs",
                    symbol,
                    seed,
                    position,
                    angle = ring_angle_degrees(position),
                    "placed symbol on ring"
                );
            }
            ring.push(RingEntry {
                position,
                kind: EntryKind::Symbol,
                index: symbol as u32,
            });
        }
    }

    ring.sort_unstable_by_key(|entry| (entry.position, entry.kind, entry.index));
    ring
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Candidate {
    distance: u64,
    slot: u32,
    symbol: u32,
}

enum Direction {
    Forward,
    Reverse,
}

/// One walk over the sorted ring.
///
/// A sliding window keeps the two most recently passed slot entries; every
/// symbol entry pairs with whatever the window holds, at the plain
/// subtraction distance (see [`ring_distance`] for why reverse-walk
/// distances wrap).
fn collect_candidates(ring: &[RingEntry], direction: Direction, out: &mut Vec<Candidate>) {
    let mut window: [Option<RingEntry>; 2] = [None, None];

    let mut visit = |entry: &RingEntry| match entry.kind {
        EntryKind::Slot => {
            window[0] = window[1];
            window[1] = Some(*entry);
        }
        EntryKind::Symbol => {
            for slot_entry in window.iter().flatten() {
                out.push(Candidate {
                    distance: ring_distance(entry.position, slot_entry.position),
                    slot: slot_entry.index,
                    symbol: entry.index,
                });
            }
        }
    };

    match direction {
        Direction::Forward => ring.iter().for_each(&mut visit),
        Direction::Reverse => ring.iter().rev().for_each(&mut visit),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbols(names: &[&str]) -> Vec<ShortHash> {
        names.iter().map(|name| ShortHash::of(name.as_bytes())).collect()
    }

    fn assert_valid(map: &SymbolSlotMap, symbol_count: usize, capacity: usize) {
        assert_eq!(map.slots().len(), symbol_count);
        let mut seen = std::collections::HashSet::new();
        for &slot in map.slots() {
            assert!(slot >= 1 && (slot as usize) < capacity, "slot {slot} out of range");
            assert!(seen.insert(slot), "slot {slot} assigned twice");
        }
    }

    #[test]
    fn every_symbol_gets_a_distinct_slot() {
        let symbols = symbols(&[
            "Widget", "Frame", "Button", "Label", "Panel", "Dialog", "Menu", "Toolbar",
        ]);
        let capacity = slot_capacity_for(symbols.len());
        let map = assign_slots(&symbols, capacity, &SlotMapConfig::default());
        assert_valid(&map, symbols.len(), capacity);
    }

    #[test]
    fn quarter_full_batches_assign_completely() {
        // N = M/4 is the densest supported load.
        let names: Vec<String> = (0..32).map(|i| format!("symbol-{i}")).collect();
        let hashes: Vec<ShortHash> = names.iter().map(|n| ShortHash::of(n.as_bytes())).collect();
        let map = assign_slots(&hashes, MIN_SLOT_CAPACITY, &SlotMapConfig::default());
        assert_valid(&map, hashes.len(), MIN_SLOT_CAPACITY);
    }

    #[test]
    fn assignment_is_deterministic() {
        let symbols = symbols(&["alpha", "beta", "gamma", "delta"]);
        let first = assign_slots(&symbols, 128, &SlotMapConfig::default());
        let second = assign_slots(&symbols, 128, &SlotMapConfig::default());
        assert_eq!(first, second);
    }

    #[test]
    fn slot_zero_is_never_assigned() {
        let names: Vec<String> = (0..32).map(|i| format!("entry-{i}")).collect();
        let hashes: Vec<ShortHash> = names.iter().map(|n| ShortHash::of(n.as_bytes())).collect();
        let map = assign_slots(&hashes, 128, &SlotMapConfig::default());
        assert!(map.slots().iter().all(|&slot| slot != 0));
        assert_eq!(map.slot_array()[0], None);
    }

    #[test]
    fn slot_array_inverts_the_mapping() {
        let symbols = symbols(&["one", "two", "three"]);
        let map = assign_slots(&symbols, 128, &SlotMapConfig::default());
        let array = map.slot_array();

        let occupied = array.iter().filter(|slot| slot.is_some()).count();
        assert_eq!(occupied, symbols.len());
        for (symbol_index, &slot) in map.slots().iter().enumerate() {
            assert_eq!(array[slot as usize], Some(symbol_index as u32));
        }
    }

    #[test]
    fn growing_the_batch_keeps_the_assignment_valid() {
        // Ring stability makes prior symbols *likely* to keep their slots
        // when the batch grows, but only validity is guaranteed, so only
        // validity is asserted.
        let small = symbols(&["A", "B", "C"]);
        let map = assign_slots(&small, 128, &SlotMapConfig::default());
        assert_valid(&map, 3, 128);

        let grown = symbols(&["A", "B", "C", "D"]);
        let regrown = assign_slots(&grown, 128, &SlotMapConfig::default());
        assert_valid(&regrown, 4, 128);
    }

    #[test]
    #[should_panic(expected = "undersized")]
    fn undersized_capacity_is_a_contract_violation() {
        let symbols = symbols(&["a", "b", "c"]);
        let _ = assign_slots(&symbols, 64, &SlotMapConfig::default());
    }

    #[test]
    fn empty_batch_yields_an_empty_map() {
        let map = assign_slots(&[], MIN_SLOT_CAPACITY, &SlotMapConfig::default());
        assert!(map.slots().is_empty());
        assert_eq!(map.capacity(), MIN_SLOT_CAPACITY);
        assert!(map.slot_array().iter().all(Option::is_none));
    }
}
