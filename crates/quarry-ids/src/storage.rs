use parking_lot::Mutex;

use quarry_core::{DocRef, PartitionedHash, SearchType, ShortHash};
use quarry_store::TypedStore;

use crate::error::Result;
use crate::header::StableIdHeader;

/// Stripes per detected hardware thread.
const STRIPES_PER_CPU: usize = 16;

/// Durable map from (search type, content hash) to stable document id, with
/// at-most-once id reservation under concurrency.
///
/// Per entity the state machine is `Unknown → Reserved → Persisted`; there
/// is no path to `Persisted` that skips reservation (apart from the
/// explicitly unsafe bulk path, [`StableIdStorage::put_unchecked`]).
///
/// Reads ([`StableIdStorage::try_get`]) never take a stripe lock; the
/// double-checked re-read inside [`StableIdStorage::try_reserve`] closes
/// the race against a concurrent reservation, with the stripe mutex
/// providing the happens-before edge for the re-check.
pub struct StableIdStorage {
    store: TypedStore<PartitionedHash, DocRef>,
    header: Mutex<StableIdHeader>,
    stripes: Box<[Mutex<()>]>,
}

impl StableIdStorage {
    /// Wraps an open store. The header carries each search type's counter
    /// and free list; the caller remains responsible for persisting it
    /// (see [`crate::save_header`]).
    pub fn new(store: TypedStore<PartitionedHash, DocRef>, header: StableIdHeader) -> StableIdStorage {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let stripe_count = (cpus * STRIPES_PER_CPU).next_power_of_two();
        let stripes = (0..stripe_count).map(|_| Mutex::new(())).collect();

        StableIdStorage {
            store,
            header: Mutex::new(header),
            stripes,
        }
    }

    /// Pure lookup; no side effects.
    pub fn try_get(&self, search_type: SearchType, hash: ShortHash) -> Result<Option<DocRef>> {
        Ok(self.store.get(&hash.partitioned(search_type))?)
    }

    /// Returns the entity's id, minting one if the pair was unseen.
    ///
    /// `created` is `true` for exactly the call that minted the id, even
    /// under concurrent callers: existence is re-checked under a lock
    /// striped by the partitioned key, so at most one caller finds the pair
    /// absent while holding the stripe.
    pub fn try_reserve(
        &self,
        search_type: SearchType,
        hash: ShortHash,
    ) -> Result<(bool, DocRef)> {
        let key = hash.partitioned(search_type);
        if let Some(existing) = self.store.get(&key)? {
            return Ok((false, existing));
        }

        let _stripe = self.stripes[self.stripe_index(&key)].lock();
        // Re-check: another caller may have persisted the pair between the
        // lock-free read above and our stripe acquisition.
        if let Some(existing) = self.store.get(&key)? {
            return Ok((false, existing));
        }

        let doc_ref = self.header.lock().allocator_mut(search_type).acquire();
        self.store.upsert(&key, &doc_ref)?;

        tracing::trace!(
            target: "quarry.ids",
            search_type = %search_type,
            doc_ref = %doc_ref,
            "reserved stable id"
        );
        Ok((true, doc_ref))
    }

    /// Unconditionally overwrites the mapping.
    ///
    /// Bulk-rehydration only (e.g. merging a previously published id
    /// space): this bypasses reservation safety, so the caller must
    /// guarantee no reservation for the same pair runs concurrently.
    pub fn put_unchecked(
        &self,
        search_type: SearchType,
        hash: ShortHash,
        doc_ref: DocRef,
    ) -> Result<()> {
        Ok(self.store.upsert(&hash.partitioned(search_type), &doc_ref)?)
    }

    /// Returns an id to its type's free list for reuse by a later
    /// reservation. The caller is responsible for having removed the
    /// entity that held it.
    pub fn release(&self, search_type: SearchType, doc_ref: DocRef) {
        self.header.lock().allocator_mut(search_type).release(doc_ref);
    }

    /// Materializes a counter entry for every search type; call before
    /// persisting the header so no type present in this run is missing
    /// from the saved form.
    pub fn ensure_all_types(&self) {
        self.header.lock().ensure_all_types();
    }

    /// Snapshot of the current header for persistence.
    pub fn header(&self) -> StableIdHeader {
        self.header.lock().clone()
    }

    /// Closes the underlying store and hands the final header back for
    /// persistence.
    pub fn close(self) -> Result<StableIdHeader> {
        let header = self.header.into_inner();
        self.store.close()?;
        Ok(header)
    }

    fn stripe_index(&self, key: &PartitionedHash) -> usize {
        // The content hash is already uniform; folding the halves is as
        // good a stripe selector as rehashing.
        let bytes = key.as_bytes();
        let high = u64::from_le_bytes(bytes[..8].try_into().expect("hash half"));
        let low = u64::from_le_bytes(bytes[8..].try_into().expect("hash half"));
        ((high ^ low) as usize) & (self.stripes.len() - 1)
    }
}
