//! Compact reference-id assignment for symbol serialization.
//!
//! Serialization formats that encode symbol references with a small integer
//! width need every symbol of a batch mapped onto a distinct slot in an
//! oversized array. This crate performs that mapping with a consistent-hash
//! ring: slots and symbols are hashed onto a 64-bit circle and paired by
//! proximity, so the assignment is deterministic in the symbols' content
//! hashes and tends to stay put when a batch grows incrementally, since a
//! symbol's ring position does not depend on the other symbols or on
//! insertion order.
//!
//! The mapping is computed once per batch (per file or per project) and
//! consumed immediately; nothing here persists.

mod ring;
mod slots;

pub use slots::{
    assign_slots, slot_capacity_for, SlotMapConfig, SymbolSlotMap, MIN_SLOT_CAPACITY,
};
