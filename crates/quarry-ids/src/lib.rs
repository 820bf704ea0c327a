//! Durable identity mapping from content hashes to stable document ids.
//!
//! Every persisted entity is identified by a ([`quarry_core::SearchType`],
//! [`quarry_core::ShortHash`]) pair. This crate maps that pair to a small
//! durable [`quarry_core::DocRef`], minting a new id at most once per pair
//! even under concurrent reservation from a parallel analysis pool.
//!
//! Per-type id counters and free lists live in a [`StableIdHeader`] that
//! the *caller* persists (typically as a JSON side file next to the store);
//! the storage component itself only consumes and updates it in memory.

mod error;
mod header;
mod storage;

pub use error::{IdsError, Result};
pub use header::{load_header, save_header, IdAllocator, StableIdHeader, HEADER_SCHEMA_VERSION};
pub use storage::StableIdStorage;
