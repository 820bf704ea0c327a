//! Sorted, durable key-value store for Quarry's identity mappings.
//!
//! ## Shape
//! A log-structured store over fixed-size binary records:
//! - a sorted in-memory mutable segment (memtable),
//! - immutable sorted segment files flushed from it,
//! - a merge (compaction) operation folding all segments into one,
//! - an optional write-ahead log, **disabled by default**: durability is
//!   relaxed in favor of throughput because recovery is re-running analysis.
//!
//! All file I/O is routed through a [`quarry_vfs::FileSystem`], so the store
//! can run against a plain directory or a staged overlay/backing
//! composition. Keys are compared byte-wise; key types must encode so that
//! byte order matches their semantic order (see [`FixedKey`]).
//!
//! ## Failure semantics
//! Open/close failures are fatal for the indexing run: there is no
//! partial-store recovery at this layer. Structural mismatches in a segment
//! file (bad magic, wrong widths, truncation) fail the open.

mod codec;
mod config;
mod error;
mod memtable;
mod segment;
mod store;
mod typed;
mod wal;

pub use codec::{FixedKey, FixedValue};
pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use store::{Store, StoreIter, STORE_DIR};
pub use typed::{TypedIter, TypedStore};
