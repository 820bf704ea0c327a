//! File system layer for Quarry's durable stores.
//!
//! The layer is responsible for:
//! - Routing a store's file operations against a chosen root directory.
//! - Composing an immutable "backing" snapshot with a mutable "overlay"
//!   directory so incremental runs can stage changes without touching the
//!   snapshot (see [`TieredFs`]).
//! - Tracking logical deletions of backing-layer files (tombstones) so the
//!   owning store can compute the delta to publish.
//!
//! All paths crossing the [`FileSystem`] trait are **relative**; each
//! implementation decides what concrete directory they resolve against.

mod fs;
mod tiered;

pub use fs::{FileSystem, LocalFs, ReadableFile, WritableFile};
pub use tiered::TieredFs;
