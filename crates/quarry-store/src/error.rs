use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors produced by the durable store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("segment {path} is corrupt: {reason}")]
    CorruptSegment { path: PathBuf, reason: String },

    #[error(
        "segment {path} holds {found_key}/{found_value}-byte records, \
         store is configured for {expected_key}/{expected_value}"
    )]
    RecordWidthMismatch {
        path: PathBuf,
        expected_key: usize,
        expected_value: usize,
        found_key: usize,
        found_value: usize,
    },

    #[error("record in store does not decode as the expected type")]
    UndecodableRecord,
}
