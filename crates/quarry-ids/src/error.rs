pub type Result<T> = std::result::Result<T, IdsError>;

/// Errors produced by stable-id storage and header persistence.
#[derive(Debug, thiserror::Error)]
pub enum IdsError {
    #[error("store error: {0}")]
    Store(#[from] quarry_store::StoreError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("incompatible header schema version: expected {expected}, found {found}")]
    IncompatibleHeaderVersion { expected: u32, found: u32 },
}
