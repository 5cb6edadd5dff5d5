use thiserror::Error;

/// Errors that can occur in the storage layer.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Reasons a sync request is declined or fails.
///
/// Read-side problems never show up here: a missing or corrupt store is
/// recovered as an empty document, and backup failures are only logged.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Sync credential rejected")]
    Unauthorized,

    #[error("Invalid request: {0}")]
    MalformedRequest(String),

    #[error("Unsupported action: {0}")]
    UnsupportedAction(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type Result<T> = std::result::Result<T, SyncError>;
