//! Storage error types.

use thiserror::Error;

/// Errors from storage backends.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The backing store rejected or failed the operation.
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Result type alias using StorageError.
pub type StorageResult<T> = Result<T, StorageError>;
