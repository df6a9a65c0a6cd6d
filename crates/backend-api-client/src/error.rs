//! API client error types.

use thiserror::Error;

/// Errors from backend calls.
#[derive(Error, Debug)]
pub enum ApiError {
    /// The request never completed (network, TLS, decode).
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The backend answered with a non-success status.
    #[error("{what} failed with status {status} ({summary})")]
    Status {
        what: &'static str,
        status: u16,
        summary: String,
    },
}

/// Result type alias using ApiError.
pub type ApiResult<T> = Result<T, ApiError>;
