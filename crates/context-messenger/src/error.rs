//! Messenger error types.

use thiserror::Error;

/// Errors from cross-context messaging.
#[derive(Error, Debug)]
pub enum MessengerError {
    /// The remote context refused or failed delivery.
    #[error("Delivery failed: {0}")]
    Delivery(String),

    /// The channel has already been torn down.
    #[error("Channel is torn down")]
    TornDown,

    /// Envelope serialization failed.
    #[error("Envelope JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using MessengerError.
pub type MessengerResult<T> = Result<T, MessengerError>;
