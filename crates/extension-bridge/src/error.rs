//! Error types for extension bridge operations.
//!
//! Detection failure is deliberately NOT an error — an absent extension is a
//! valid terminal state. Errors here cover the hand-off itself.

use thiserror::Error;

/// Errors from opening an extension-gated resource.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The host refused to open the resource (e.g. popup blocked).
    #[error("Failed to open gated resource: {0}")]
    OpenFailed(String),
}

/// Result type alias using BridgeError.
pub type BridgeResult<T> = Result<T, BridgeError>;
