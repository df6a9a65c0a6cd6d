//! Runtime error types.

use thiserror::Error;

/// Errors from the handshake runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// No authenticated session is available for the requested operation.
    #[error("No valid session")]
    NoSession,

    /// The consent flow rejected or failed the operation.
    #[error(transparent)]
    Consent(#[from] consent_flow_orchestrator::ConsentError),

    /// A platform connector failed.
    #[error(transparent)]
    Connect(#[from] connect_engine::ConnectError),
}

/// Result type alias using RuntimeError.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
