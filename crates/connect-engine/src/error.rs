//! Error types for platform connection operations.

use thiserror::Error;

/// Errors from platform connect/disconnect flows.
#[derive(Error, Debug)]
pub enum ConnectError {
    /// A backend call failed.
    #[error("Backend error: {0}")]
    Api(#[from] backend_api_client::ApiError),

    /// The transport hand-off failed (popup blocked, bridge unavailable).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The FSM rejected a status transition.
    #[error("Invalid connection state transition: {0}")]
    InvalidTransition(String),

    /// The required host capability was not wired for this transport.
    #[error("Missing host capability: {0}")]
    MissingCapability(&'static str),
}

/// Result type alias using ConnectError.
pub type ConnectResult<T> = Result<T, ConnectError>;
