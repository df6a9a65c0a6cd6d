//! Consent flow error types.

use thiserror::Error;

/// Errors from the consent flow.
#[derive(Error, Debug)]
pub enum ConsentError {
    /// Advancing past the connect step needs at least one linked platform.
    #[error("At least one connected platform is required")]
    NoConnectedPlatforms,

    /// The passphrase is shorter than the 8-character minimum.
    #[error("Passphrase too short: {actual} characters, need at least 8")]
    PassphraseTooShort { actual: usize },

    /// The FSM rejected a step transition.
    #[error("Invalid consent step transition: {0}")]
    InvalidTransition(String),

    /// PIN crypto failed; authorization cannot proceed.
    #[error("Authorization cannot proceed: PIN encryption unavailable")]
    CryptoUnavailable,

    /// Submitting the authorized request failed.
    #[error("Authorized request submission failed: {0}")]
    Submission(String),

    /// The finalize pipeline exceeded its time bound.
    #[error("Finalization timed out")]
    FinalizeTimeout,
}

/// Result type alias using ConsentError.
pub type ConsentResult<T> = Result<T, ConsentError>;
