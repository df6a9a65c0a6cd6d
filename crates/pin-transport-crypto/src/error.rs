//! Error types for PIN crypto and transport operations.

use thiserror::Error;

/// Errors from PIN crypto operations.
#[derive(Error, Debug)]
pub enum PinCryptoError {
    /// Public key PEM could not be imported.
    #[error("Key import failed: {0}")]
    KeyImport(String),

    /// RSA-OAEP encryption failed.
    #[error("Encryption failed: {0}")]
    Encryption(String),

    /// Transport envelope was not valid base64.
    #[error("Failed to decode base64 envelope: {0}")]
    Base64Decode(String),

    /// The backend PIN lookup failed.
    #[error("PIN fetch failed: {0}")]
    Fetch(#[from] backend_api_client::ApiError),
}

/// Result type alias using PinCryptoError.
pub type PinCryptoResult<T> = Result<T, PinCryptoError>;
