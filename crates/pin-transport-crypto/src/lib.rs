//! PIN transport crypto for the Onairos handshake.
//!
//! Derives the pseudonymous subject id, and hashes/encrypts the secret PIN
//! for cross-boundary transport. The scheme is fixed:
//! - Subject id: SHA-256 of a stable identity string (one-way correlation key)
//! - PIN wire format: base64-encoded RSA-OAEP(SHA-256) ciphertext under a
//!   fixed 2048-bit public key
//!
//! The raw PIN exists in memory only inside [`encrypt_for_transmission`]; it
//! is never logged, stored, or cached between attempts — each authorization
//! attempt re-fetches and re-derives instead.

mod crypto;
mod error;
mod transport;

pub use crypto::{
    decode_envelope, derive_subject_id, encrypt_for_transmission, EncryptedPin,
    PIN_CIPHER_SCHEME,
};
pub use error::{PinCryptoError, PinCryptoResult};
pub use transport::PinTransport;
