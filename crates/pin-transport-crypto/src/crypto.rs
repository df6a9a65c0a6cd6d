//! Subject id derivation and RSA-OAEP PIN encryption.

use crate::{PinCryptoError, PinCryptoResult};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rsa::pkcs8::DecodePublicKey;
use rsa::{Oaep, RsaPublicKey};
use sha2::{Digest, Sha256};
use tracing::error;

/// Cipher scheme carried on every encrypted PIN.
pub const PIN_CIPHER_SCHEME: &str = "RSA-OAEP+SHA-256";

/// Derive the pseudonymous subject id: lowercase hex SHA-256 of a stable
/// identity string. Deterministic and non-reversible.
pub fn derive_subject_id(raw_sub: &str) -> String {
    let digest = Sha256::digest(raw_sub.as_bytes());
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex
}

/// Base64-decode the transport envelope around an at-rest encrypted PIN.
///
/// Local decryption of the result belongs to the signing provider the user
/// authenticated with; this core only unwraps the envelope into bytes.
pub fn decode_envelope(cipher_result: &str) -> PinCryptoResult<Vec<u8>> {
    BASE64
        .decode(cipher_result.trim())
        .map_err(|e| PinCryptoError::Base64Decode(e.to_string()))
}

/// Encrypt the raw PIN for transmission.
///
/// Imports an RSA-OAEP/SHA-256 public key from PEM, encrypts, and returns
/// base64. This is the only point where the raw secret exists in memory.
/// Any failure — malformed PEM, import failure, encryption failure — is
/// caught and logged, and resolves to `None`: callers must treat that as
/// "authorization cannot proceed" and abort the handshake, never retry
/// blindly with the same input.
pub fn encrypt_for_transmission(public_key_pem: &str, raw_pin: &str) -> Option<String> {
    match try_encrypt(public_key_pem, raw_pin) {
        Ok(cipher) => Some(cipher),
        Err(e) => {
            error!(error = %e, "PIN transport encryption failed, authorization cannot proceed");
            None
        }
    }
}

fn try_encrypt(public_key_pem: &str, raw_pin: &str) -> PinCryptoResult<String> {
    let public_key = RsaPublicKey::from_public_key_pem(public_key_pem)
        .map_err(|e| PinCryptoError::KeyImport(e.to_string()))?;

    let mut rng = rand::thread_rng();
    let padding = Oaep::new::<Sha256>();
    let cipher_text = public_key
        .encrypt(&mut rng, padding, raw_pin.as_bytes())
        .map_err(|e| PinCryptoError::Encryption(e.to_string()))?;

    Ok(BASE64.encode(cipher_text))
}

/// An encrypted PIN ready for submission. Derived per authorization request,
/// never persisted to durable storage.
#[derive(Debug, Clone)]
pub struct EncryptedPin {
    /// SHA-256 subject id the PIN belongs to.
    pub hashed_subject_id: String,
    /// Base64 RSA-OAEP ciphertext.
    pub cipher_text: String,
    /// Always [`PIN_CIPHER_SCHEME`].
    pub scheme: &'static str,
}

impl EncryptedPin {
    /// Encrypt `raw_pin` under `public_key_pem` for `hashed_subject_id`.
    ///
    /// `None` means the crypto step failed and the handshake must abort.
    pub fn seal(hashed_subject_id: &str, public_key_pem: &str, raw_pin: &str) -> Option<Self> {
        let cipher_text = encrypt_for_transmission(public_key_pem, raw_pin)?;
        Some(Self {
            hashed_subject_id: hashed_subject_id.to_string(),
            cipher_text,
            scheme: PIN_CIPHER_SCHEME,
        })
    }
}
