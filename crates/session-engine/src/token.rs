//! Bearer token validation.
//!
//! [`validate_token`] is pure and side-effect free: it decodes the token's
//! structural payload without any signature check (that is the backend's job)
//! and applies the embedded expiry claim when one is present. Remote
//! verification is the separate [`RemoteVerifier::verify`] operation, whose
//! failure degrades to "treat session as invalid" rather than throwing.

use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

/// Outcome of structural token validation.
#[derive(Debug, Clone)]
pub struct Validation {
    /// Whether the token is structurally valid and unexpired.
    pub valid: bool,
    /// Decoded payload claims, when the token decoded at all.
    pub payload: Option<serde_json::Value>,
    /// Reason the token was rejected, when it was.
    pub error: Option<String>,
}

impl Validation {
    fn ok(payload: serde_json::Value) -> Self {
        Self {
            valid: true,
            payload: Some(payload),
            error: None,
        }
    }

    fn rejected(reason: &str, payload: Option<serde_json::Value>) -> Self {
        Self {
            valid: false,
            payload,
            error: Some(reason.to_string()),
        }
    }
}

/// Structurally validate a bearer token as of `now`.
///
/// Requirements: a dotted payload segment that base64-decodes to a JSON
/// object, at least one identity claim (`sub`, `userId`/`user_id`, or
/// `email`), and an `exp` claim still in the future when present.
pub fn validate_token(token: &str, now: DateTime<Utc>) -> Validation {
    let token = token.trim();
    if token.is_empty() {
        return Validation::rejected("empty token", None);
    }

    let mut segments = token.split('.');
    let (first, second) = (segments.next(), segments.next());
    let payload_segment = match (first, second) {
        (Some(_), Some(payload)) => payload,
        _ => return Validation::rejected("token has no payload segment", None),
    };

    let bytes = match decode_segment(payload_segment) {
        Some(bytes) => bytes,
        None => return Validation::rejected("payload is not valid base64", None),
    };

    let payload: serde_json::Value = match serde_json::from_slice(&bytes) {
        Ok(value) => value,
        Err(_) => return Validation::rejected("payload is not valid JSON", None),
    };

    if !has_identity_claim(&payload) {
        return Validation::rejected("no identity claim present", Some(payload));
    }

    if let Some(exp) = payload.get("exp").and_then(|v| v.as_i64()) {
        if now.timestamp() >= exp {
            return Validation::rejected("token is expired", Some(payload));
        }
    }

    Validation::ok(payload)
}

fn decode_segment(segment: &str) -> Option<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .or_else(|_| URL_SAFE.decode(segment))
        .ok()
}

fn has_identity_claim(payload: &serde_json::Value) -> bool {
    ["sub", "userId", "user_id", "email"].iter().any(|claim| {
        payload
            .get(claim)
            .and_then(|v| v.as_str())
            .map(|s| !s.is_empty())
            .unwrap_or(false)
    })
}

/// Backend response for the verify-token endpoint.
#[derive(Debug, Deserialize)]
struct VerifyResponse {
    valid: bool,
}

/// Remote token verification against the backend.
///
/// Layered on top of [`validate_token`]; any transport or decode failure is
/// logged and resolves to `false` so callers simply treat the session as
/// invalid.
#[derive(Clone)]
pub struct RemoteVerifier {
    http_client: reqwest::Client,
    api_url: String,
    publishable_key: String,
}

impl RemoteVerifier {
    /// Create a verifier against the given API base URL.
    pub fn new(api_url: impl Into<String>, publishable_key: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            api_url: api_url.into(),
            publishable_key: publishable_key.into(),
        }
    }

    /// Ask the backend whether the token is still good.
    ///
    /// Never errors: a non-2xx response, transport failure, or unexpected
    /// body all degrade to `false`.
    pub async fn verify(&self, token: &str) -> bool {
        let url = format!("{}/auth/verify-token", self.api_url);

        let response = self
            .http_client
            .post(&url)
            .header("x-api-key", &self.publishable_key)
            .header("Authorization", format!("Bearer {}", token))
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Token verification request failed, treating session as invalid");
                return false;
            }
        };

        if !response.status().is_success() {
            warn!(status = %response.status(), "Token verification rejected");
            return false;
        }

        match response.json::<VerifyResponse>().await {
            Ok(body) => {
                debug!(valid = body.valid, "Token verification completed");
                body.valid
            }
            Err(e) => {
                warn!(error = %e, "Token verification body unreadable, treating session as invalid");
                false
            }
        }
    }
}
