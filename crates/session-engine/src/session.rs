//! Durable session records with explicit expiry semantics.
//!
//! All expiry math is a pure function of `(now, expires_at)`; "now" always
//! comes from the injected [`Clock`], never from ambient time.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use widget_config_and_utils::Clock;
use widget_storage::{MirroredStore, StorageArea, StorageKeys};

/// Identity data handed over by the authentication step.
#[derive(Debug, Clone)]
pub struct UserProfile {
    /// Pseudonymous subject id (already hashed upstream).
    pub subject_id: String,
    /// Email, if the provider shared one.
    pub email: Option<String>,
}

/// The persisted session record (`user-record` storage blob).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    /// Pseudonymous subject id.
    pub subject_id: String,
    /// Raw bearer token.
    pub bearer_token: String,
    /// Email, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// When the session was created.
    pub issued_at: DateTime<Utc>,
    /// When the session stops being valid.
    pub expires_at: DateTime<Utc>,
    /// Whether the user finished onboarding.
    #[serde(default)]
    pub onboarding_complete: bool,
    /// Whether a transport PIN has been created for this user.
    #[serde(default)]
    pub pin_created: bool,
    /// Platforms the user has linked.
    #[serde(default)]
    pub connected_accounts: Vec<String>,
}

/// Durable, expiring record of "is this browser already authenticated".
///
/// No network calls; pure storage manipulation. Failed reads degrade to
/// "no session" with a logged warning, never an error to the caller.
pub struct SessionStore {
    storage: MirroredStore,
    clock: Arc<dyn Clock>,
}

impl SessionStore {
    /// Create a store over the mirrored storage surface.
    pub fn new(storage: MirroredStore, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }

    /// Pure expiry check: valid iff `now` is strictly before `expiry`.
    /// A missing expiry is never valid.
    pub fn is_valid_at(expiry: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        match expiry {
            Some(expiry) => now < expiry,
            None => false,
        }
    }

    /// Create and persist a session valid for `duration` from now.
    ///
    /// Writes the full record, the raw token, and the expiry timestamp, and
    /// stamps the cookie mirror with the same expiry as a redundant fallback
    /// channel.
    pub fn create_session(
        &self,
        user: UserProfile,
        token: &str,
        duration: Duration,
    ) -> SessionRecord {
        let now = self.clock.now();
        let record = SessionRecord {
            subject_id: user.subject_id,
            bearer_token: token.to_string(),
            email: user.email,
            issued_at: now,
            expires_at: now + duration,
            onboarding_complete: false,
            pin_created: false,
            connected_accounts: Vec::new(),
        };

        self.persist(&record);
        info!(subject_id = %record.subject_id, expires_at = %record.expires_at, "Session created");
        record
    }

    /// Load the current session record, if any.
    pub fn current(&self) -> Option<SessionRecord> {
        let raw = match self.storage.get(StorageKeys::USER_RECORD) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "Session read failed, treating as no session");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(error = %e, "Stored session record is malformed, treating as no session");
                None
            }
        }
    }

    /// Read the stored expiry timestamp, if present and parseable.
    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        let raw = self.storage.get(StorageKeys::SESSION_EXPIRY).ok().flatten()?;
        match DateTime::parse_from_rfc3339(&raw) {
            Ok(parsed) => Some(parsed.with_timezone(&Utc)),
            Err(e) => {
                warn!(error = %e, "Stored session expiry is malformed");
                None
            }
        }
    }

    /// Read the raw bearer token, if present.
    pub fn token(&self) -> Option<String> {
        self.storage.get(StorageKeys::AUTH_TOKEN).ok().flatten()
    }

    /// True iff a session exists and has not expired.
    pub fn is_valid(&self) -> bool {
        Self::is_valid_at(self.expiry(), self.clock.now())
    }

    /// Extend a currently-valid session by `duration` from now.
    ///
    /// Calling extend on an invalid or absent session is a no-op — it never
    /// creates a session from nothing. Returns whether the session was
    /// extended.
    pub fn extend(&self, duration: Duration) -> bool {
        if !self.is_valid() {
            warn!("extend() called without a valid session, ignoring");
            return false;
        }

        let new_expiry = self.clock.now() + duration;
        self.write_expiry(new_expiry);

        if let Some(mut record) = self.current() {
            record.expires_at = new_expiry;
            self.write_record(&record);
        }

        debug!(expires_at = %new_expiry, "Session extended");
        true
    }

    /// Destroy the session: clears all session keys and the cookie mirror.
    /// Idempotent.
    pub fn destroy(&self) {
        for key in [
            StorageKeys::USER_RECORD,
            StorageKeys::AUTH_TOKEN,
            StorageKeys::SESSION_EXPIRY,
        ] {
            if let Err(e) = self.storage.remove(key) {
                warn!(key = %key, error = %e, "Session key removal failed");
            }
        }
        info!("Session destroyed");
    }

    /// Record that the user's transport PIN now exists.
    pub fn mark_pin_created(&self) {
        if let Some(mut record) = self.current() {
            record.pin_created = true;
            self.write_record(&record);
        }
    }

    /// Record that onboarding finished.
    pub fn mark_onboarding_complete(&self) {
        if let Some(mut record) = self.current() {
            record.onboarding_complete = true;
            self.write_record(&record);
        }
    }

    /// Add a platform to the session's linked accounts (deduplicated).
    pub fn record_connected_account(&self, platform: &str) {
        if let Some(mut record) = self.current() {
            if !record.connected_accounts.iter().any(|p| p == platform) {
                record.connected_accounts.push(platform.to_string());
                self.write_record(&record);
            }
        }
    }

    fn persist(&self, record: &SessionRecord) {
        self.write_record(record);
        if let Err(e) = self
            .storage
            .set(StorageKeys::AUTH_TOKEN, &record.bearer_token)
        {
            warn!(error = %e, "Token write failed");
        }
        self.write_expiry(record.expires_at);
    }

    fn write_record(&self, record: &SessionRecord) {
        match serde_json::to_string(record) {
            Ok(json) => {
                if let Err(e) = self.storage.set(StorageKeys::USER_RECORD, &json) {
                    warn!(error = %e, "Session record write failed");
                }
            }
            Err(e) => warn!(error = %e, "Session record serialization failed"),
        }
    }

    fn write_expiry(&self, expires_at: DateTime<Utc>) {
        let stamp = expires_at.to_rfc3339();
        if let Err(e) = self.storage.set(StorageKeys::SESSION_EXPIRY, &stamp) {
            warn!(error = %e, "Session expiry write failed");
        }
        // Stamp the cookie channel with the real expiry so the fallback path
        // stops serving the session once it lapses.
        self.storage.cookie_jar().set_with_expiry(
            StorageKeys::SESSION_EXPIRY,
            &stamp,
            Some(expires_at),
        );
        if let Some(token) = self.token() {
            self.storage.cookie_jar().set_with_expiry(
                StorageKeys::AUTH_TOKEN,
                &token,
                Some(expires_at),
            );
        }
    }
}
