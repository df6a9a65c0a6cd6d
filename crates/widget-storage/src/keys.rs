//! Storage key constants.

/// Storage keys used by the handshake core
pub struct StorageKeys;

impl StorageKeys {
    /// Full user record (JSON blob incl. email/token/connected accounts)
    pub const USER_RECORD: &'static str = "user-record";

    /// Raw bearer token
    pub const AUTH_TOKEN: &'static str = "auth-token";

    /// Session expiry (ISO-8601 timestamp)
    pub const SESSION_EXPIRY: &'static str = "session-expiry";

    /// Platform with a redirect-based connect in flight
    pub const PENDING_PLATFORM: &'static str = "pending-platform";

    /// Return URL for resuming a redirect-based connect
    pub const RETURN_URL: &'static str = "connect-return-url";
}
