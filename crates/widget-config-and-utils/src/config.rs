//! Configuration management for the handshake core.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Default API base URL (can be overridden at compile time via ONAIROS_API_URL env var).
pub const DEFAULT_API_URL: &str = match option_env!("ONAIROS_API_URL") {
    Some(url) => url,
    None => "https://api.onairos.uk",
};

/// Default publishable API key (can be overridden at compile time via ONAIROS_PUBLISHABLE_KEY env var).
pub const DEFAULT_PUBLISHABLE_KEY: &str = match option_env!("ONAIROS_PUBLISHABLE_KEY") {
    Some(key) => key,
    None => "onairos-publishable-key",
};

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default session lifetime: seven days.
pub const DEFAULT_SESSION_DURATION_SECS: u64 = 7 * 24 * 60 * 60;

/// Fixed 2048-bit RSA public key used to encrypt the PIN for transport.
///
/// The matching private key lives with the authorization backend; this side
/// only ever encrypts.
pub const PIN_TRANSPORT_PUBLIC_KEY_PEM: &str = "-----BEGIN PUBLIC KEY-----
MIIBIjANBgkqhkiG9w0BAQEFAAOCAQ8AMIIBCgKCAQEAplLcp7LWddhO9WYhg2mH
Lv12Ybks0527tlVxNNfqJZZ6O4cfFuwhPaRDuxoAkADdMyqNlPrnnRPPHQmx6JqD
+Oo9iOxvqjixBBvRbj3DxNNh10zfVrn9xIO8FUuKK/PJn1688UAXhCScdW/kWvdn
VMZaBP/qVkDrAtL8IjQoQ1l4NRWETeDb7/3yeS2ODdQFhQnf9WM8xRffbbXe6vz7
nDq8sulitWEh3grCSx/mHeXRnZtU3R+7mpAGeN9NPSH2z7jMjTcrcvs/bCGrvp0z
Nb+mRXZGHo6OVWVDfcZ5O/1Wq4P+aalGsXgBI/JsrrbDAvaQZVagQMoxDWoPd9F7
5QIDAQAB
-----END PUBLIC KEY-----
";

/// Compile-time API URL, for callers that need it before a Config exists.
pub const fn compile_time_api_url() -> &'static str {
    DEFAULT_API_URL
}

/// Main handshake configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// API base URL.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Publishable API key (public, safe to expose).
    #[serde(default = "default_publishable_key")]
    pub publishable_key: String,
    /// Session lifetime in seconds, applied at creation and renewal.
    #[serde(default = "default_session_duration_secs")]
    pub session_duration_secs: u64,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_publishable_key() -> String {
    DEFAULT_PUBLISHABLE_KEY.to_string()
}

fn default_session_duration_secs() -> u64 {
    DEFAULT_SESSION_DURATION_SECS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            publishable_key: DEFAULT_PUBLISHABLE_KEY.to_string(),
            session_duration_secs: DEFAULT_SESSION_DURATION_SECS,
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from a file, falling back to defaults.
    /// Note: api_url and publishable_key are compile-time only and always use
    /// the built-in defaults, regardless of what's in the config file.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        // Force compile-time values (never from config file)
        config.api_url = DEFAULT_API_URL.to_string();
        config.publishable_key = DEFAULT_PUBLISHABLE_KEY.to_string();

        // Environment variables can only override log_level
        config.load_from_env();

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let config_path = paths.config_file();
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    /// Override configuration from environment variables.
    /// Only log_level can be overridden at runtime.
    fn load_from_env(&mut self) {
        if let Ok(log_level) = std::env::var("ONAIROS_LOG_LEVEL") {
            self.log_level = log_level;
        }
    }

    /// Get the API base URL as a parsed URL.
    pub fn api_url(&self) -> CoreResult<Url> {
        Url::parse(&self.api_url).map_err(CoreError::from)
    }

    /// Session lifetime as a chrono Duration.
    pub fn session_duration(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.session_duration_secs as i64)
    }
}
