//! Same-origin cookie jar used as the fallback read path.
//!
//! Models `document.cookie` closely enough for the session mirror: named
//! values with an optional expiry, serialized as `name=value` pairs.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
struct CookieEntry {
    value: String,
    expires: Option<DateTime<Utc>>,
}

/// Thread-safe cookie jar with expiry-aware reads.
///
/// Clones share the same underlying jar.
#[derive(Clone, Default)]
pub struct CookieJar {
    entries: Arc<Mutex<HashMap<String, CookieEntry>>>,
}

impl CookieJar {
    /// Create an empty jar.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a session cookie (no expiry).
    pub fn set(&self, name: &str, value: &str) {
        self.set_with_expiry(name, value, None);
    }

    /// Set a cookie with an explicit expiry instant.
    pub fn set_with_expiry(&self, name: &str, value: &str, expires: Option<DateTime<Utc>>) {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            name.to_string(),
            CookieEntry {
                value: value.to_string(),
                expires,
            },
        );
    }

    /// Read a cookie, ignoring entries expired as of `now`.
    pub fn get(&self, name: &str, now: DateTime<Utc>) -> Option<String> {
        let entries = self.entries.lock().unwrap();
        let entry = entries.get(name)?;
        match entry.expires {
            Some(expires) if now >= expires => None,
            _ => Some(entry.value.clone()),
        }
    }

    /// Remove a cookie, returning whether it was present.
    pub fn remove(&self, name: &str) -> bool {
        let mut entries = self.entries.lock().unwrap();
        entries.remove(name).is_some()
    }

    /// Remove every cookie.
    pub fn clear(&self) {
        let mut entries = self.entries.lock().unwrap();
        entries.clear();
    }

    /// Render the live cookies as a `Cookie:` header value as of `now`.
    pub fn header_value(&self, now: DateTime<Utc>) -> String {
        let entries = self.entries.lock().unwrap();
        let mut pairs: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| match entry.expires {
                Some(expires) => now < expires,
                None => true,
            })
            .map(|(name, entry)| format!("{}={}", name, entry.value))
            .collect();
        pairs.sort();
        pairs.join("; ")
    }
}

/// Format a single `Set-Cookie`-style string.
pub fn format_set_cookie(name: &str, value: &str, expires: Option<DateTime<Utc>>) -> String {
    match expires {
        Some(expires) => format!(
            "{}={}; Expires={}; Path=/; SameSite=Strict",
            name,
            value,
            expires.format("%a, %d %b %Y %H:%M:%S GMT")
        ),
        None => format!("{}={}; Path=/; SameSite=Strict", name, value),
    }
}

/// Parse a `Cookie:` header value into name/value pairs.
///
/// Malformed fragments (no `=`) are skipped rather than rejected.
pub fn parse_cookie_header(header: &str) -> Vec<(String, String)> {
    header
        .split(';')
        .filter_map(|pair| {
            let pair = pair.trim();
            let idx = pair.find('=')?;
            let name = pair[..idx].trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), pair[idx + 1..].to_string()))
        })
        .collect()
}
