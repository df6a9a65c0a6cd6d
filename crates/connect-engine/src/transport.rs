//! Transport mechanisms and host capabilities for platform connects.

use crate::ConnectResult;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How a platform's OAuth is carried to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectTransport {
    /// Sized popup window, close-polled.
    Popup,
    /// Full-page navigation away and back.
    Redirect,
    /// Privileged host capability (mobile shell).
    NativeBridge,
}

/// An open popup window, as seen by this core.
pub trait PopupHandle: Send + Sync {
    /// Whether the window has been closed.
    fn is_closed(&self) -> bool;

    /// Force-close the window.
    fn close(&self);
}

/// Host capability that opens sized popup windows.
pub trait PopupOpener: Send + Sync {
    /// Open a popup at the given URL. Errors when the host blocks popups.
    fn open(&self, url: &str, width: u32, height: u32) -> ConnectResult<Box<dyn PopupHandle>>;
}

/// Host capability that navigates the current page away entirely.
pub trait Navigator: Send + Sync {
    /// Replace the current page with `url`.
    fn navigate(&self, url: &str);
}

/// Privileged host capability (mobile shell) that completes an authorization
/// without a popup. Returns whether the user ended up authorized.
pub trait NativeBridge: Send + Sync {
    fn authorize(&self, platform: &str, authorize_url: &str) -> ConnectResult<bool>;
}

/// Parsed query parameters from a redirect-based connect's return URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectOutcome {
    /// Platform named in the return query, if any.
    pub platform: Option<String>,
    /// Explicit success marker (`status=linked`), if present.
    pub linked: bool,
    /// Provider error, if the user aborted or the provider refused.
    pub error: Option<String>,
}

impl RedirectOutcome {
    /// Read the outcome out of the return URL's query string.
    pub fn from_query(query: &str) -> Self {
        let params = parse_query(query);
        Self {
            platform: params.get("platform").cloned(),
            linked: params
                .get("status")
                .map(|s| s == "linked" || s == "success")
                .unwrap_or(false),
            error: params.get("error").cloned(),
        }
    }

    /// Neither an explicit success nor an explicit error: the caller must
    /// fall back to polling the backend.
    pub fn is_indeterminate(&self) -> bool {
        !self.linked && self.error.is_none()
    }
}

/// Parse a query string into a map, decoding percent-escapes.
pub fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .trim_start_matches('?')
        .split('&')
        .filter_map(|pair| {
            let mut parts = pair.splitn(2, '=');
            let key = parts.next()?;
            if key.is_empty() {
                return None;
            }
            let value = parts.next().unwrap_or("");
            Some((urldecode(key), urldecode(value)))
        })
        .collect()
}

/// Simple URL decoding.
fn urldecode(s: &str) -> String {
    let mut result = Vec::new();
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '%' {
            let hex: String = chars.by_ref().take(2).collect();
            if let Ok(byte) = u8::from_str_radix(&hex, 16) {
                result.push(byte);
            }
        } else if c == '+' {
            result.push(b' ');
        } else {
            let mut buf = [0u8; 4];
            result.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
        }
    }

    String::from_utf8_lossy(&result).to_string()
}
