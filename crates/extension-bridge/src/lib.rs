//! Detection of the out-of-band browser trust agent (the Onairos extension).
//!
//! Three detection paths, first-match-wins:
//! 1. Synchronous probe — the marker object is already in page scope
//! 2. Event-based — a one-time "ready" signal fired by the extension on load
//! 3. Timeout — neither fires within the window, resolve absent
//!
//! Absence is not an error. It changes the caller's branch (prompt-to-install
//! vs proceed), so both outcomes come back as an [`ExtensionState`].

mod error;

pub use error::{BridgeError, BridgeResult};

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Marker object the extension exposes in page scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionMarker {
    /// Identifies the marker as ours.
    pub is_onairos: bool,
    /// Extension version string.
    pub version: String,
}

/// Probed extension presence; ephemeral, re-derived at each check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionState {
    /// Whether the extension answered.
    pub installed: bool,
    /// Version reported by the marker, when installed.
    pub version: Option<String>,
}

impl ExtensionState {
    fn installed(version: String) -> Self {
        Self {
            installed: true,
            version: Some(version),
        }
    }

    fn absent() -> Self {
        Self {
            installed: false,
            version: None,
        }
    }
}

/// Host-side view of the page scope the extension injects into.
///
/// `probe` is the synchronous marker check; `ready_signal` registers a
/// one-time listener for the extension's "ready" event. Each call returns a
/// fresh receiver — the bridge drops it on resolution so no listener leaks
/// across detection cycles.
pub trait MarkerProbe: Send + Sync {
    /// Check whether the marker object is already present.
    fn probe(&self) -> Option<ExtensionMarker>;

    /// Register a one-time listener for the "ready" event.
    fn ready_signal(&self) -> oneshot::Receiver<ExtensionMarker>;
}

/// Host capability that opens the extension-gated resource for a platform.
pub trait ResourceOpener: Send + Sync {
    /// Open the gated resource (e.g. the extension's connect surface).
    fn open(&self, platform: &str) -> BridgeResult<()>;
}

/// Detection tuning.
#[derive(Debug, Clone)]
pub struct DetectConfig {
    /// How long to wait for the ready signal before resolving absent.
    pub timeout: Duration,
}

impl Default for DetectConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(2),
        }
    }
}

/// Detects and defers to the privileged extension.
pub struct ExtensionBridge {
    probe: Arc<dyn MarkerProbe>,
    config: DetectConfig,
}

impl ExtensionBridge {
    /// Create a bridge over the host's page-scope probe.
    pub fn new(probe: Arc<dyn MarkerProbe>) -> Self {
        Self::with_config(probe, DetectConfig::default())
    }

    /// Create a bridge with custom detection tuning.
    pub fn with_config(probe: Arc<dyn MarkerProbe>, config: DetectConfig) -> Self {
        Self { probe, config }
    }

    /// Run one full detection cycle.
    pub async fn detect(&self) -> ExtensionState {
        // Path 1: marker already present
        if let Some(marker) = self.probe.probe() {
            if marker.is_onairos {
                debug!(version = %marker.version, "Extension marker already in page scope");
                return ExtensionState::installed(marker.version);
            }
            warn!("Foreign marker object in page scope, ignoring");
        }

        // Path 2: wait for the ready event, bounded by the timeout (path 3).
        // Dropping the receiver on resolution unregisters the listener and
        // the timer cannot fire after resolution.
        let rx = self.probe.ready_signal();
        match tokio::time::timeout(self.config.timeout, rx).await {
            Ok(Ok(marker)) if marker.is_onairos => {
                debug!(version = %marker.version, "Extension ready signal received");
                ExtensionState::installed(marker.version)
            }
            Ok(Ok(_)) => {
                warn!("Ready signal carried a foreign marker, treating as absent");
                ExtensionState::absent()
            }
            Ok(Err(_)) => {
                debug!("Ready signal channel closed without firing");
                ExtensionState::absent()
            }
            Err(_) => {
                debug!(timeout_ms = self.config.timeout.as_millis() as u64, "Extension detection timed out");
                ExtensionState::absent()
            }
        }
    }

    /// Repeat the full detection cycle up to `max_attempts` times with linear
    /// backoff (`delay`, `2 * delay`, ...). For callers that can tolerate
    /// extra latency for higher confidence.
    pub async fn detect_with_retry(&self, max_attempts: u32, delay: Duration) -> ExtensionState {
        let attempts = max_attempts.max(1);
        for attempt in 1..=attempts {
            let state = self.detect().await;
            if state.installed {
                return state;
            }
            if attempt < attempts {
                let backoff = delay * attempt;
                debug!(attempt, backoff_ms = backoff.as_millis() as u64, "Extension not detected, retrying");
                tokio::time::sleep(backoff).await;
            }
        }
        ExtensionState::absent()
    }

    /// Open `platform`'s gated resource if the extension is present,
    /// otherwise invoke `on_missing(platform)` so the caller can present an
    /// install prompt. Returns whether the resource was opened.
    pub async fn open_gated_resource<F>(
        &self,
        platform: &str,
        opener: &dyn ResourceOpener,
        on_missing: F,
    ) -> bool
    where
        F: FnOnce(&str),
    {
        let state = self.detect().await;
        if !state.installed {
            info!(platform = %platform, "Extension absent, routing to install prompt");
            on_missing(platform);
            return false;
        }

        match opener.open(platform) {
            Ok(()) => true,
            Err(e) => {
                warn!(platform = %platform, error = %e, "Gated resource open failed");
                false
            }
        }
    }
}
