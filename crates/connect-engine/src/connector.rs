//! Per-platform connector driving a single external account's authorization.

use crate::connect_fsm::{ConnectMachine, ConnectMachineInput, ConnectionStatus};
use crate::transport::{
    ConnectTransport, Navigator, NativeBridge, PopupOpener, RedirectOutcome,
};
use crate::{ConnectError, ConnectResult, PopupHandle};
use backend_api_client::{ApiClient, ConnectionPollStatus};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use widget_storage::{StorageArea, StorageKeys};

/// Tuning for connect transports and polling.
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    /// Popup window width in pixels.
    pub popup_width: u32,
    /// Popup window height in pixels.
    pub popup_height: u32,
    /// Interval of the popup close poll.
    pub popup_poll_interval: Duration,
    /// Hard limit on how long a popup may stay open.
    pub popup_timeout: Duration,
    /// Interval of the OAuth poll-for-token loop.
    pub oauth_poll_interval: Duration,
    /// Hard limit on the OAuth poll-for-token loop.
    pub oauth_poll_timeout: Duration,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            popup_width: 450,
            popup_height: 700,
            popup_poll_interval: Duration::from_secs(1),
            popup_timeout: Duration::from_secs(300),
            oauth_poll_interval: Duration::from_secs(3),
            oauth_poll_timeout: Duration::from_secs(120),
        }
    }
}

/// Explicit acknowledgement from the popped context, routed in from the
/// messenger. Preferred over the close-poll heuristic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PopupOutcome {
    /// The OAuth callback confirmed the link.
    Linked,
    /// The OAuth failed or the user aborted.
    Failed(String),
}

/// Snapshot of a platform connection's state.
#[derive(Debug, Clone)]
pub struct PlatformConnection {
    pub platform_id: String,
    pub status: ConnectionStatus,
    pub transport: ConnectTransport,
    pub last_error: Option<String>,
}

/// Drives a single platform's authorization.
///
/// One instance per platform per session. State transitions are serialized
/// per instance; different platforms connect concurrently with no shared
/// state beyond their own records.
pub struct PlatformConnector {
    platform_id: String,
    transport: ConnectTransport,
    api: ApiClient,
    config: ConnectConfig,
    fsm: Mutex<ConnectMachine>,
    last_error: Mutex<Option<String>>,
    ack_tx: mpsc::Sender<PopupOutcome>,
    ack_rx: tokio::sync::Mutex<mpsc::Receiver<PopupOutcome>>,
    popup_opener: Option<Arc<dyn PopupOpener>>,
    navigator: Option<Arc<dyn Navigator>>,
    native_bridge: Option<Arc<dyn NativeBridge>>,
    storage: Option<Arc<dyn StorageArea>>,
    return_url: Option<String>,
}

impl PlatformConnector {
    fn base(
        platform_id: &str,
        transport: ConnectTransport,
        api: ApiClient,
        config: ConnectConfig,
    ) -> Self {
        let (ack_tx, ack_rx) = mpsc::channel(8);
        Self {
            platform_id: platform_id.to_string(),
            transport,
            api,
            config,
            fsm: Mutex::new(ConnectMachine::new()),
            last_error: Mutex::new(None),
            ack_tx,
            ack_rx: tokio::sync::Mutex::new(ack_rx),
            popup_opener: None,
            navigator: None,
            native_bridge: None,
            storage: None,
            return_url: None,
        }
    }

    /// Popup-transport connector.
    pub fn popup(
        platform_id: &str,
        api: ApiClient,
        opener: Arc<dyn PopupOpener>,
        config: ConnectConfig,
    ) -> Self {
        let mut connector = Self::base(platform_id, ConnectTransport::Popup, api, config);
        connector.popup_opener = Some(opener);
        connector
    }

    /// Redirect-transport connector. Persists the pending-platform marker and
    /// return URL before navigating away.
    pub fn redirect(
        platform_id: &str,
        api: ApiClient,
        navigator: Arc<dyn Navigator>,
        storage: Arc<dyn StorageArea>,
        return_url: &str,
        config: ConnectConfig,
    ) -> Self {
        let mut connector = Self::base(platform_id, ConnectTransport::Redirect, api, config);
        connector.navigator = Some(navigator);
        connector.storage = Some(storage);
        connector.return_url = Some(return_url.to_string());
        connector
    }

    /// Native-bridge connector (mobile shell).
    pub fn native_bridge(
        platform_id: &str,
        api: ApiClient,
        bridge: Arc<dyn NativeBridge>,
        config: ConnectConfig,
    ) -> Self {
        let mut connector = Self::base(platform_id, ConnectTransport::NativeBridge, api, config);
        connector.native_bridge = Some(bridge);
        connector
    }

    /// The platform this connector owns.
    pub fn platform_id(&self) -> &str {
        &self.platform_id
    }

    /// Sender for explicit popup acknowledgements, wired from the messenger.
    pub fn ack_sender(&self) -> mpsc::Sender<PopupOutcome> {
        self.ack_tx.clone()
    }

    /// Current status.
    pub fn status(&self) -> ConnectionStatus {
        let fsm = self.fsm.lock().unwrap();
        ConnectionStatus::from(fsm.state())
    }

    /// Last error surfaced by this connection, if any.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().unwrap().clone()
    }

    /// Snapshot for UI subscription.
    pub fn snapshot(&self) -> PlatformConnection {
        PlatformConnection {
            platform_id: self.platform_id.clone(),
            status: self.status(),
            transport: self.transport,
            last_error: self.last_error(),
        }
    }

    /// Transition the FSM, mapping rejections to a typed error.
    fn transition(&self, input: &ConnectMachineInput) -> ConnectResult<ConnectionStatus> {
        let mut fsm = self.fsm.lock().unwrap();
        fsm.consume(input).map_err(|_| {
            ConnectError::InvalidTransition(format!(
                "cannot apply {:?} in state {:?}",
                input,
                fsm.state()
            ))
        })?;
        Ok(ConnectionStatus::from(fsm.state()))
    }

    fn set_error(&self, message: &str) {
        *self.last_error.lock().unwrap() = Some(message.to_string());
    }

    fn clear_error(&self) {
        *self.last_error.lock().unwrap() = None;
    }

    fn fail_attempt(&self, message: &str) -> ConnectionStatus {
        self.set_error(message);
        match self.transition(&ConnectMachineInput::LinkFailed) {
            Ok(status) => status,
            Err(_) => self.status(),
        }
    }

    /// Start an authorization attempt for this platform.
    ///
    /// A second `connect()` while one is already in flight is a no-op with a
    /// warning, not a queued retry. A connected platform must be explicitly
    /// disconnected first.
    pub async fn connect(&self, access_token: &str) -> ConnectResult<ConnectionStatus> {
        {
            let current = self.status();
            if current.is_connecting() {
                warn!(platform = %self.platform_id, "Connect already in flight, ignoring");
                return Ok(current);
            }
            if current.is_connected() {
                warn!(platform = %self.platform_id, "Already connected, disconnect first");
                return Ok(current);
            }
        }

        self.transition(&ConnectMachineInput::ConnectRequested)?;
        self.clear_error();
        info!(platform = %self.platform_id, transport = ?self.transport, "Starting platform connect");

        let authorize_url = match self.api.authorize_platform(&self.platform_id, access_token).await
        {
            Ok(response) => response.authorize_url,
            Err(e) => {
                warn!(platform = %self.platform_id, error = %e, "Authorization URL request failed");
                self.fail_attempt(&e.to_string());
                return Err(e.into());
            }
        };

        match self.transport {
            ConnectTransport::Popup => self.connect_via_popup(&authorize_url).await,
            ConnectTransport::Redirect => self.connect_via_redirect(&authorize_url),
            ConnectTransport::NativeBridge => self.connect_via_bridge(&authorize_url),
        }
    }

    async fn connect_via_popup(&self, authorize_url: &str) -> ConnectResult<ConnectionStatus> {
        let opener = self
            .popup_opener
            .as_ref()
            .ok_or(ConnectError::MissingCapability("popup opener"))?;

        let handle = match opener.open(
            authorize_url,
            self.config.popup_width,
            self.config.popup_height,
        ) {
            Ok(handle) => handle,
            Err(e) => {
                warn!(platform = %self.platform_id, error = %e, "Popup open failed");
                self.fail_attempt(&e.to_string());
                return Err(e);
            }
        };

        match self.wait_for_popup(handle.as_ref()).await {
            PopupOutcome::Linked => {
                info!(platform = %self.platform_id, "Platform linked");
                self.transition(&ConnectMachineInput::LinkConfirmed)
            }
            PopupOutcome::Failed(reason) => {
                warn!(platform = %self.platform_id, reason = %reason, "Platform connect failed");
                Ok(self.fail_attempt(&reason))
            }
        }
    }

    /// Wait for the popup to resolve.
    ///
    /// The explicit acknowledgement channel is authoritative when wired; the
    /// `closed` poll remains only as the fallback heuristic, and the hard
    /// timeout closes a popup left open too long.
    async fn wait_for_popup(&self, handle: &dyn PopupHandle) -> PopupOutcome {
        let deadline = tokio::time::Instant::now() + self.config.popup_timeout;
        let mut ack_rx = self.ack_rx.lock().await;
        let mut ack_open = true;

        loop {
            if ack_open {
                match tokio::time::timeout(self.config.popup_poll_interval, ack_rx.recv()).await {
                    Ok(Some(outcome)) => return outcome,
                    Ok(None) => ack_open = false,
                    Err(_) => {}
                }
            } else {
                tokio::time::sleep(self.config.popup_poll_interval).await;
            }

            if handle.is_closed() {
                // No explicit ack arrived; assume the OAuth callback completed
                // by the time the user's popup closed.
                info!(platform = %self.platform_id, "Popup closed, treating as completed (close heuristic)");
                return PopupOutcome::Linked;
            }

            if tokio::time::Instant::now() >= deadline {
                handle.close();
                return PopupOutcome::Failed("popup open too long, timed out".to_string());
            }
        }
    }

    fn connect_via_redirect(&self, authorize_url: &str) -> ConnectResult<ConnectionStatus> {
        let navigator = self
            .navigator
            .as_ref()
            .ok_or(ConnectError::MissingCapability("navigator"))?;
        let storage = self
            .storage
            .as_ref()
            .ok_or(ConnectError::MissingCapability("storage"))?;

        if let Err(e) = storage.set(StorageKeys::PENDING_PLATFORM, &self.platform_id) {
            self.fail_attempt(&e.to_string());
            return Err(ConnectError::Transport(format!(
                "could not persist pending platform: {e}"
            )));
        }
        if let Some(return_url) = &self.return_url {
            if let Err(e) = storage.set(StorageKeys::RETURN_URL, return_url) {
                warn!(platform = %self.platform_id, error = %e, "Return URL persist failed");
            }
        }

        debug!(platform = %self.platform_id, "Navigating away for redirect connect");
        navigator.navigate(authorize_url);

        // The page unloads here in a real host; resumption happens on next
        // load via resume_redirect().
        Ok(self.status())
    }

    fn connect_via_bridge(&self, authorize_url: &str) -> ConnectResult<ConnectionStatus> {
        let bridge = self
            .native_bridge
            .as_ref()
            .ok_or(ConnectError::MissingCapability("native bridge"))?;

        match bridge.authorize(&self.platform_id, authorize_url) {
            Ok(true) => {
                info!(platform = %self.platform_id, "Platform linked via native bridge");
                self.transition(&ConnectMachineInput::LinkConfirmed)
            }
            Ok(false) => Ok(self.fail_attempt("native bridge reported authorization failure")),
            Err(e) => {
                warn!(platform = %self.platform_id, error = %e, "Native bridge call failed");
                self.fail_attempt(&e.to_string());
                Err(e)
            }
        }
    }

    /// Resume a redirect-based connect on the next page load.
    ///
    /// Reads the persisted pending-platform marker and the return URL's query
    /// parameters. Returns `Ok(None)` when no redirect for this platform is
    /// pending. Indeterminate outcomes (no explicit success or error marker)
    /// fall back to the backend poll.
    pub async fn resume_redirect(
        &self,
        query: &str,
        access_token: &str,
    ) -> ConnectResult<Option<ConnectionStatus>> {
        let storage = self
            .storage
            .as_ref()
            .ok_or(ConnectError::MissingCapability("storage"))?;

        let pending = storage
            .get(StorageKeys::PENDING_PLATFORM)
            .unwrap_or_default();
        match pending.as_deref() {
            Some(platform) if platform == self.platform_id => {}
            _ => return Ok(None),
        }

        // A fresh page load starts from a fresh machine
        if self.status() == ConnectionStatus::Disconnected {
            self.transition(&ConnectMachineInput::ConnectRequested)?;
        }

        let _ = storage.remove(StorageKeys::PENDING_PLATFORM);
        let _ = storage.remove(StorageKeys::RETURN_URL);

        let outcome = RedirectOutcome::from_query(query);
        if let Some(error) = outcome.error {
            warn!(platform = %self.platform_id, error = %error, "Redirect returned an error");
            return Ok(Some(self.fail_attempt(&error)));
        }
        if outcome.linked {
            info!(platform = %self.platform_id, "Redirect connect confirmed by return URL");
            return self
                .transition(&ConnectMachineInput::LinkConfirmed)
                .map(Some);
        }

        debug!(platform = %self.platform_id, "Redirect outcome indeterminate, polling backend");
        self.poll_for_completion(access_token).await.map(Some)
    }

    /// Poll the backend until the in-flight connect resolves.
    ///
    /// 3s interval, 2-minute hard timeout by default; both the interval and
    /// the deadline come from [`ConnectConfig`]. The timer handle resolves
    /// exactly once — a timeout is a definite failed outcome, never left
    /// pending.
    pub async fn poll_for_completion(&self, access_token: &str) -> ConnectResult<ConnectionStatus> {
        let deadline = tokio::time::Instant::now() + self.config.oauth_poll_timeout;

        loop {
            match self.api.poll_connection(&self.platform_id, access_token).await {
                Ok(response) => match response.status {
                    ConnectionPollStatus::Linked => {
                        info!(platform = %self.platform_id, "Backend confirmed platform link");
                        return self.transition(&ConnectMachineInput::LinkConfirmed);
                    }
                    ConnectionPollStatus::Failed => {
                        let reason = response
                            .error
                            .unwrap_or_else(|| "provider reported failure".to_string());
                        return Ok(self.fail_attempt(&reason));
                    }
                    ConnectionPollStatus::Pending => {}
                },
                Err(e) => {
                    warn!(platform = %self.platform_id, error = %e, "Connection poll failed");
                    self.fail_attempt(&e.to_string());
                    return Err(e.into());
                }
            }

            if tokio::time::Instant::now() >= deadline {
                return Ok(self.fail_attempt("authorization poll timed out"));
            }
            tokio::time::sleep(self.config.oauth_poll_interval).await;
        }
    }

    /// Disconnect the platform.
    ///
    /// Calls the backend revoke endpoint first; local state is cleared only
    /// on success. On failure the state is left unchanged and the error is
    /// surfaced — never an optimistic clear.
    pub async fn disconnect(&self, access_token: &str) -> ConnectResult<ConnectionStatus> {
        if !self.status().is_connected() {
            warn!(platform = %self.platform_id, "Disconnect requested but platform is not connected");
            return Ok(self.status());
        }

        match self.api.revoke_platform(&self.platform_id, access_token).await {
            Ok(()) => {
                self.clear_error();
                let status = self.transition(&ConnectMachineInput::DisconnectRequested)?;
                info!(platform = %self.platform_id, "Platform disconnected");
                Ok(status)
            }
            Err(e) => {
                warn!(platform = %self.platform_id, error = %e, "Revoke failed, keeping connection state");
                self.set_error(&e.to_string());
                Err(e.into())
            }
        }
    }
}
