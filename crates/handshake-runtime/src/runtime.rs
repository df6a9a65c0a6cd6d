//! The handshake runtime: component wiring and the finalization pipeline.

use crate::{RuntimeError, RuntimeResult};
use backend_api_client::{ApiClient, AuthorizedRequest, GrantSubmission};
use connect_engine::{ConnectionStatus, PlatformConnector, PopupOutcome};
use consent_flow_orchestrator::{ConsentError, ConsentFlow, ConsentStep, FinalizeSummary};
use context_messenger::{
    Channel, Envelope, ListenerGuard, MessageKind, MessageSource, Messenger,
};
use extension_bridge::{ExtensionBridge, ExtensionState, ResourceOpener};
use pin_transport_crypto::{decode_envelope, derive_subject_id, EncryptedPin, PinTransport};
use session_engine::{validate_token, RemoteVerifier, SessionRecord, SessionStore, UserProfile};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};
use widget_config_and_utils::{
    init_logging, Clock, Config, SystemClock, PIN_TRANSPORT_PUBLIC_KEY_PEM,
};
use widget_storage::{CookieJar, MemoryStorage, MirroredStore, StorageArea};

/// The signing provider the user authenticated with.
///
/// Decrypting the at-rest PIN is a capability external to this core; a `None`
/// result means the handshake must abort.
pub trait SigningProvider: Send + Sync {
    fn decrypt_pin(&self, envelope: &[u8], provider_token: Option<&str>) -> Option<String>;
}

/// Wires storage, session, connectors, consent flow, PIN transport, and the
/// cross-context messenger into the full handshake.
pub struct HandshakeRuntime {
    config: Config,
    clock: Arc<dyn Clock>,
    session: SessionStore,
    verifier: RemoteVerifier,
    api: ApiClient,
    pin_transport: PinTransport,
    messenger: Messenger,
    flow: ConsentFlow,
    bridge: Mutex<Option<Arc<ExtensionBridge>>>,
    connectors: Mutex<HashMap<String, Arc<PlatformConnector>>>,
    ack_guards: Mutex<Vec<ListenerGuard>>,
}

impl HandshakeRuntime {
    /// Initialize logging and build a runtime over in-process storage and the
    /// system clock.
    pub fn bootstrap(config: Config) -> Self {
        init_logging(&config.log_level);
        Self::with_parts(config, Arc::new(MemoryStorage::new()), Arc::new(SystemClock))
    }

    /// Build a runtime over host-supplied storage and clock.
    pub fn with_parts(
        config: Config,
        primary_storage: Arc<dyn StorageArea>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let storage = MirroredStore::new(primary_storage, CookieJar::new(), clock.clone());
        let session = SessionStore::new(storage, clock.clone());
        let api = ApiClient::new(config.api_url.clone(), config.publishable_key.clone());
        let verifier = RemoteVerifier::new(config.api_url.clone(), config.publishable_key.clone());
        let pin_transport = PinTransport::new(api.clone());
        let flow = ConsentFlow::new(clock.clone());

        Self {
            config,
            clock,
            session,
            verifier,
            api,
            pin_transport,
            messenger: Messenger::new(),
            flow,
            bridge: Mutex::new(None),
            connectors: Mutex::new(HashMap::new()),
            ack_guards: Mutex::new(Vec::new()),
        }
    }

    /// The session store.
    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    /// The consent flow.
    pub fn flow(&self) -> &ConsentFlow {
        &self.flow
    }

    /// The cross-context messenger.
    pub fn messenger(&self) -> &Messenger {
        &self.messenger
    }

    /// The backend client.
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// Install the extension bridge once the host's page probe exists.
    pub fn set_extension_bridge(&self, bridge: ExtensionBridge) {
        *self.bridge.lock().unwrap() = Some(Arc::new(bridge));
    }

    /// Probe for the extension. `None` when no bridge is wired.
    pub async fn detect_extension(&self) -> Option<ExtensionState> {
        let bridge = self.bridge.lock().unwrap().clone()?;
        Some(bridge.detect().await)
    }

    /// Open an extension-gated resource, or route to the install prompt.
    /// An unwired bridge behaves exactly like an absent extension.
    pub async fn open_gated_resource<F>(
        &self,
        platform: &str,
        opener: &dyn ResourceOpener,
        on_missing: F,
    ) -> bool
    where
        F: FnOnce(&str),
    {
        let bridge = self.bridge.lock().unwrap().clone();
        match bridge {
            Some(bridge) => bridge.open_gated_resource(platform, opener, on_missing).await,
            None => {
                on_missing(platform);
                false
            }
        }
    }

    /// Create a session from a fresh authentication: derives the pseudonymous
    /// subject id and persists the record for the configured duration.
    pub fn establish_session(&self, raw_sub: &str, email: Option<&str>, token: &str) -> SessionRecord {
        let profile = UserProfile {
            subject_id: derive_subject_id(raw_sub),
            email: email.map(|e| e.to_string()),
        };
        self.session
            .create_session(profile, token, self.config.session_duration())
    }

    /// Validate the stored session on startup.
    ///
    /// Checks presence, local expiry, token structure, and finally the
    /// backend. Anything short of a fully valid session clears it and
    /// resolves to `false` — remote verification failure degrades to
    /// "treat session as invalid", never an error.
    pub async fn validate_session_on_startup(&self) -> bool {
        let token = match self.session.token() {
            Some(token) => token,
            None => {
                info!("No existing session found on startup");
                return false;
            }
        };

        if !self.session.is_valid() {
            info!("Stored session is expired, clearing");
            self.session.destroy();
            return false;
        }

        let validation = validate_token(&token, self.clock.now());
        if !validation.valid {
            warn!(reason = ?validation.error, "Stored token is structurally invalid, clearing session");
            self.session.destroy();
            return false;
        }

        if !self.verifier.verify(&token).await {
            warn!("Backend rejected the stored session, clearing");
            self.session.destroy();
            return false;
        }

        info!("Session validated on startup");
        true
    }

    /// Register a platform connector and wire its explicit acknowledgement
    /// channel to the messenger: PLATFORM_LINKED / PLATFORM_LINK_FAILED
    /// envelopes for this platform resolve its popup waits.
    pub fn register_connector(&self, connector: Arc<PlatformConnector>) {
        let platform = connector.platform_id().to_string();
        let ack = connector.ack_sender();

        let predicate_platform = platform.clone();
        let guard = self.messenger.listen(
            move |envelope| {
                matches!(
                    envelope.kind,
                    MessageKind::PlatformLinked | MessageKind::PlatformLinkFailed
                ) && envelope.field_str("platform") == Some(predicate_platform.as_str())
            },
            move |envelope| {
                let outcome = match envelope.kind {
                    MessageKind::PlatformLinked => PopupOutcome::Linked,
                    _ => PopupOutcome::Failed(
                        envelope
                            .field_str("error")
                            .unwrap_or("platform link failed")
                            .to_string(),
                    ),
                };
                if ack.try_send(outcome).is_err() {
                    warn!("Popup acknowledgement dropped, no connect waiting");
                }
            },
        );

        self.ack_guards.lock().unwrap().push(guard);
        self.connectors.lock().unwrap().insert(platform, connector);
    }

    /// Look up a registered connector.
    pub fn connector(&self, platform: &str) -> Option<Arc<PlatformConnector>> {
        self.connectors.lock().unwrap().get(platform).cloned()
    }

    /// Number of platforms currently linked.
    pub fn connected_platforms(&self) -> usize {
        self.connectors
            .lock()
            .unwrap()
            .values()
            .filter(|c| c.status().is_connected())
            .count()
    }

    /// Resume any redirect-based connects after a page load.
    pub async fn resume_redirects(&self, query: &str) -> Vec<(String, ConnectionStatus)> {
        let token = match self.session.token() {
            Some(token) => token,
            None => return Vec::new(),
        };

        let connectors: Vec<Arc<PlatformConnector>> =
            self.connectors.lock().unwrap().values().cloned().collect();

        let mut resumed = Vec::new();
        for connector in connectors {
            if connector.snapshot().transport != connect_engine::ConnectTransport::Redirect {
                continue;
            }
            match connector.resume_redirect(query, &token).await {
                Ok(Some(status)) => {
                    resumed.push((connector.platform_id().to_string(), status))
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(platform = %connector.platform_id(), error = %e, "Redirect resume failed")
                }
            }
        }
        resumed
    }

    /// Leave the connect step once at least one platform is linked.
    pub fn advance_past_connect(&self) -> RuntimeResult<ConsentStep> {
        Ok(self.flow.advance_from_connect(self.connected_platforms())?)
    }

    /// Run the FINALIZING pipeline and emit the single authorization message.
    ///
    /// Derives nothing from caches: the PIN is fetched and re-encrypted per
    /// attempt. Every stage runs under the flow's finalize bound. Any crypto
    /// failure aborts the handshake — the flow never completes with a null
    /// encrypted PIN.
    pub async fn finalize_authorization(
        &self,
        signer: &dyn SigningProvider,
        channel: &Channel,
    ) -> RuntimeResult<FinalizeSummary> {
        let record = self.session.current().ok_or(RuntimeError::NoSession)?;
        if !self.session.is_valid() {
            return Err(RuntimeError::NoSession);
        }

        let token = record.bearer_token.clone();
        let subject = record.subject_id.clone();
        let pin_transport = self.pin_transport.clone();
        let api = self.api.clone();
        let grants: Vec<GrantSubmission> = self
            .flow
            .ledger()
            .grants()
            .into_iter()
            .map(|g| GrantSubmission {
                requester: g.requester,
                data_category: g.data_category,
                reward: g.reward,
            })
            .collect();

        let summary = self
            .flow
            .finalize(|reporter| async move {
                reporter.report(10);
                let fetched = pin_transport
                    .fetch_pin(&subject, &token)
                    .await
                    .map_err(|e| {
                        warn!(error = %e, "PIN fetch failed");
                        ConsentError::Submission(e.to_string())
                    })?;

                reporter.report(30);
                let envelope_bytes = decode_envelope(&fetched.cipher_result).map_err(|e| {
                    warn!(error = %e, "PIN envelope decode failed");
                    ConsentError::CryptoUnavailable
                })?;
                let raw_pin = signer
                    .decrypt_pin(&envelope_bytes, fetched.token.as_deref())
                    .ok_or(ConsentError::CryptoUnavailable)?;

                reporter.report(55);
                let sealed = EncryptedPin::seal(&subject, PIN_TRANSPORT_PUBLIC_KEY_PEM, &raw_pin)
                    .ok_or(ConsentError::CryptoUnavailable)?;

                reporter.report(70);
                let request = AuthorizedRequest {
                    hashed_subject_id: sealed.hashed_subject_id.clone(),
                    encrypted_pin: sealed.cipher_text.clone(),
                    grants,
                };
                let response = api
                    .submit_authorized_request(&request, &token)
                    .await
                    .map_err(|e| ConsentError::Submission(e.to_string()))?;

                reporter.report(90);
                let message = Envelope::consent_approved(
                    MessageSource::OnairosIframe,
                    serde_json::json!({ "apiCredential": response.api_credential.clone() }),
                );
                channel
                    .send(&message)
                    .map_err(|e| ConsentError::Submission(format!("authorization emit failed: {e}")))?;

                Ok(response.api_credential)
            })
            .await?;

        self.session.mark_pin_created();
        Ok(summary)
    }
}
