//! Consent flow orchestration: guards, progress, and completion semantics.

use crate::flow_fsm::{ConsentMachine, ConsentMachineInput, ConsentStep};
use crate::{ConsentError, ConsentResult, GrantLedger};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};
use widget_config_and_utils::Clock;

/// Callback reporting finalization progress (0–100).
pub type ProgressCallback = Box<dyn Fn(u8) + Send + Sync>;

/// Terminal completion callback. Invoked exactly once per flow.
pub type CompletionCallback = Box<dyn FnOnce(FinalizeSummary) + Send>;

/// Callback for step-change notifications.
pub type StepCallback = Box<dyn Fn(ConsentStep) + Send + Sync>;

/// Tuning for the finalization pipeline.
#[derive(Debug, Clone)]
pub struct FinalizeConfig {
    /// Hard bound on the crypto + submit pipeline. A hang resolves to
    /// [`ConsentError::FinalizeTimeout`] instead of wedging the flow.
    pub timeout: Duration,
}

impl Default for FinalizeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
        }
    }
}

/// What the flow produced on completion.
#[derive(Debug, Clone)]
pub struct FinalizeSummary {
    /// Size of the grant set at completion.
    pub granted: usize,
    /// Scoped access credential returned by the backend.
    pub api_credential: String,
}

/// Reports finalization progress, enforcing monotonic non-decreasing
/// percentages capped at 100.
#[derive(Clone)]
pub struct ProgressReporter {
    percent: Arc<Mutex<u8>>,
    callback: Arc<Mutex<Option<ProgressCallback>>>,
}

impl ProgressReporter {
    fn new() -> Self {
        Self {
            percent: Arc::new(Mutex::new(0)),
            callback: Arc::new(Mutex::new(None)),
        }
    }

    /// Report progress. Regressions are ignored; values above 100 clamp.
    pub fn report(&self, percent: u8) {
        let percent = percent.min(100);
        {
            let mut current = self.percent.lock().unwrap();
            if percent <= *current {
                return;
            }
            *current = percent;
        }
        if let Some(callback) = self.callback.lock().unwrap().as_ref() {
            callback(percent);
        }
    }

    /// Current progress percentage.
    pub fn percent(&self) -> u8 {
        *self.percent.lock().unwrap()
    }

    fn reset(&self) {
        *self.percent.lock().unwrap() = 0;
    }
}

/// The consent flow: step machine, guards, grant ledger, and the bounded
/// finalization pipeline.
pub struct ConsentFlow {
    fsm: Mutex<ConsentMachine>,
    ledger: GrantLedger,
    passphrase: Mutex<Option<String>>,
    reporter: ProgressReporter,
    completion: Mutex<Option<CompletionCallback>>,
    step_callback: Mutex<Option<StepCallback>>,
    config: FinalizeConfig,
}

impl ConsentFlow {
    /// Create a flow at the connect step.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_config(clock, FinalizeConfig::default())
    }

    /// Create a flow with custom finalize tuning.
    pub fn with_config(clock: Arc<dyn Clock>, config: FinalizeConfig) -> Self {
        Self {
            fsm: Mutex::new(ConsentMachine::new()),
            ledger: GrantLedger::new(clock),
            passphrase: Mutex::new(None),
            reporter: ProgressReporter::new(),
            completion: Mutex::new(None),
            step_callback: Mutex::new(None),
            config,
        }
    }

    /// The grant ledger for this flow.
    pub fn ledger(&self) -> &GrantLedger {
        &self.ledger
    }

    /// Current step.
    pub fn step(&self) -> ConsentStep {
        let fsm = self.fsm.lock().unwrap();
        ConsentStep::from(fsm.state())
    }

    /// Current finalization progress.
    pub fn progress(&self) -> u8 {
        self.reporter.percent()
    }

    /// Set the step-change notification callback.
    pub fn set_step_callback(&self, callback: StepCallback) {
        *self.step_callback.lock().unwrap() = Some(callback);
    }

    /// Set the progress callback.
    pub fn set_progress_callback(&self, callback: ProgressCallback) {
        *self.reporter.callback.lock().unwrap() = Some(callback);
    }

    /// Set the terminal completion callback. Invoked exactly once, when the
    /// flow completes.
    pub fn set_completion_callback(&self, callback: CompletionCallback) {
        *self.completion.lock().unwrap() = Some(callback);
    }

    /// The passphrase accepted at the passphrase step, if any.
    pub fn passphrase(&self) -> Option<String> {
        self.passphrase.lock().unwrap().clone()
    }

    /// Transition the FSM and notify the step callback on change.
    fn transition(&self, input: &ConsentMachineInput) -> ConsentResult<ConsentStep> {
        let mut fsm = self.fsm.lock().unwrap();
        let old_step = ConsentStep::from(fsm.state());

        fsm.consume(input).map_err(|_| {
            ConsentError::InvalidTransition(format!(
                "cannot apply {:?} in step {:?}",
                input,
                fsm.state()
            ))
        })?;

        let new_step = ConsentStep::from(fsm.state());
        drop(fsm);

        if old_step != new_step {
            debug!(from = ?old_step, to = ?new_step, "Consent step transition");
            if let Some(callback) = self.step_callback.lock().unwrap().as_ref() {
                callback(new_step);
            }
        }
        Ok(new_step)
    }

    /// Leave the connect step. Requires at least one connected platform.
    pub fn advance_from_connect(&self, connected_platforms: usize) -> ConsentResult<ConsentStep> {
        if connected_platforms == 0 {
            warn!("Cannot leave connect step without a linked platform");
            return Err(ConsentError::NoConnectedPlatforms);
        }
        self.transition(&ConsentMachineInput::AccountsLinked)
    }

    /// Accept a passphrase and advance to confirm.
    ///
    /// A passphrase shorter than 8 characters keeps the step unchanged and
    /// surfaces an inline error — it is never truncated or accepted.
    pub fn submit_passphrase(&self, passphrase: &str) -> ConsentResult<ConsentStep> {
        let length = passphrase.chars().count();
        if length < 8 {
            return Err(ConsentError::PassphraseTooShort { actual: length });
        }
        let step = self.transition(&ConsentMachineInput::PassphraseAccepted)?;
        *self.passphrase.lock().unwrap() = Some(passphrase.to_string());
        Ok(step)
    }

    /// Advance past the read-only confirm summary into finalization.
    pub fn confirm(&self) -> ConsentResult<ConsentStep> {
        self.transition(&ConsentMachineInput::Confirmed)
    }

    /// User cancel: returns to the connect step from any interactive step.
    /// Cancelling at connect is a no-op; finalization cannot be cancelled.
    pub fn cancel(&self) -> ConsentResult<ConsentStep> {
        if self.step() == ConsentStep::Connect {
            return Ok(ConsentStep::Connect);
        }
        let step = self.transition(&ConsentMachineInput::Cancel)?;
        *self.passphrase.lock().unwrap() = None;
        Ok(step)
    }

    /// Run the finalization pipeline.
    ///
    /// `driver` performs the actual work (PIN crypto, submission, emission)
    /// and reports progress through the passed reporter; it runs under the
    /// configured time bound. On success the progress reaches 100 and the
    /// completion callback fires exactly once. On any error — including a
    /// crypto failure or the time bound — the flow falls back to the confirm
    /// step and the completion callback is NOT consumed.
    pub async fn finalize<F, Fut>(&self, driver: F) -> ConsentResult<FinalizeSummary>
    where
        F: FnOnce(ProgressReporter) -> Fut,
        Fut: Future<Output = ConsentResult<String>>,
    {
        if self.step() != ConsentStep::Finalizing {
            return Err(ConsentError::InvalidTransition(format!(
                "finalize called in step {:?}",
                self.step()
            )));
        }

        self.reporter.reset();

        let outcome = tokio::time::timeout(self.config.timeout, driver(self.reporter.clone())).await;

        match outcome {
            Ok(Ok(api_credential)) => {
                self.reporter.report(100);
                self.transition(&ConsentMachineInput::FinalizeSucceeded)?;

                let summary = FinalizeSummary {
                    granted: self.ledger.granted(),
                    api_credential,
                };
                if let Some(callback) = self.completion.lock().unwrap().take() {
                    callback(summary.clone());
                }
                info!(granted = summary.granted, "Consent flow complete");
                Ok(summary)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Finalization failed, returning to confirm");
                self.transition(&ConsentMachineInput::FinalizeFailed)?;
                Err(e)
            }
            Err(_) => {
                warn!("Finalization exceeded its time bound, returning to confirm");
                self.transition(&ConsentMachineInput::FinalizeFailed)?;
                Err(ConsentError::FinalizeTimeout)
            }
        }
    }
}
