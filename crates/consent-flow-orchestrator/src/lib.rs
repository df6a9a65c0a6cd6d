//! Multi-step consent flow for the Onairos handshake.
//!
//! Orchestrates the screens of the consent handshake — connect accounts, set
//! passphrase, confirm, finalize — as an explicit state machine with guards,
//! and tracks the running set of granted scopes.

mod error;
mod flow_fsm;
mod grants;
mod orchestrator;

pub use error::{ConsentError, ConsentResult};
pub use flow_fsm::{consent_machine, ConsentMachine, ConsentMachineInput, ConsentStep};
pub use grants::{ConsentGrant, GrantLedger};
pub use orchestrator::{
    CompletionCallback, ConsentFlow, FinalizeConfig, FinalizeSummary, ProgressCallback,
    ProgressReporter, StepCallback,
};
