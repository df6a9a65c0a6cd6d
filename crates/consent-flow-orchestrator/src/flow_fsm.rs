//! Consent flow state machine using rust-fsm.
//!
//! Steps are strictly sequential — no parallel advancement:
//! `Connect → Passphrase → Confirm → Finalizing → Complete`. A user cancel
//! returns to `Connect`; a failed finalization falls back to `Confirm`.

use rust_fsm::*;
use serde::{Deserialize, Serialize};

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub consent_machine(Connect)

    Connect => {
        AccountsLinked => Passphrase
    },
    Passphrase => {
        PassphraseAccepted => Confirm,
        Cancel => Connect
    },
    Confirm => {
        Confirmed => Finalizing,
        Cancel => Connect
    },
    Finalizing => {
        FinalizeSucceeded => Complete,
        FinalizeFailed => Confirm
    }
}

// Re-export the generated types with clearer names
pub use consent_machine::Input as ConsentMachineInput;
pub use consent_machine::State as ConsentMachineState;
pub use consent_machine::StateMachine as ConsentMachine;

/// Public view of the consent flow's current step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentStep {
    /// Connecting source platforms.
    Connect,
    /// Setting the passphrase.
    Passphrase,
    /// Read-only summary of selected grants.
    Confirm,
    /// Driving PIN crypto and the authorization submit.
    Finalizing,
    /// Terminal: authorization emitted.
    Complete,
}

impl ConsentStep {
    /// True once the flow has reached its terminal step.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConsentStep::Complete)
    }
}

impl From<&ConsentMachineState> for ConsentStep {
    fn from(state: &ConsentMachineState) -> Self {
        match state {
            ConsentMachineState::Connect => ConsentStep::Connect,
            ConsentMachineState::Passphrase => ConsentStep::Passphrase,
            ConsentMachineState::Confirm => ConsentStep::Confirm,
            ConsentMachineState::Finalizing => ConsentStep::Finalizing,
            ConsentMachineState::Complete => ConsentStep::Complete,
        }
    }
}
