//! Platform connection state machine using rust-fsm.
//!
//! Status transitions are strictly sequential:
//! `Disconnected → Connecting → {Connected | Failed}`. Only an explicit
//! disconnect returns `Connected` to `Disconnected`; a connection can never
//! go `Connected → Connecting` without passing through `Disconnected` first.

use rust_fsm::*;
use serde::{Deserialize, Serialize};

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub connect_machine(Disconnected)

    Disconnected => {
        ConnectRequested => Connecting
    },
    Connecting => {
        LinkConfirmed => Connected,
        LinkFailed => Failed
    },
    Connected => {
        DisconnectRequested => Disconnected
    },
    Failed => {
        ConnectRequested => Connecting,
        Reset => Disconnected
    }
}

// Re-export the generated types with clearer names
pub use connect_machine::Input as ConnectMachineInput;
pub use connect_machine::State as ConnectMachineState;
pub use connect_machine::StateMachine as ConnectMachine;

/// Public tagged view of a platform connection's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// No link to the platform.
    Disconnected,
    /// An authorization attempt is in flight.
    Connecting,
    /// The platform account is linked.
    Connected,
    /// The last attempt failed; see the connection's last_error.
    Error,
}

impl ConnectionStatus {
    /// True only for a linked connection.
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }

    /// True while an attempt is in flight.
    pub fn is_connecting(&self) -> bool {
        matches!(self, ConnectionStatus::Connecting)
    }
}

impl From<&ConnectMachineState> for ConnectionStatus {
    fn from(state: &ConnectMachineState) -> Self {
        match state {
            ConnectMachineState::Disconnected => ConnectionStatus::Disconnected,
            ConnectMachineState::Connecting => ConnectionStatus::Connecting,
            ConnectMachineState::Connected => ConnectionStatus::Connected,
            ConnectMachineState::Failed => ConnectionStatus::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_is_disconnected() {
        let machine = ConnectMachine::new();
        assert_eq!(*machine.state(), ConnectMachineState::Disconnected);
    }

    #[test]
    fn successful_connect_flow() {
        let mut machine = ConnectMachine::new();

        machine.consume(&ConnectMachineInput::ConnectRequested).unwrap();
        assert_eq!(*machine.state(), ConnectMachineState::Connecting);

        machine.consume(&ConnectMachineInput::LinkConfirmed).unwrap();
        assert_eq!(*machine.state(), ConnectMachineState::Connected);
    }

    #[test]
    fn failed_connect_lands_in_failed() {
        let mut machine = ConnectMachine::new();

        machine.consume(&ConnectMachineInput::ConnectRequested).unwrap();
        machine.consume(&ConnectMachineInput::LinkFailed).unwrap();
        assert_eq!(*machine.state(), ConnectMachineState::Failed);
    }

    #[test]
    fn failed_allows_retry_or_reset() {
        let mut machine = ConnectMachine::new();
        machine.consume(&ConnectMachineInput::ConnectRequested).unwrap();
        machine.consume(&ConnectMachineInput::LinkFailed).unwrap();

        machine.consume(&ConnectMachineInput::ConnectRequested).unwrap();
        assert_eq!(*machine.state(), ConnectMachineState::Connecting);

        machine.consume(&ConnectMachineInput::LinkFailed).unwrap();
        machine.consume(&ConnectMachineInput::Reset).unwrap();
        assert_eq!(*machine.state(), ConnectMachineState::Disconnected);
    }

    #[test]
    fn connected_only_leaves_via_explicit_disconnect() {
        let mut machine = ConnectMachine::new();
        machine.consume(&ConnectMachineInput::ConnectRequested).unwrap();
        machine.consume(&ConnectMachineInput::LinkConfirmed).unwrap();

        // Connected → Connecting is not a legal transition
        assert!(machine
            .consume(&ConnectMachineInput::ConnectRequested)
            .is_err());
        assert_eq!(*machine.state(), ConnectMachineState::Connected);

        machine
            .consume(&ConnectMachineInput::DisconnectRequested)
            .unwrap();
        assert_eq!(*machine.state(), ConnectMachineState::Disconnected);

        // After passing through Disconnected, connecting again is legal
        machine.consume(&ConnectMachineInput::ConnectRequested).unwrap();
        assert_eq!(*machine.state(), ConnectMachineState::Connecting);
    }

    #[test]
    fn double_connect_request_is_rejected_by_fsm() {
        let mut machine = ConnectMachine::new();
        machine.consume(&ConnectMachineInput::ConnectRequested).unwrap();

        assert!(machine
            .consume(&ConnectMachineInput::ConnectRequested)
            .is_err());
        assert_eq!(*machine.state(), ConnectMachineState::Connecting);
    }

    #[test]
    fn disconnect_is_illegal_unless_connected() {
        let mut machine = ConnectMachine::new();
        assert!(machine
            .consume(&ConnectMachineInput::DisconnectRequested)
            .is_err());

        machine.consume(&ConnectMachineInput::ConnectRequested).unwrap();
        assert!(machine
            .consume(&ConnectMachineInput::DisconnectRequested)
            .is_err());
    }

    #[test]
    fn status_view_conversion() {
        assert_eq!(
            ConnectionStatus::from(&ConnectMachineState::Disconnected),
            ConnectionStatus::Disconnected
        );
        assert_eq!(
            ConnectionStatus::from(&ConnectMachineState::Connecting),
            ConnectionStatus::Connecting
        );
        assert_eq!(
            ConnectionStatus::from(&ConnectMachineState::Connected),
            ConnectionStatus::Connected
        );
        assert_eq!(
            ConnectionStatus::from(&ConnectMachineState::Failed),
            ConnectionStatus::Error
        );
    }

    #[test]
    fn status_predicates() {
        assert!(ConnectionStatus::Connected.is_connected());
        assert!(!ConnectionStatus::Connecting.is_connected());
        assert!(ConnectionStatus::Connecting.is_connecting());
        assert!(!ConnectionStatus::Error.is_connecting());
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&ConnectionStatus::Disconnected).unwrap(),
            "\"disconnected\""
        );
        assert_eq!(
            serde_json::to_string(&ConnectionStatus::Error).unwrap(),
            "\"error\""
        );
    }
}
