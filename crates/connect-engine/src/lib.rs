//! Per-platform connection engine for the Onairos handshake.
//!
//! One [`PlatformConnector`] per supported platform per session drives that
//! platform's OAuth authorization through one of three transports — popup
//! window, full-page redirect, or native host bridge — with strict,
//! FSM-enforced status transitions and connect/disconnect/poll semantics.

mod connect_fsm;
mod connector;
mod error;
mod transport;

pub use connect_fsm::{connect_machine, ConnectMachine, ConnectMachineInput, ConnectionStatus};
pub use connector::{ConnectConfig, PlatformConnection, PlatformConnector, PopupOutcome};
pub use error::{ConnectError, ConnectResult};
pub use transport::{
    parse_query, ConnectTransport, Navigator, NativeBridge, PopupHandle, PopupOpener,
    RedirectOutcome,
};
