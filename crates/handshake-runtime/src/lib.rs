//! Runtime facade for the Onairos consent handshake.
//!
//! Wires the component graph described by the handshake: session store over
//! mirrored storage, per-platform connectors, the extension bridge, the
//! consent flow, and the PIN transport, and drives the finalization pipeline
//! that emits a single authorization message across the context boundary.

mod error;
mod runtime;

pub use error::{RuntimeError, RuntimeResult};
pub use runtime::{HandshakeRuntime, SigningProvider};
