//! Cross-context message envelope and routing for the Onairos handshake.
//!
//! Connects the host page, a spawned popup/iframe, and the extension's
//! content/background scripts. Everything crossing a context boundary is a
//! typed `{source, type, ...payload}` envelope; anything not matching that
//! shape is rejected at the boundary before it can reach business logic.

mod envelope;
mod error;
mod messenger;

pub use envelope::{Envelope, MessageKind, MessageSource};
pub use error::{MessengerError, MessengerResult};
pub use messenger::{Channel, ChannelTarget, ListenerGuard, Messenger, RemoteContext};
