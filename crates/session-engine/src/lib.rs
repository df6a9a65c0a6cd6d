//! Session persistence and token validation for the Onairos handshake core.
//!
//! This crate provides:
//! - A durable, expiring session record over the mirrored storage surface
//! - Pure structural validation of opaque bearer tokens
//! - A separate, explicitly-named remote verification step that degrades to
//!   "invalid" instead of failing the caller

mod session;
mod token;

pub use session::{SessionRecord, SessionStore, UserProfile};
pub use token::{validate_token, RemoteVerifier, Validation};
