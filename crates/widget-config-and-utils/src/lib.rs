//! Core types, configuration, and utilities for the Onairos handshake core.

mod clock;
mod config;
mod error;
mod logging;
mod paths;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    compile_time_api_url, Config, DEFAULT_API_URL, DEFAULT_SESSION_DURATION_SECS,
    PIN_TRANSPORT_PUBLIC_KEY_PEM,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, parse_level};
pub use paths::Paths;
