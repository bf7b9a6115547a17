//! Adapters for the application ports.

mod reqwest_transport;

use chrono::{DateTime, Utc};
use tether_application::ports::Clock;

pub use reqwest_transport::{MAX_REDIRECTS, ReqwestTransport};

/// Wall-clock time from the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
