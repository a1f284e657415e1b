//! Injected dependencies shared by every service.
//!
//! All time reads go through [`Clock`] so tests can pin "now" to an event's
//! window boundaries.

use chrono::{DateTime, Utc};

/// Clock trait - abstracts time operations for testability
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock used in production
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
