//! Deterministic time.

use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex};
use ticket_checkout_core::Clock;

/// Fixed clock for deterministic tests
///
/// Returns the same instant until moved with [`FixedClock::set`] or
/// [`FixedClock::advance`]. Clones share the instant.
///
/// # Example
///
/// ```
/// use ticket_checkout_testing::FixedClock;
/// use ticket_checkout_core::Clock;
/// use chrono::{Duration, Utc};
///
/// let clock = FixedClock::new(Utc::now());
/// let before = clock.now();
/// clock.advance(Duration::seconds(5));
/// assert_eq!(clock.now() - before, Duration::seconds(5));
/// ```
#[derive(Debug, Clone)]
pub struct FixedClock {
    time: Arc<Mutex<DateTime<Utc>>>,
}

impl FixedClock {
    /// Create a new fixed clock with the given time
    #[must_use]
    pub fn new(time: DateTime<Utc>) -> Self {
        Self {
            time: Arc::new(Mutex::new(time)),
        }
    }

    /// Move the clock to `time`
    pub fn set(&self, time: DateTime<Utc>) {
        match self.time.lock() {
            Ok(mut guard) => *guard = time,
            Err(poisoned) => *poisoned.into_inner() = time,
        }
    }

    /// Move the clock forward by `by`
    pub fn advance(&self, by: Duration) {
        let now = self.now();
        self.set(now + by);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.time
            .lock()
            .map_or_else(|poisoned| *poisoned.into_inner(), |guard| *guard)
    }
}

/// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
///
/// # Panics
///
/// Never in practice; the timestamp is hardcoded.
#[must_use]
#[allow(clippy::expect_used)]
pub fn test_clock() -> FixedClock {
    FixedClock::new(
        DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
            .expect("hardcoded timestamp should always parse")
            .with_timezone(&Utc),
    )
}
