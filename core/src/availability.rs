//! Event purchase-window checks.

use crate::error::{CheckoutError, Result};
use crate::types::{Event, EventId};
use chrono::{DateTime, Utc};
use std::future::Future;

/// Read access to the events this engine sells tickets for.
pub trait EventLookup: Send + Sync {
    /// Find an event by id.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Storage` if the lookup itself fails. A missing
    /// event is `Ok(None)`.
    fn find_by_id(&self, event_id: EventId) -> impl Future<Output = Result<Option<Event>>> + Send;
}

/// Answers whether an event is currently on sale.
///
/// Consulted twice per purchase: advisorily when a line is added to the cart,
/// and authoritatively at checkout while the stock rows are locked.
#[derive(Clone, Debug)]
pub struct EventAvailabilityGate<L> {
    events: L,
}

impl<L: EventLookup> EventAvailabilityGate<L> {
    /// Creates a gate over an event lookup
    #[must_use]
    pub const fn new(events: L) -> Self {
        Self { events }
    }

    /// True iff `start_time <= at <= end_time`; both bounds inclusive.
    #[must_use]
    pub fn is_purchasable(event: &Event, at: DateTime<Utc>) -> bool {
        event.start_time <= at && at <= event.end_time
    }

    /// Loads the event and requires its window to contain `at`.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the event does not exist
    /// - `EventUnavailable` if `at` falls outside the purchase window
    pub async fn check(&self, event_id: EventId, at: DateTime<Utc>) -> Result<Event> {
        let event = self
            .events
            .find_by_id(event_id)
            .await?
            .ok_or_else(|| CheckoutError::not_found("event", event_id))?;

        if Self::is_purchasable(&event, at) {
            Ok(event)
        } else {
            Err(CheckoutError::EventUnavailable { event_id, at })
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::collections::HashMap;

    struct Events(HashMap<EventId, Event>);

    impl EventLookup for Events {
        async fn find_by_id(&self, event_id: EventId) -> Result<Option<Event>> {
            Ok(self.0.get(&event_id).cloned())
        }
    }

    fn concert() -> Event {
        Event {
            id: EventId::new(),
            name: "Concert".to_string(),
            start_time: Utc.with_ymd_and_hms(2025, 3, 1, 18, 0, 0).unwrap(),
            end_time: Utc.with_ymd_and_hms(2025, 3, 1, 23, 0, 0).unwrap(),
        }
    }

    type Gate = EventAvailabilityGate<Events>;

    #[test]
    fn window_bounds_are_inclusive() {
        let event = concert();
        assert!(Gate::is_purchasable(&event, event.start_time));
        assert!(Gate::is_purchasable(&event, event.end_time));
    }

    #[test]
    fn one_microsecond_outside_is_closed() {
        let event = concert();
        assert!(!Gate::is_purchasable(&event, event.end_time + Duration::microseconds(1)));
        assert!(!Gate::is_purchasable(&event, event.start_time - Duration::microseconds(1)));
    }

    #[tokio::test]
    async fn check_reports_missing_and_closed_events() {
        let event = concert();
        let gate = EventAvailabilityGate::new(Events(HashMap::from([(event.id, event.clone())])));

        let missing = gate.check(EventId::new(), event.start_time).await;
        assert!(matches!(missing, Err(CheckoutError::NotFound { entity: "event", .. })));

        let late = event.end_time + Duration::seconds(1);
        assert_eq!(
            gate.check(event.id, late).await,
            Err(CheckoutError::EventUnavailable { event_id: event.id, at: late })
        );

        assert_eq!(gate.check(event.id, event.start_time).await, Ok(event));
    }
}
