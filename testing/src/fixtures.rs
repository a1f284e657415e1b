//! Ready-made domain values for tests.

use chrono::{DateTime, Duration, Utc};
use ticket_checkout_core::{CardDetails, Currency, Event, EventId, Money, TicketTypeRef, TicketTypeStock};

/// An event on sale from one day before `now` until one day after.
#[must_use]
pub fn event_on_sale(now: DateTime<Utc>) -> Event {
    Event {
        id: EventId::new(),
        name: "Spring Concert".to_string(),
        start_time: now - Duration::days(1),
        end_time: now + Duration::days(1),
    }
}

/// An event whose window is exactly `[start, end]`.
#[must_use]
pub fn event_with_window(start: DateTime<Utc>, end: DateTime<Utc>) -> Event {
    Event {
        id: EventId::new(),
        name: "Matinee".to_string(),
        start_time: start,
        end_time: end,
    }
}

/// A fully stocked USD ticket type.
#[must_use]
pub fn stock(event: &Event, name: &str, unit_cents: u64, quantity: u32) -> TicketTypeStock {
    TicketTypeStock::new(
        TicketTypeRef::new(event.id, name),
        Money::from_cents(unit_cents),
        Currency::usd(),
        quantity,
    )
}

/// A card that passes local validation for `holder` until the end of 2030.
#[must_use]
pub fn valid_card(holder: &str) -> CardDetails {
    CardDetails {
        holder_name: holder.to_string(),
        number: "4242 4242 4242 4242".to_string(),
        exp_month: 12,
        exp_year: 2030,
        cvc: "123".to_string(),
        currency: Currency::usd(),
    }
}
