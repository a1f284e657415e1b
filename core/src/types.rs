//! Domain types for the checkout engine.
//!
//! Identifiers, money, currencies and the records that flow between the
//! cart, the inventory store, the payment gateway and the ticket minter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wraps an existing `Uuid`
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a buyer account
    UserId
);

uuid_id!(
    /// Unique identifier for an event
    EventId
);

uuid_id!(
    /// Unique identifier for a payment recorded by the gateway
    PaymentId
);

uuid_id!(
    /// Unique identifier for a stored payment method snapshot
    PaymentMethodId
);

/// Reference to one purchasable ticket type of one event.
///
/// The derived ordering (event first, then ticket type name) is the lock
/// order used when a checkout touches several stock rows.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TicketTypeRef {
    /// Event the ticket type belongs to
    pub event_id: EventId,
    /// Ticket type name within the event (e.g. "General", "VIP")
    pub ticket_type: String,
}

impl TicketTypeRef {
    /// Creates a new reference
    #[must_use]
    pub fn new(event_id: EventId, ticket_type: impl Into<String>) -> Self {
        Self {
            event_id,
            ticket_type: ticket_type.into(),
        }
    }
}

impl fmt::Display for TicketTypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.event_id, self.ticket_type)
    }
}

// ============================================================================
// Money
// ============================================================================

/// Amount in currency minor units (cents).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(u64);

impl Money {
    /// Zero amount
    pub const ZERO: Self = Self(0);

    /// Creates a `Money` value from minor units
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Returns the amount in minor units
    #[must_use]
    pub const fn cents(&self) -> u64 {
        self.0
    }

    /// Checks if the amount is zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Adds two amounts with overflow checking
    #[must_use]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(result) => Some(Self(result)),
            None => None,
        }
    }

    /// Multiplies a unit price by a quantity with overflow checking
    #[must_use]
    pub const fn checked_mul(self, quantity: u32) -> Option<Self> {
        match self.0.checked_mul(quantity as u64) {
            Some(result) => Some(Self(result)),
            None => None,
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

/// ISO-4217 alphabetic currency code, always upper case.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    /// Parses a three-letter currency code.
    ///
    /// Returns `None` unless the input is exactly three ASCII letters.
    #[must_use]
    pub fn parse(code: &str) -> Option<Self> {
        let code = code.trim();
        if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
            Some(Self(code.to_ascii_uppercase()))
        } else {
            None
        }
    }

    /// US dollars
    #[must_use]
    pub fn usd() -> Self {
        Self("USD".to_string())
    }

    /// Euros
    #[must_use]
    pub fn eur() -> Self {
        Self("EUR".to_string())
    }

    /// The code as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Currency {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("invalid currency code: {value}"))
    }
}

impl From<Currency> for String {
    fn from(value: Currency) -> Self {
        value.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Events and stock
// ============================================================================

/// The slice of an event this engine needs: its purchase window.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Event identifier
    pub id: EventId,
    /// Display name
    pub name: String,
    /// First instant at which tickets may be bought
    pub start_time: DateTime<Utc>,
    /// Last instant at which tickets may be bought
    pub end_time: DateTime<Utc>,
}

/// Authoritative inventory record for one ticket type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketTypeStock {
    /// Which ticket type this record describes
    pub ticket_type: TicketTypeRef,
    /// Price of one unit
    pub unit_price: Money,
    /// Currency of `unit_price`
    pub currency: Currency,
    /// Units created for sale
    pub total_quantity: u32,
    /// Units still unsold
    pub remaining: u32,
}

impl TicketTypeStock {
    /// Creates a fully stocked record
    #[must_use]
    pub const fn new(
        ticket_type: TicketTypeRef,
        unit_price: Money,
        currency: Currency,
        total_quantity: u32,
    ) -> Self {
        Self {
            ticket_type,
            unit_price,
            currency,
            total_quantity,
            remaining: total_quantity,
        }
    }

    /// Units already sold
    #[must_use]
    pub const fn sold(&self) -> u32 {
        self.total_quantity.saturating_sub(self.remaining)
    }
}

// ============================================================================
// Payments
// ============================================================================

/// Lifecycle status of a payment
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Submitted, no answer yet
    Pending,
    /// Charged successfully
    Approved,
    /// Explicitly refused by the provider
    Declined,
    /// Money returned to the buyer
    Refunded,
}

impl PaymentStatus {
    /// Stable lower-case name (used for storage and logs)
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Declined => "declined",
            Self::Refunded => "refunded",
        }
    }

    /// Parses the stable name back
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "declined" => Some(Self::Declined),
            "refunded" => Some(Self::Refunded),
            _ => None,
        }
    }

    /// Whether the payment can no longer change except through a refund
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// A charge recorded by the payment gateway.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    /// Internal payment identifier
    pub id: PaymentId,
    /// Buyer
    pub user_id: UserId,
    /// Event of the primary line
    pub event_id: EventId,
    /// Ticket type of the primary line
    pub ticket_type: TicketTypeRef,
    /// Method that was charged
    pub payment_method: PaymentMethodId,
    /// Charged amount
    pub amount: Money,
    /// Currency of `amount`
    pub currency: Currency,
    /// Key the charge was recorded under
    pub idempotency_key: String,
    /// Identifier assigned by the provider
    pub provider_payment_id: String,
    /// Current status
    pub status: PaymentStatus,
    /// When the payment was recorded
    pub created_at: DateTime<Utc>,
}

impl Payment {
    /// Whether the charge went through
    #[must_use]
    pub fn is_approved(&self) -> bool {
        self.status == PaymentStatus::Approved
    }
}

/// Stored, provider-verified card snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethod {
    /// Snapshot identifier
    pub id: PaymentMethodId,
    /// Owning user
    pub owner: UserId,
    /// Provider-side account/card identifier
    pub provider_account_id: String,
    /// Last four digits for display
    pub last_four: String,
    /// Expiry month (1-12)
    pub exp_month: u32,
    /// Expiry year (four digits)
    pub exp_year: i32,
    /// Currency the method settles in
    pub currency: Currency,
}

// ============================================================================
// Tickets
// ============================================================================

/// Lifecycle status of a minted ticket
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    /// Admits its holder
    Valid,
    /// Cancelled by a refund
    Voided,
}

impl TicketStatus {
    /// Stable lower-case name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Voided => "voided",
        }
    }

    /// Parses the stable name back
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "valid" => Some(Self::Valid),
            "voided" => Some(Self::Voided),
            _ => None,
        }
    }
}

/// One admission, minted per purchased unit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Globally unique presentable code
    pub code: crate::ticket_code::TicketCode,
    /// Holder
    pub owner: UserId,
    /// Event admitted to
    pub event_id: EventId,
    /// Ticket type purchased
    pub ticket_type: TicketTypeRef,
    /// Payment that paid for it
    pub payment_id: PaymentId,
    /// Current status
    pub status: TicketStatus,
    /// When it was minted
    pub issued_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn money_display_uses_two_decimals() {
        assert_eq!(Money::from_cents(12_345).to_string(), "123.45");
        assert_eq!(Money::from_cents(7).to_string(), "0.07");
    }

    #[test]
    fn money_multiplication_detects_overflow() {
        assert_eq!(Money::from_cents(2_500).checked_mul(3), Some(Money::from_cents(7_500)));
        assert_eq!(Money::from_cents(u64::MAX).checked_mul(2), None);
    }

    #[test]
    fn currency_parse_normalises_case() {
        assert_eq!(Currency::parse("usd"), Some(Currency::usd()));
        assert_eq!(Currency::parse("US"), None);
        assert_eq!(Currency::parse("U5D"), None);
    }

    #[test]
    fn ticket_type_refs_order_by_event_then_name() {
        let event = EventId::new();
        let general = TicketTypeRef::new(event, "General");
        let vip = TicketTypeRef::new(event, "VIP");
        assert!(general < vip);
    }

    #[test]
    fn payment_status_round_trips_through_storage_name() {
        for status in [
            PaymentStatus::Pending,
            PaymentStatus::Approved,
            PaymentStatus::Declined,
            PaymentStatus::Refunded,
        ] {
            assert_eq!(PaymentStatus::parse(status.as_str()), Some(status));
        }
        assert!(!PaymentStatus::Pending.is_terminal());
    }
}
