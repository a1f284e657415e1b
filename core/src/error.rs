//! Error types for cart and checkout operations.

use crate::card::CardRejection;
use crate::types::{Currency, EventId, Money, TicketTypeRef};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Result type alias for checkout operations.
pub type Result<T> = std::result::Result<T, CheckoutError>;

/// Every way a cart mutation, checkout or refund can fail.
///
/// Nothing in the engine swallows one of these: a failure aborts the
/// enclosing transaction and reaches the caller with its kind intact.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CheckoutError {
    // ═══════════════════════════════════════════════════════════
    // Request errors
    // ═══════════════════════════════════════════════════════════

    /// A referenced ticket type, event, payment or payment method does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of entity that was looked up
        entity: &'static str,
        /// Identifier that was looked up
        id: String,
    },

    /// Checkout attempted with an empty cart.
    #[error("Cart is empty")]
    EmptyCart,

    /// Cart quantities must be at least one.
    #[error("Quantity must be at least 1, got {quantity}")]
    InvalidQuantity {
        /// Rejected quantity
        quantity: u32,
    },

    /// Neither a saved payment method nor inline card data was supplied.
    #[error("No payment method supplied")]
    NoPaymentMethod,

    /// Both a saved payment method and inline card data were supplied.
    #[error("Supply either a saved payment method or a card, not both")]
    AmbiguousPaymentMethod,

    /// The saved payment method or payment belongs to someone else.
    #[error("Forbidden")]
    Forbidden,

    /// Lines in one cart must share a currency.
    #[error("Currency mismatch: cart is in {expected}, line is in {found}")]
    MixedCurrency {
        /// Currency already in the cart
        expected: Currency,
        /// Currency of the offending line
        found: Currency,
    },

    // ═══════════════════════════════════════════════════════════
    // Availability errors
    // ═══════════════════════════════════════════════════════════

    /// Purchase attempted outside the event's active window.
    #[error("Event {event_id} is not on sale at {at}")]
    EventUnavailable {
        /// Event whose window is closed
        event_id: EventId,
        /// Instant the purchase was attempted
        at: DateTime<Utc>,
    },

    /// Requested quantity exceeds what is left.
    #[error("Insufficient stock for {ticket_type}: requested {requested}, remaining {remaining}")]
    InsufficientStock {
        /// Ticket type that ran out
        ticket_type: TicketTypeRef,
        /// Units asked for
        requested: u32,
        /// Units left
        remaining: u32,
    },

    // ═══════════════════════════════════════════════════════════
    // Payment errors
    // ═══════════════════════════════════════════════════════════

    /// Card failed format, expiry or identity checks.
    #[error("Card invalid: {0}")]
    CardInvalid(CardRejection),

    /// The provider explicitly refused the charge. Terminal.
    #[error("Payment declined: {reason}")]
    ProviderDecline {
        /// Reason reported by the provider
        reason: String,
    },

    /// Transport-level failure talking to the provider. Retryable.
    #[error("Payment provider unreachable: {message}")]
    ProviderUnreachable {
        /// Transport error description
        message: String,
    },

    /// The attempt id was already charged for a different order.
    ///
    /// Retrying an attempt must not change what it buys; start a new attempt.
    #[error("Attempt already charged {charged} {currency}, order now totals {expected} {currency}")]
    AttemptMismatch {
        /// Amount of the earlier charge under this attempt
        charged: Money,
        /// Total of the order as it stands now
        expected: Money,
        /// Currency of the current order
        currency: Currency,
    },

    /// Only approved payments can be refunded.
    #[error("Payment is {status} and cannot be refunded")]
    NotRefundable {
        /// Current payment status
        status: &'static str,
    },

    // ═══════════════════════════════════════════════════════════
    // System errors
    // ═══════════════════════════════════════════════════════════

    /// Ticket code generation kept colliding.
    #[error("Could not generate a unique ticket code after {attempts} attempts")]
    CodeSpaceExhausted {
        /// Attempts made
        attempts: usize,
    },

    /// The backing store failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// The engine broke one of its own invariants.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CheckoutError {
    /// Convenience constructor for [`CheckoutError::NotFound`].
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`CheckoutError::Storage`].
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Stable label for logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::EmptyCart => "empty_cart",
            Self::InvalidQuantity { .. } => "invalid_quantity",
            Self::NoPaymentMethod => "no_payment_method",
            Self::AmbiguousPaymentMethod => "ambiguous_payment_method",
            Self::Forbidden => "forbidden",
            Self::MixedCurrency { .. } => "mixed_currency",
            Self::EventUnavailable { .. } => "event_unavailable",
            Self::InsufficientStock { .. } => "insufficient_stock",
            Self::CardInvalid(_) => "card_invalid",
            Self::ProviderDecline { .. } => "provider_decline",
            Self::ProviderUnreachable { .. } => "provider_unreachable",
            Self::AttemptMismatch { .. } => "attempt_mismatch",
            Self::NotRefundable { .. } => "not_refundable",
            Self::CodeSpaceExhausted { .. } => "code_space_exhausted",
            Self::Storage(_) => "storage",
            Self::Internal(_) => "internal",
        }
    }

    /// HTTP status a controller should answer with.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::NotFound { .. } => 404,
            Self::EmptyCart
            | Self::InvalidQuantity { .. }
            | Self::NoPaymentMethod
            | Self::AmbiguousPaymentMethod
            | Self::MixedCurrency { .. } => 400,
            Self::Forbidden => 403,
            Self::EventUnavailable { .. }
            | Self::InsufficientStock { .. }
            | Self::AttemptMismatch { .. }
            | Self::NotRefundable { .. } => 409,
            Self::CardInvalid(_) => 422,
            Self::ProviderDecline { .. } => 402,
            Self::ProviderUnreachable { .. } => 503,
            Self::CodeSpaceExhausted { .. } | Self::Storage(_) | Self::Internal(_) => 500,
        }
    }

    /// Returns `true` if retrying the identical request may succeed.
    ///
    /// A decline is never retryable; an unreachable provider always is.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ProviderUnreachable { .. } | Self::Storage(_) | Self::CodeSpaceExhausted { .. }
        )
    }
}
