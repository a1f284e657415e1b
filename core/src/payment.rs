//! Payment gateway interface.
//!
//! The payment provider is an external service. This module defines what the
//! checkout engine needs from it: verify and store a card snapshot, charge
//! with an idempotency key, refund, and read back what it recorded. Every
//! mutating call carries a key, and replaying a key must return the stored
//! result instead of charging again.

use crate::card::{CardDetails, CardRejection};
use crate::error::CheckoutError;
use crate::types::{Currency, EventId, Money, Payment, PaymentId, PaymentMethod, PaymentMethodId, TicketTypeRef, UserId};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Payment gateway result
pub type GatewayResult<T> = Result<T, PaymentGatewayError>;

/// Boxed future returned by gateway calls
pub type GatewayFuture<T> = Pin<Box<dyn Future<Output = GatewayResult<T>> + Send>>;

/// Payment gateway error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaymentGatewayError {
    /// The provider rejected the card data
    #[error("Card rejected: {0}")]
    CardInvalid(CardRejection),

    /// The provider refused the charge
    #[error("Declined: {reason}")]
    Declined {
        /// Decline reason
        reason: String,
    },

    /// The provider could not be reached or answered with a server error
    #[error("Gateway unreachable: {message}")]
    Unreachable {
        /// Transport error description
        message: String,
    },

    /// No payment exists under the given id
    #[error("Payment not found: {0}")]
    PaymentNotFound(PaymentId),
}

impl PaymentGatewayError {
    /// Whether the same call with the same key may succeed later
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unreachable { .. })
    }
}

impl From<PaymentGatewayError> for CheckoutError {
    fn from(error: PaymentGatewayError) -> Self {
        match error {
            PaymentGatewayError::CardInvalid(rejection) => Self::CardInvalid(rejection),
            PaymentGatewayError::Declined { reason } => Self::ProviderDecline { reason },
            PaymentGatewayError::Unreachable { message } => Self::ProviderUnreachable { message },
            PaymentGatewayError::PaymentNotFound(id) => Self::not_found("payment", id),
        }
    }
}

/// Everything the gateway needs to charge a checkout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeRequest {
    /// Buyer
    pub user_id: UserId,
    /// Event of the primary line
    pub event_id: EventId,
    /// Primary line: the first ticket type in lock order
    pub ticket_type: TicketTypeRef,
    /// Stored method to charge
    pub payment_method: PaymentMethodId,
    /// Amount to charge
    pub amount: Money,
    /// Currency of `amount`
    pub currency: Currency,
    /// One key per logical checkout attempt
    pub idempotency_key: String,
}

/// Payment gateway trait
///
/// Abstraction over the payment provider. Implementations must be
/// idempotent per key: a second `charge_and_record` with a key that already
/// has a terminal payment returns that payment unchanged.
pub trait PaymentGateway: Send + Sync {
    /// Verify a card with the provider and store a snapshot of it.
    ///
    /// A card already stored for the same owner and provider account yields
    /// the existing snapshot.
    ///
    /// # Errors
    ///
    /// - `CardInvalid` if the provider rejects the card
    /// - `Unreachable` on transport failure
    fn verify_and_store(&self, owner: UserId, card: CardDetails) -> GatewayFuture<PaymentMethod>;

    /// Charge a stored method and record the payment under the request's key.
    ///
    /// A decline is reported as a recorded payment with status `Declined`,
    /// not as an error.
    ///
    /// # Errors
    ///
    /// - `Declined` if the provider refuses without recording a payment
    /// - `Unreachable` on transport failure; retry with the same key
    fn charge_and_record(&self, request: ChargeRequest) -> GatewayFuture<Payment>;

    /// Refund `amount` of a payment. Returns whether the provider accepted.
    ///
    /// # Errors
    ///
    /// - `PaymentNotFound` if the payment does not exist
    /// - `Unreachable` on transport failure
    fn refund(&self, payment_id: PaymentId, amount: Money, idempotency_key: String) -> GatewayFuture<bool>;

    /// Look up a stored payment method.
    ///
    /// # Errors
    ///
    /// Returns `Unreachable` on transport failure.
    fn payment_method(&self, id: PaymentMethodId) -> GatewayFuture<Option<PaymentMethod>>;

    /// Look up a payment.
    ///
    /// # Errors
    ///
    /// Returns `Unreachable` on transport failure.
    fn payment(&self, id: PaymentId) -> GatewayFuture<Option<Payment>>;

    /// Look up the payment recorded under an idempotency key.
    ///
    /// # Errors
    ///
    /// Returns `Unreachable` on transport failure.
    fn payment_by_idempotency_key(&self, idempotency_key: String) -> GatewayFuture<Option<Payment>>;
}
