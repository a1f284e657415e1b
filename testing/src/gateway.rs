//! Scriptable payment gateway.
//!
//! Behaves like an idempotent provider: a charge key maps to at most one
//! payment and replaying it returns the stored payment. Tests can script
//! declines, transport failures and lost responses, and count how many
//! charges were really made.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use ticket_checkout_core::{
    CardDetails, CardRejection, ChargeRequest, Currency, GatewayFuture, GatewayResult, Money, Payment, PaymentGateway,
    PaymentGatewayError, PaymentId, PaymentMethod, PaymentMethodId, PaymentStatus, UserId,
};

#[derive(Debug, Default)]
struct GatewayState {
    methods: HashMap<PaymentMethodId, PaymentMethod>,
    payments: HashMap<PaymentId, Payment>,
    by_key: HashMap<String, PaymentId>,
    refund_keys: HashMap<String, PaymentId>,
    charge_calls: usize,
    charges_made: usize,
    refunds_made: usize,
    unreachable_calls: usize,
    lose_next_response: bool,
    decline_reason: Option<String>,
    reject_cards: Option<String>,
    fail_refunds: bool,
}

/// Mock payment gateway (approves everything unless scripted otherwise).
#[derive(Debug, Clone, Default)]
pub struct MockPaymentGateway {
    state: Arc<Mutex<GatewayState>>,
    latency: Option<Duration>,
}

fn unavailable<T>(_: T) -> PaymentGatewayError {
    PaymentGatewayError::Unreachable {
        message: "mock gateway state poisoned".to_string(),
    }
}

impl MockPaymentGateway {
    /// Creates a new mock payment gateway
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency`
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut GatewayState) -> T) -> Option<T> {
        self.state.lock().ok().map(|mut state| f(&mut state))
    }

    /// Store a verified card snapshot for `owner` directly.
    #[must_use]
    pub fn add_payment_method(&self, owner: UserId) -> PaymentMethod {
        let method = PaymentMethod {
            id: PaymentMethodId::new(),
            owner,
            provider_account_id: format!("acct_{}", PaymentMethodId::new()),
            last_four: "4242".to_string(),
            exp_month: 12,
            exp_year: 2030,
            currency: Currency::usd(),
        };
        let stored = method.clone();
        self.with_state(|state| state.methods.insert(stored.id, stored));
        method
    }

    /// Decline every new charge with `reason`.
    pub fn decline_charges(&self, reason: &str) {
        let reason = reason.to_string();
        self.with_state(|state| state.decline_reason = Some(reason));
    }

    /// Approve new charges again.
    pub fn approve_charges(&self) {
        self.with_state(|state| state.decline_reason = None);
    }

    /// Reject every card submitted for verification with `reason`.
    pub fn reject_cards(&self, reason: &str) {
        let reason = reason.to_string();
        self.with_state(|state| state.reject_cards = Some(reason));
    }

    /// Fail the next `calls` mutating calls in transport, before anything is recorded.
    pub fn fail_next(&self, calls: usize) {
        self.with_state(|state| state.unreachable_calls = calls);
    }

    /// Fail every refund in transport until called again with `false`.
    pub fn fail_refunds(&self, fail: bool) {
        self.with_state(|state| state.fail_refunds = fail);
    }

    /// Record the next charge but report a transport failure to the caller.
    pub fn lose_next_response(&self) {
        self.with_state(|state| state.lose_next_response = true);
    }

    /// `charge_and_record` invocations, including replays and failures
    #[must_use]
    pub fn charge_calls(&self) -> usize {
        self.with_state(|state| state.charge_calls).unwrap_or_default()
    }

    /// Charges that actually created a payment
    #[must_use]
    pub fn charges_made(&self) -> usize {
        self.with_state(|state| state.charges_made).unwrap_or_default()
    }

    /// Refunds that actually moved money
    #[must_use]
    pub fn refunds_made(&self) -> usize {
        self.with_state(|state| state.refunds_made).unwrap_or_default()
    }

    /// Every recorded payment
    #[must_use]
    pub fn payments(&self) -> Vec<Payment> {
        self.with_state(|state| state.payments.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Payment methods stored for `owner`
    #[must_use]
    pub fn methods_of(&self, owner: UserId) -> Vec<PaymentMethod> {
        self.with_state(|state| {
            state
                .methods
                .values()
                .filter(|method| method.owner == owner)
                .cloned()
                .collect()
        })
        .unwrap_or_default()
    }

    async fn pause(latency: Option<Duration>) {
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

impl GatewayState {
    fn take_transport_failure(&mut self) -> GatewayResult<()> {
        if self.unreachable_calls > 0 {
            self.unreachable_calls -= 1;
            return Err(PaymentGatewayError::Unreachable {
                message: "connection reset by peer".to_string(),
            });
        }
        Ok(())
    }

    fn charge(&mut self, request: ChargeRequest) -> GatewayResult<Payment> {
        self.charge_calls += 1;
        self.take_transport_failure()?;

        if let Some(existing) = self.by_key.get(&request.idempotency_key) {
            return self
                .payments
                .get(existing)
                .cloned()
                .ok_or(PaymentGatewayError::PaymentNotFound(*existing));
        }

        let method = self
            .methods
            .get(&request.payment_method)
            .ok_or_else(|| PaymentGatewayError::Declined {
                reason: "unknown payment method".to_string(),
            })?;
        if method.owner != request.user_id {
            return Err(PaymentGatewayError::Declined {
                reason: "payment method belongs to another customer".to_string(),
            });
        }

        let status = if self.decline_reason.is_some() {
            PaymentStatus::Declined
        } else {
            self.charges_made += 1;
            PaymentStatus::Approved
        };

        let payment = Payment {
            id: PaymentId::new(),
            user_id: request.user_id,
            event_id: request.event_id,
            ticket_type: request.ticket_type,
            payment_method: request.payment_method,
            amount: request.amount,
            currency: request.currency,
            idempotency_key: request.idempotency_key.clone(),
            provider_payment_id: format!("mock_txn_{}", uuid::Uuid::new_v4()),
            status,
            created_at: Utc::now(),
        };
        self.by_key.insert(request.idempotency_key, payment.id);
        self.payments.insert(payment.id, payment.clone());

        if std::mem::take(&mut self.lose_next_response) {
            return Err(PaymentGatewayError::Unreachable {
                message: "response lost".to_string(),
            });
        }
        Ok(payment)
    }

    fn refund(&mut self, payment_id: PaymentId, amount: Money, key: String) -> GatewayResult<bool> {
        self.take_transport_failure()?;
        if self.fail_refunds {
            return Err(PaymentGatewayError::Unreachable {
                message: "refund endpoint timed out".to_string(),
            });
        }

        if self.refund_keys.get(&key) == Some(&payment_id) {
            return Ok(true);
        }

        let payment = self
            .payments
            .get_mut(&payment_id)
            .ok_or(PaymentGatewayError::PaymentNotFound(payment_id))?;
        if payment.status != PaymentStatus::Approved || amount > payment.amount {
            return Ok(false);
        }

        payment.status = PaymentStatus::Refunded;
        self.refunds_made += 1;
        self.refund_keys.insert(key, payment_id);
        Ok(true)
    }

    fn verify(&mut self, owner: UserId, card: &CardDetails) -> GatewayResult<PaymentMethod> {
        self.take_transport_failure()?;

        if let Some(reason) = &self.reject_cards {
            return Err(PaymentGatewayError::CardInvalid(CardRejection::Provider { reason: reason.clone() }));
        }

        let provider_account_id = format!("card_{}_{:02}{}", card.last_four(), card.exp_month, card.exp_year);
        if let Some(existing) = self
            .methods
            .values()
            .find(|method| method.owner == owner && method.provider_account_id == provider_account_id)
        {
            return Ok(existing.clone());
        }

        let method = PaymentMethod {
            id: PaymentMethodId::new(),
            owner,
            provider_account_id,
            last_four: card.last_four(),
            exp_month: card.exp_month,
            exp_year: card.exp_year,
            currency: card.currency.clone(),
        };
        self.methods.insert(method.id, method.clone());
        Ok(method)
    }
}

impl PaymentGateway for MockPaymentGateway {
    fn verify_and_store(&self, owner: UserId, card: CardDetails) -> GatewayFuture<PaymentMethod> {
        let state = Arc::clone(&self.state);
        let latency = self.latency;
        Box::pin(async move {
            Self::pause(latency).await;
            state.lock().map_err(unavailable)?.verify(owner, &card)
        })
    }

    fn charge_and_record(&self, request: ChargeRequest) -> GatewayFuture<Payment> {
        let state = Arc::clone(&self.state);
        let latency = self.latency;
        Box::pin(async move {
            Self::pause(latency).await;
            let payment = state.lock().map_err(unavailable)?.charge(request)?;
            tracing::info!(
                payment_id = %payment.id,
                amount = payment.amount.cents(),
                status = payment.status.as_str(),
                "Mock charge recorded"
            );
            Ok(payment)
        })
    }

    fn refund(&self, payment_id: PaymentId, amount: Money, idempotency_key: String) -> GatewayFuture<bool> {
        let state = Arc::clone(&self.state);
        let latency = self.latency;
        Box::pin(async move {
            Self::pause(latency).await;
            state.lock().map_err(unavailable)?.refund(payment_id, amount, idempotency_key)
        })
    }

    fn payment_method(&self, id: PaymentMethodId) -> GatewayFuture<Option<PaymentMethod>> {
        let state = Arc::clone(&self.state);
        Box::pin(async move { Ok(state.lock().map_err(unavailable)?.methods.get(&id).cloned()) })
    }

    fn payment(&self, id: PaymentId) -> GatewayFuture<Option<Payment>> {
        let state = Arc::clone(&self.state);
        Box::pin(async move { Ok(state.lock().map_err(unavailable)?.payments.get(&id).cloned()) })
    }

    fn payment_by_idempotency_key(&self, idempotency_key: String) -> GatewayFuture<Option<Payment>> {
        let state = Arc::clone(&self.state);
        Box::pin(async move {
            let state = state.lock().map_err(unavailable)?;
            Ok(state
                .by_key
                .get(&idempotency_key)
                .and_then(|id| state.payments.get(id))
                .cloned())
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use ticket_checkout_core::{EventId, TicketTypeRef};

    fn request(owner: UserId, method: PaymentMethodId, key: &str) -> ChargeRequest {
        let event = EventId::new();
        ChargeRequest {
            user_id: owner,
            event_id: event,
            ticket_type: TicketTypeRef::new(event, "General"),
            payment_method: method,
            amount: Money::from_cents(5_000),
            currency: Currency::usd(),
            idempotency_key: key.to_string(),
        }
    }

    #[tokio::test]
    async fn replayed_key_returns_the_stored_payment() {
        let gateway = MockPaymentGateway::new();
        let owner = UserId::new();
        let method = gateway.add_payment_method(owner);

        let first = gateway.charge_and_record(request(owner, method.id, "k1")).await.unwrap();
        let second = gateway.charge_and_record(request(owner, method.id, "k1")).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(gateway.charges_made(), 1);
        assert_eq!(gateway.charge_calls(), 2);
    }

    #[tokio::test]
    async fn lost_response_is_recorded_once() {
        let gateway = MockPaymentGateway::new();
        let owner = UserId::new();
        let method = gateway.add_payment_method(owner);
        gateway.lose_next_response();

        let lost = gateway.charge_and_record(request(owner, method.id, "k2")).await;
        assert!(matches!(lost, Err(PaymentGatewayError::Unreachable { .. })));

        let retried = gateway.charge_and_record(request(owner, method.id, "k2")).await.unwrap();
        assert!(retried.is_approved());
        assert_eq!(gateway.charges_made(), 1);
    }

    #[tokio::test]
    async fn same_card_is_stored_once_per_owner() {
        let gateway = MockPaymentGateway::new();
        let owner = UserId::new();
        let card = CardDetails {
            holder_name: "Ada Lovelace".to_string(),
            number: "4242 4242 4242 4242".to_string(),
            exp_month: 12,
            exp_year: 2030,
            cvc: "123".to_string(),
            currency: Currency::usd(),
        };

        let first = gateway.verify_and_store(owner, card.clone()).await.unwrap();
        let second = gateway.verify_and_store(owner, card).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(gateway.methods_of(owner).len(), 1);
    }

    #[tokio::test]
    async fn refund_is_idempotent_per_key() {
        let gateway = MockPaymentGateway::new();
        let owner = UserId::new();
        let method = gateway.add_payment_method(owner);
        let payment = gateway.charge_and_record(request(owner, method.id, "k3")).await.unwrap();

        assert!(gateway.refund(payment.id, payment.amount, "r".to_string()).await.unwrap());
        assert!(gateway.refund(payment.id, payment.amount, "r".to_string()).await.unwrap());
        assert!(!gateway.refund(payment.id, payment.amount, "other".to_string()).await.unwrap());
        assert_eq!(gateway.refunds_made(), 1);
    }
}
