//! The all-or-nothing checkout.
//!
//! One checkout runs inside one inventory transaction:
//!
//! 1. lock every ticket type in the cart, in ascending order
//! 2. re-check event windows and stock under the locks
//! 3. charge the gateway under the attempt's idempotency key
//! 4. decrement stock and mint one ticket per unit
//! 5. commit, then clear the cart and notify
//!
//! The locks are held across the gateway call. Competing buyers for the same
//! ticket type queue on the row lock; the loser sees the winner's decrement
//! and fails with `InsufficientStock` without being charged. If anything
//! fails after the charge was approved, the transaction is rolled back and
//! the charge is refunded.

use crate::environment::CheckoutEnvironment;
use crate::metrics::CheckoutMetrics;
use crate::minter::TicketMinter;
use crate::retry::{RetryPolicy, retry_with_backoff, retry_with_predicate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use ticket_checkout_core::{
    CardDetails, CartStore, ChargeRequest, CheckoutError, CheckoutProgress, CheckoutState, CheckoutTransaction,
    Currency, EventLookup, IdempotencyKey, InventoryStore, LockedStockAccessor, Money, NotificationKind, Payment,
    PaymentGatewayError, PaymentId, PaymentMethod, PaymentMethodId, PaymentStatus, RestockPolicy, Result, Ticket,
    TicketStatus, TicketTypeRef, UserId,
};
use uuid::Uuid;

/// The authenticated buyer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Buyer {
    /// Account id
    pub id: UserId,
    /// Full name, matched against the card holder
    pub name: String,
}

/// One checkout attempt as submitted by the client.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckoutRequest {
    /// Who is buying
    pub buyer: Buyer,
    /// Client-chosen id; retries of the same attempt reuse it
    pub attempt_id: Uuid,
    /// A previously stored payment method
    pub saved_method: Option<PaymentMethodId>,
    /// Inline card data
    pub card: Option<CardDetails>,
}

impl CheckoutRequest {
    /// Checkout paying with a stored method
    #[must_use]
    pub fn with_saved_method(buyer: Buyer, attempt_id: Uuid, method: PaymentMethodId) -> Self {
        Self {
            buyer,
            attempt_id,
            saved_method: Some(method),
            card: None,
        }
    }

    /// Checkout paying with an inline card
    #[must_use]
    pub fn with_card(buyer: Buyer, attempt_id: Uuid, card: CardDetails) -> Self {
        Self {
            buyer,
            attempt_id,
            saved_method: None,
            card: Some(card),
        }
    }
}

/// What a successful checkout returns.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutReceipt {
    /// The approved payment
    pub payment: Payment,
    /// One ticket per purchased unit
    pub tickets: Vec<Ticket>,
    /// True when this is the stored result of an earlier identical attempt
    pub replayed: bool,
}

/// What a successful refund returns.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundReceipt {
    /// Refunded payment
    pub payment_id: PaymentId,
    /// Amount returned
    pub amount: Money,
    /// Currency of `amount`
    pub currency: Currency,
    /// Tickets voided
    pub voided: u64,
    /// Whether the units went back on sale
    pub restocked: bool,
}

/// Validated, repriced content of a locked cart.
struct LockedOrder {
    quantities: BTreeMap<TicketTypeRef, u32>,
    total: Money,
    currency: Currency,
}

/// Drives checkouts and refunds.
pub struct CheckoutOrchestrator<I, C, E> {
    env: Arc<CheckoutEnvironment<I, C, E>>,
    minter: TicketMinter,
}

impl<I, C, E> Clone for CheckoutOrchestrator<I, C, E> {
    fn clone(&self) -> Self {
        Self {
            env: Arc::clone(&self.env),
            minter: self.minter.clone(),
        }
    }
}

impl<I, C, E> CheckoutOrchestrator<I, C, E>
where
    I: InventoryStore,
    C: CartStore,
    E: EventLookup,
{
    /// Creates an orchestrator over a shared environment
    #[must_use]
    pub fn new(env: Arc<CheckoutEnvironment<I, C, E>>) -> Self {
        let minter = TicketMinter::new(Arc::clone(&env.codes), env.config.max_code_attempts);
        Self { env, minter }
    }

    /// Convert the buyer's cart into a charge and minted tickets.
    ///
    /// Either every line is bought or nothing changes. Replaying an attempt
    /// that already succeeded returns its original payment and tickets.
    ///
    /// # Errors
    ///
    /// - `EmptyCart` if there is nothing to buy
    /// - `NoPaymentMethod`, `AmbiguousPaymentMethod`, `NotFound`, `Forbidden`
    ///   or `CardInvalid` if the payment method cannot be used
    /// - `NotFound`, `EventUnavailable`, `InsufficientStock` or `MixedCurrency`
    ///   if a line fails re-validation under the lock
    /// - `ProviderDecline` if the charge is refused; stock is untouched
    /// - `ProviderUnreachable` if the gateway stays unreachable; retry with
    ///   the same attempt id
    /// - `CodeSpaceExhausted` or `Storage` if persisting fails; any approved
    ///   charge is refunded
    pub async fn checkout(&self, request: CheckoutRequest) -> Result<CheckoutReceipt> {
        let mut progress = CheckoutProgress::start();
        let user = request.buyer.id;
        let key = IdempotencyKey::derive(user, request.attempt_id);

        tracing::info!(
            user_id = %user,
            attempt_id = %request.attempt_id,
            "Checkout started"
        );

        let result = self.run_checkout(&request, &key, &mut progress).await;

        let outcome = match &result {
            Ok(receipt) if receipt.replayed => "replayed",
            Ok(_) => "committed",
            Err(err) => err.kind(),
        };
        CheckoutMetrics::record_outcome(outcome, progress.elapsed_secs());

        match &result {
            Ok(receipt) if receipt.replayed => {
                tracing::info!(
                    user_id = %user,
                    payment_id = %receipt.payment.id,
                    tickets = receipt.tickets.len(),
                    "Checkout replayed"
                );
            }
            Ok(receipt) => {
                CheckoutMetrics::record_committed(receipt.tickets.len(), receipt.payment.amount.cents());
                tracing::info!(
                    user_id = %user,
                    payment_id = %receipt.payment.id,
                    amount = receipt.payment.amount.cents(),
                    tickets = receipt.tickets.len(),
                    "Checkout committed"
                );
                self.after_commit(user, receipt).await;
            }
            Err(err) => {
                tracing::warn!(
                    user_id = %user,
                    attempt_id = %request.attempt_id,
                    state = %progress.state(),
                    error = %err,
                    "Checkout aborted"
                );
            }
        }

        result
    }

    async fn run_checkout(
        &self,
        request: &CheckoutRequest,
        key: &IdempotencyKey,
        progress: &mut CheckoutProgress,
    ) -> Result<CheckoutReceipt> {
        let user = request.buyer.id;

        if let Some(receipt) = self.stored_receipt(key).await? {
            return Ok(receipt);
        }

        let cart = match self.env.carts.load(user).await? {
            Some(cart) if !cart.is_empty() => cart,
            _ => {
                // A duplicate of this attempt may have committed and cleared the cart meanwhile.
                if let Some(receipt) = self.stored_receipt(key).await? {
                    return Ok(receipt);
                }
                progress.abort();
                return Err(CheckoutError::EmptyCart);
            }
        };

        let method = match self.resolve_payment_method(request).await {
            Ok(method) => method,
            Err(err) => {
                progress.abort();
                return Err(err);
            }
        };

        let mut requested: BTreeMap<TicketTypeRef, u32> = BTreeMap::new();
        for line in &cart.lines {
            let quantity = requested.entry(line.ticket_type.clone()).or_default();
            *quantity = quantity
                .checked_add(line.quantity)
                .ok_or(CheckoutError::InvalidQuantity { quantity: line.quantity })?;
        }

        let mut accessor = LockedStockAccessor::new(self.env.inventory.begin().await?);
        let mut charged: Option<Payment> = None;

        let locked = self
            .locked_checkout(&mut accessor, user, &method, &requested, key, progress, &mut charged)
            .await;

        match locked {
            Ok(LockedOutcome::Replayed(receipt)) => {
                Self::release(accessor).await;
                progress.abort();
                Ok(receipt)
            }
            Ok(LockedOutcome::Minted { payment, tickets }) => match accessor.commit().await {
                Ok(()) => {
                    progress.advance(CheckoutState::Committed)?;
                    Ok(CheckoutReceipt {
                        payment,
                        tickets,
                        replayed: false,
                    })
                }
                Err(err) => {
                    progress.abort();
                    self.compensate(&payment, key, &err).await;
                    Err(err)
                }
            },
            Err(err) => {
                Self::release(accessor).await;
                progress.abort();
                if let Some(payment) = &charged {
                    self.compensate(payment, key, &err).await;
                }
                Err(err)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn locked_checkout(
        &self,
        accessor: &mut LockedStockAccessor<I::Transaction>,
        user: UserId,
        method: &PaymentMethod,
        requested: &BTreeMap<TicketTypeRef, u32>,
        key: &IdempotencyKey,
        progress: &mut CheckoutProgress,
        charged: &mut Option<Payment>,
    ) -> Result<LockedOutcome> {
        accessor.lock_all(requested.keys()).await?;

        // A concurrent duplicate may have committed while we waited for the locks.
        let existing = self.payment_for_key(key).await?;
        if let Some(payment) = existing.filter(Payment::is_approved) {
            let tickets = accessor.transaction().tickets_for_payment(payment.id).await?;
            if !tickets.is_empty() {
                return Ok(LockedOutcome::Replayed(CheckoutReceipt {
                    payment,
                    tickets,
                    replayed: true,
                }));
            }
        }

        let now = self.env.clock.now();
        let events: BTreeSet<_> = requested.keys().map(|ticket_type| ticket_type.event_id).collect();
        for event_id in events {
            self.env.gate.check(event_id, now).await?;
        }
        let order = Self::price_locked(accessor, requested)?;
        progress.advance(CheckoutState::StockValidated)?;

        let primary = order
            .quantities
            .keys()
            .next()
            .cloned()
            .ok_or(CheckoutError::EmptyCart)?;
        let charge = ChargeRequest {
            user_id: user,
            event_id: primary.event_id,
            ticket_type: primary,
            payment_method: method.id,
            amount: order.total,
            currency: order.currency.clone(),
            idempotency_key: key.to_string(),
        };

        let payment = self.charge(charge).await?;
        *charged = Some(payment.clone());
        progress.advance(CheckoutState::PaymentCharged)?;

        for (ticket_type, quantity) in &order.quantities {
            accessor.decrement(ticket_type, *quantity).await?;
        }

        let mut tickets = Vec::new();
        for (ticket_type, quantity) in &order.quantities {
            let minted = self
                .minter
                .mint_many(accessor.transaction(), user, ticket_type, *quantity, payment.id, now)
                .await?;
            tickets.extend(minted);
        }
        progress.advance(CheckoutState::TicketsMinted)?;

        Ok(LockedOutcome::Minted { payment, tickets })
    }

    /// Re-check every line against the locked rows and reprice the order.
    fn price_locked(
        accessor: &LockedStockAccessor<I::Transaction>,
        requested: &BTreeMap<TicketTypeRef, u32>,
    ) -> Result<LockedOrder> {
        let mut total = Money::ZERO;
        let mut currency: Option<Currency> = None;
        for (ticket_type, quantity) in requested {
            let stock = accessor
                .locked(ticket_type)
                .ok_or_else(|| CheckoutError::Internal(format!("{ticket_type} validated without its lock")))?;

            if stock.remaining < *quantity {
                return Err(CheckoutError::InsufficientStock {
                    ticket_type: ticket_type.clone(),
                    requested: *quantity,
                    remaining: stock.remaining,
                });
            }

            match &currency {
                Some(expected) if *expected != stock.currency => {
                    return Err(CheckoutError::MixedCurrency {
                        expected: expected.clone(),
                        found: stock.currency.clone(),
                    });
                }
                Some(_) => {}
                None => currency = Some(stock.currency.clone()),
            }

            total = stock
                .unit_price
                .checked_mul(*quantity)
                .and_then(|subtotal| total.checked_add(subtotal))
                .ok_or_else(|| CheckoutError::Internal("order total overflows".to_string()))?;
        }

        Ok(LockedOrder {
            quantities: requested.clone(),
            total,
            currency: currency.ok_or(CheckoutError::EmptyCart)?,
        })
    }

    async fn charge(&self, request: ChargeRequest) -> Result<Payment> {
        let gateway = Arc::clone(&self.env.gateway);
        let payment = retry_with_predicate(
            RetryPolicy::gateway(&self.env.config),
            "gateway.charge_and_record",
            || gateway.charge_and_record(request.clone()),
            PaymentGatewayError::is_transient,
        )
        .await?;

        match payment.status {
            PaymentStatus::Approved => Self::matching_charge(&request, payment),
            PaymentStatus::Declined => Err(CheckoutError::ProviderDecline {
                reason: format!("payment {} declined", payment.provider_payment_id),
            }),
            PaymentStatus::Pending => Err(CheckoutError::ProviderUnreachable {
                message: format!("payment {} is still pending", payment.id),
            }),
            PaymentStatus::Refunded => Err(CheckoutError::ProviderDecline {
                reason: format!("payment {} for this attempt was already refunded", payment.id),
            }),
        }
    }

    /// Accept a payment only if it pays for exactly this order.
    ///
    /// The gateway answers a reused idempotency key with the earlier charge,
    /// which may have been made for a different cart.
    fn matching_charge(request: &ChargeRequest, payment: Payment) -> Result<Payment> {
        if payment.user_id != request.user_id {
            return Err(CheckoutError::Forbidden);
        }
        if payment.amount != request.amount || payment.currency != request.currency {
            tracing::warn!(
                payment_id = %payment.id,
                charged = payment.amount.cents(),
                expected = request.amount.cents(),
                "Attempt reused for a different order"
            );
            return Err(CheckoutError::AttemptMismatch {
                charged: payment.amount,
                expected: request.amount,
                currency: request.currency.clone(),
            });
        }
        Ok(payment)
    }

    /// Refund an approved charge whose tickets could not be persisted.
    async fn compensate(&self, payment: &Payment, key: &IdempotencyKey, cause: &CheckoutError) {
        let gateway = Arc::clone(&self.env.gateway);
        let refund_key = key.compensation();
        let result = retry_with_predicate(
            RetryPolicy::gateway(&self.env.config),
            "gateway.refund",
            || gateway.refund(payment.id, payment.amount, refund_key.clone()),
            PaymentGatewayError::is_transient,
        )
        .await;

        match result {
            Ok(true) => {
                CheckoutMetrics::record_compensation("refunded");
                tracing::warn!(
                    payment_id = %payment.id,
                    amount = payment.amount.cents(),
                    cause = %cause,
                    "Charge refunded after failed checkout"
                );
            }
            Ok(false) => {
                CheckoutMetrics::record_compensation("rejected");
                tracing::error!(
                    payment_id = %payment.id,
                    amount = payment.amount.cents(),
                    cause = %cause,
                    "Gateway rejected compensating refund"
                );
            }
            Err(err) => {
                CheckoutMetrics::record_compensation("failed");
                tracing::error!(
                    payment_id = %payment.id,
                    amount = payment.amount.cents(),
                    cause = %cause,
                    error = %err,
                    "Compensating refund failed"
                );
            }
        }
    }

    async fn resolve_payment_method(&self, request: &CheckoutRequest) -> Result<PaymentMethod> {
        let user = request.buyer.id;
        let gateway = Arc::clone(&self.env.gateway);
        let policy = RetryPolicy::gateway(&self.env.config);

        match (&request.saved_method, &request.card) {
            (None, None) => Err(CheckoutError::NoPaymentMethod),
            (Some(_), Some(_)) => Err(CheckoutError::AmbiguousPaymentMethod),
            (Some(method_id), None) => {
                let method = retry_with_predicate(
                    policy,
                    "gateway.payment_method",
                    || gateway.payment_method(*method_id),
                    PaymentGatewayError::is_transient,
                )
                .await?
                .ok_or_else(|| CheckoutError::not_found("payment method", method_id))?;

                if method.owner != user {
                    return Err(CheckoutError::Forbidden);
                }
                Ok(method)
            }
            (None, Some(card)) => {
                card.validate(&request.buyer.name, self.env.clock.now())
                    .map_err(CheckoutError::CardInvalid)?;

                let method = retry_with_predicate(
                    policy,
                    "gateway.verify_and_store",
                    || gateway.verify_and_store(user, card.clone()),
                    PaymentGatewayError::is_transient,
                )
                .await?;
                tracing::debug!(
                    user_id = %user,
                    payment_method = %method.id,
                    last_four = %method.last_four,
                    "Card verified and stored"
                );
                Ok(method)
            }
        }
    }

    async fn payment_for_key(&self, key: &IdempotencyKey) -> Result<Option<Payment>> {
        let gateway = Arc::clone(&self.env.gateway);
        let payment = retry_with_predicate(
            RetryPolicy::gateway(&self.env.config),
            "gateway.payment_by_idempotency_key",
            || gateway.payment_by_idempotency_key(key.to_string()),
            PaymentGatewayError::is_transient,
        )
        .await?;
        Ok(payment)
    }

    /// The committed result of an earlier attempt under `key`, if any.
    async fn stored_receipt(&self, key: &IdempotencyKey) -> Result<Option<CheckoutReceipt>> {
        let Some(payment) = self.payment_for_key(key).await?.filter(Payment::is_approved) else {
            return Ok(None);
        };

        let tickets = self.env.inventory.tickets_for_payment(payment.id).await?;
        if tickets.is_empty() {
            // Approved but never settled; the normal path completes it.
            return Ok(None);
        }

        Ok(Some(CheckoutReceipt {
            payment,
            tickets,
            replayed: true,
        }))
    }

    /// Post-commit side effects; failures are logged and never undo the purchase.
    async fn after_commit(&self, user: UserId, receipt: &CheckoutReceipt) {
        if let Err(err) = self.env.carts.clear(user).await {
            tracing::warn!(user_id = %user, error = %err, "Cart not cleared after checkout");
        }

        let payload = serde_json::json!({
            "payment_id": receipt.payment.id,
            "amount_cents": receipt.payment.amount.cents(),
            "currency": receipt.payment.currency,
            "tickets": receipt.tickets.iter().map(|t| t.code.as_str()).collect::<Vec<_>>(),
        });
        self.notify(user, NotificationKind::PurchaseCompleted, payload).await;
    }

    async fn notify(&self, user: UserId, kind: NotificationKind, payload: serde_json::Value) {
        let notifier = Arc::clone(&self.env.notifier);
        let result = retry_with_backoff(RetryPolicy::notification(&self.env.config), "notifier.notify", || {
            notifier.notify(user, kind, payload.clone())
        })
        .await;

        if let Err(err) = result {
            tracing::warn!(user_id = %user, kind = %kind, error = %err, "Notification dropped");
        }
    }

    async fn release(accessor: LockedStockAccessor<I::Transaction>) {
        if let Err(err) = accessor.rollback().await {
            tracing::error!(error = %err, "Rollback failed");
        }
    }

    /// Refund an approved payment and void its tickets.
    ///
    /// Units go back on sale only under [`RestockPolicy::OnRefund`].
    ///
    /// # Errors
    ///
    /// - `NotFound` if the payment does not exist
    /// - `Forbidden` if it belongs to another user
    /// - `NotRefundable` if it is not approved or its tickets are already voided
    /// - `ProviderDecline` if the gateway refuses the refund
    /// - `ProviderUnreachable` or `Storage` otherwise; nothing is voided
    pub async fn refund(&self, user: UserId, payment_id: PaymentId) -> Result<RefundReceipt> {
        let result = self.run_refund(user, payment_id).await;

        match &result {
            Ok(receipt) => {
                CheckoutMetrics::record_refund("refunded");
                tracing::info!(
                    user_id = %user,
                    payment_id = %payment_id,
                    amount = receipt.amount.cents(),
                    voided = receipt.voided,
                    restocked = receipt.restocked,
                    "Payment refunded"
                );
                let payload = serde_json::json!({
                    "payment_id": payment_id,
                    "amount_cents": receipt.amount.cents(),
                    "currency": receipt.currency,
                    "voided": receipt.voided,
                });
                self.notify(user, NotificationKind::PurchaseRefunded, payload).await;
            }
            Err(err) => {
                CheckoutMetrics::record_refund(err.kind());
                tracing::warn!(user_id = %user, payment_id = %payment_id, error = %err, "Refund rejected");
            }
        }

        result
    }

    async fn run_refund(&self, user: UserId, payment_id: PaymentId) -> Result<RefundReceipt> {
        let gateway = Arc::clone(&self.env.gateway);
        let policy = RetryPolicy::gateway(&self.env.config);

        let payment = retry_with_predicate(
            policy.clone(),
            "gateway.payment",
            || gateway.payment(payment_id),
            PaymentGatewayError::is_transient,
        )
        .await?
        .ok_or_else(|| CheckoutError::not_found("payment", payment_id))?;

        if payment.user_id != user {
            return Err(CheckoutError::Forbidden);
        }
        if !payment.is_approved() {
            return Err(CheckoutError::NotRefundable {
                status: payment.status.as_str(),
            });
        }

        let known = self.env.inventory.tickets_for_payment(payment_id).await?;
        // The primary row is locked even without tickets, so an in-flight
        // settlement of this charge finishes before the refund looks.
        let refs: BTreeSet<TicketTypeRef> = known
            .into_iter()
            .map(|ticket| ticket.ticket_type)
            .chain(std::iter::once(payment.ticket_type.clone()))
            .collect();

        let mut accessor = LockedStockAccessor::new(self.env.inventory.begin().await?);
        match self.locked_refund(&mut accessor, &payment, &refs, policy).await {
            Ok(receipt) => {
                accessor.commit().await.inspect_err(|err| {
                    tracing::error!(
                        payment_id = %payment_id,
                        error = %err,
                        "Refund issued but ticket voiding was not committed"
                    );
                })?;
                Ok(receipt)
            }
            Err(err) => {
                Self::release(accessor).await;
                Err(err)
            }
        }
    }

    async fn locked_refund(
        &self,
        accessor: &mut LockedStockAccessor<I::Transaction>,
        payment: &Payment,
        refs: &BTreeSet<TicketTypeRef>,
        policy: RetryPolicy,
    ) -> Result<RefundReceipt> {
        accessor.lock_all(refs).await?;

        let tickets = accessor.transaction().tickets_for_payment(payment.id).await?;
        let valid: Vec<Ticket> = tickets
            .iter()
            .filter(|ticket| ticket.status == TicketStatus::Valid)
            .cloned()
            .collect();
        // No tickets at all is a charge that never settled; it is refunded like any other.
        if valid.is_empty() && !tickets.is_empty() {
            return Err(CheckoutError::NotRefundable {
                status: TicketStatus::Voided.as_str(),
            });
        }

        let voided = accessor.transaction().void_tickets(payment.id).await?;

        let restocked = self.env.config.restock_policy == RestockPolicy::OnRefund;
        if restocked {
            let mut per_type: BTreeMap<&TicketTypeRef, u32> = BTreeMap::new();
            for ticket in &valid {
                *per_type.entry(&ticket.ticket_type).or_default() += 1;
            }
            for (ticket_type, quantity) in per_type {
                accessor.increment(ticket_type, quantity).await?;
            }
        }

        let gateway = Arc::clone(&self.env.gateway);
        let key = IdempotencyKey::refund(payment.id);
        let accepted = retry_with_predicate(
            policy,
            "gateway.refund",
            || gateway.refund(payment.id, payment.amount, key.clone()),
            PaymentGatewayError::is_transient,
        )
        .await?;
        if !accepted {
            return Err(CheckoutError::ProviderDecline {
                reason: "refund rejected by provider".to_string(),
            });
        }

        Ok(RefundReceipt {
            payment_id: payment.id,
            amount: payment.amount,
            currency: payment.currency.clone(),
            voided,
            restocked,
        })
    }
}

enum LockedOutcome {
    Replayed(CheckoutReceipt),
    Minted { payment: Payment, tickets: Vec<Ticket> },
}
