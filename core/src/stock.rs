//! Ticket-type stock and the transaction-scoped lock over it.
//!
//! `remaining` is the only resource in the engine that needs exclusive
//! access. It is read and written exclusively through a
//! [`LockedStockAccessor`], which owns one open [`CheckoutTransaction`] and
//! remembers which rows that transaction has locked. Correctness rests on the
//! backend's row lock, not on any in-process mutex.

use crate::error::{CheckoutError, Result};
use crate::types::{PaymentId, Ticket, TicketTypeRef, TicketTypeStock};
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;

/// Backend holding stock rows and minted tickets.
pub trait InventoryStore: Send + Sync {
    /// Transaction type produced by [`InventoryStore::begin`].
    type Transaction: CheckoutTransaction;

    /// Open a transaction.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Storage` if the backend cannot start one.
    fn begin(&self) -> impl Future<Output = Result<Self::Transaction>> + Send;

    /// Unlocked read of one stock row, for advisory checks only.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Storage` if the read fails.
    fn stock(
        &self,
        ticket_type: &TicketTypeRef,
    ) -> impl Future<Output = Result<Option<TicketTypeStock>>> + Send;

    /// Committed tickets paid for by `payment_id`.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Storage` if the read fails.
    fn tickets_for_payment(
        &self,
        payment_id: PaymentId,
    ) -> impl Future<Output = Result<Vec<Ticket>>> + Send;
}

/// Operations available inside one open transaction.
///
/// Dropping a transaction without committing must roll it back.
pub trait CheckoutTransaction: Send {
    /// Acquire an exclusive lock on a stock row and read it.
    ///
    /// Blocks while another transaction holds the row; never fails because of
    /// contention. Returns `None` if the row does not exist.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Storage` if the backend fails or its own
    /// transaction timeout expires.
    fn lock_stock(
        &mut self,
        ticket_type: &TicketTypeRef,
    ) -> impl Future<Output = Result<Option<TicketTypeStock>>> + Send;

    /// Subtract `quantity` from a locked row's `remaining`.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Storage` if the write fails or would go negative.
    fn decrement_remaining(
        &mut self,
        ticket_type: &TicketTypeRef,
        quantity: u32,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Add `quantity` to a locked row's `remaining`.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Storage` if the write fails or would exceed
    /// `total_quantity`.
    fn increment_remaining(
        &mut self,
        ticket_type: &TicketTypeRef,
        quantity: u32,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Insert a ticket. Returns `false` if its code is already taken.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Storage` for any failure other than a code collision.
    fn insert_ticket(&mut self, ticket: &Ticket) -> impl Future<Output = Result<bool>> + Send;

    /// Tickets paid for by `payment_id`, as seen by this transaction.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Storage` if the read fails.
    fn tickets_for_payment(
        &mut self,
        payment_id: PaymentId,
    ) -> impl Future<Output = Result<Vec<Ticket>>> + Send;

    /// Mark every ticket of `payment_id` as voided; returns how many changed.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Storage` if the write fails.
    fn void_tickets(&mut self, payment_id: PaymentId) -> impl Future<Output = Result<u64>> + Send;

    /// Make every write of this transaction durable and release its locks.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Storage` if the commit fails; nothing is applied.
    fn commit(self) -> impl Future<Output = Result<()>> + Send
    where
        Self: Sized;

    /// Discard every write of this transaction and release its locks.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Storage` if the backend reports a failure.
    fn rollback(self) -> impl Future<Output = Result<()>> + Send
    where
        Self: Sized;
}

/// Exclusive, transaction-scoped access to stock rows.
///
/// Rows are locked in ascending [`TicketTypeRef`] order by [`lock_all`], so
/// two checkouts touching overlapping ticket types can never wait on each
/// other in a cycle. Adjustments are refused for rows this accessor has not
/// locked, and a decrement is refused unless the locked snapshot shows
/// enough units.
///
/// [`lock_all`]: LockedStockAccessor::lock_all
#[derive(Debug)]
pub struct LockedStockAccessor<T> {
    tx: T,
    locked: BTreeMap<TicketTypeRef, TicketTypeStock>,
}

impl<T: CheckoutTransaction> LockedStockAccessor<T> {
    /// Wraps a freshly opened transaction
    #[must_use]
    pub const fn new(tx: T) -> Self {
        Self {
            tx,
            locked: BTreeMap::new(),
        }
    }

    /// Lock one row (if not already held) and return its current snapshot.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the ticket type has no stock row
    /// - `Storage` if the backend fails
    pub async fn lock_and_load(&mut self, ticket_type: &TicketTypeRef) -> Result<&TicketTypeStock> {
        if !self.locked.contains_key(ticket_type) {
            let stock = self
                .tx
                .lock_stock(ticket_type)
                .await?
                .ok_or_else(|| CheckoutError::not_found("ticket type", ticket_type))?;
            tracing::debug!(
                ticket_type = %ticket_type,
                remaining = stock.remaining,
                "Stock row locked"
            );
            self.locked.insert(ticket_type.clone(), stock);
        }

        self.locked
            .get(ticket_type)
            .ok_or_else(|| CheckoutError::storage("locked row vanished"))
    }

    /// Lock every distinct ref in deterministic ascending order.
    ///
    /// Call once per transaction, before any other lock is taken; mixing
    /// this with ad hoc [`lock_and_load`](Self::lock_and_load) calls gives up
    /// the ordering guarantee.
    ///
    /// # Errors
    ///
    /// Stops at the first ref that fails to lock.
    pub async fn lock_all<'a, I>(&mut self, refs: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a TicketTypeRef>,
    {
        let ordered: BTreeSet<&TicketTypeRef> = refs.into_iter().collect();
        for ticket_type in ordered {
            self.lock_and_load(ticket_type).await?;
        }
        Ok(())
    }

    /// Snapshot of a row this accessor holds, if any.
    #[must_use]
    pub fn locked(&self, ticket_type: &TicketTypeRef) -> Option<&TicketTypeStock> {
        self.locked.get(ticket_type)
    }

    /// Remove exactly `quantity` units from a locked row.
    ///
    /// # Errors
    ///
    /// - `Storage` if the row was not locked through this accessor
    /// - `InsufficientStock` if the locked snapshot has fewer than `quantity`
    pub async fn decrement(&mut self, ticket_type: &TicketTypeRef, quantity: u32) -> Result<()> {
        let remaining = self.held(ticket_type)?.remaining;
        if remaining < quantity {
            return Err(CheckoutError::InsufficientStock {
                ticket_type: ticket_type.clone(),
                requested: quantity,
                remaining,
            });
        }

        self.tx.decrement_remaining(ticket_type, quantity).await?;
        if let Some(stock) = self.locked.get_mut(ticket_type) {
            stock.remaining = remaining - quantity;
        }
        Ok(())
    }

    /// Return exactly `quantity` units to a locked row.
    ///
    /// # Errors
    ///
    /// - `Storage` if the row was not locked through this accessor, or the
    ///   result would exceed `total_quantity`
    pub async fn increment(&mut self, ticket_type: &TicketTypeRef, quantity: u32) -> Result<()> {
        let stock = self.held(ticket_type)?;
        let restored = stock
            .remaining
            .checked_add(quantity)
            .filter(|restored| *restored <= stock.total_quantity)
            .ok_or_else(|| {
                CheckoutError::storage(format!(
                    "returning {quantity} units to {ticket_type} would exceed its total of {}",
                    stock.total_quantity
                ))
            })?;

        self.tx.increment_remaining(ticket_type, quantity).await?;
        if let Some(stock) = self.locked.get_mut(ticket_type) {
            stock.remaining = restored;
        }
        Ok(())
    }

    /// The underlying transaction, for ticket writes that share it.
    pub fn transaction(&mut self) -> &mut T {
        &mut self.tx
    }

    /// Commit and release every lock.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the backend rejects the commit.
    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await
    }

    /// Roll back and release every lock.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the backend reports a failure.
    pub async fn rollback(self) -> Result<()> {
        self.tx.rollback().await
    }

    fn held(&self, ticket_type: &TicketTypeRef) -> Result<&TicketTypeStock> {
        self.locked.get(ticket_type).ok_or_else(|| {
            CheckoutError::storage(format!("{ticket_type} adjusted without holding its lock"))
        })
    }
}
