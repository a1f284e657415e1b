//! In-memory inventory with row-lock semantics.
//!
//! Every stock row has its own `tokio::sync::Mutex`. A transaction acquires
//! the row's mutex in `lock_stock` and holds the owned guard until it commits,
//! rolls back or is dropped, so a second transaction touching the same row
//! waits exactly like it would on `SELECT ... FOR UPDATE`. Writes are staged
//! inside the transaction and only become visible on commit.
//!
//! Ticket codes are reserved at insert time, mirroring a unique index: a code
//! held by any committed or in-flight ticket is reported as a collision.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use ticket_checkout_core::{
    CheckoutError, CheckoutTransaction, InventoryStore, PaymentId, Result, Ticket, TicketCode, TicketStatus,
    TicketTypeRef, TicketTypeStock,
};
use tokio::sync::OwnedMutexGuard;

#[derive(Default)]
struct Shared {
    rows: Mutex<HashMap<TicketTypeRef, TicketTypeStock>>,
    row_locks: Mutex<HashMap<TicketTypeRef, Arc<tokio::sync::Mutex<()>>>>,
    tickets: Mutex<Vec<Ticket>>,
    codes: Mutex<HashSet<TicketCode>>,
    fail_next_commit: AtomicBool,
}

fn poisoned<T>(_: T) -> CheckoutError {
    CheckoutError::storage("in-memory inventory lock poisoned")
}

/// In-memory [`InventoryStore`].
///
/// Clones share the same rows and tickets.
#[derive(Clone, Default)]
pub struct InMemoryInventory {
    shared: Arc<Shared>,
}

impl InMemoryInventory {
    /// Create an empty inventory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a stock row.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the inventory lock is poisoned.
    pub fn upsert_stock(&self, stock: TicketTypeStock) -> Result<()> {
        self.shared
            .rows
            .lock()
            .map_err(poisoned)?
            .insert(stock.ticket_type.clone(), stock);
        Ok(())
    }

    /// Committed `remaining` of a row.
    #[must_use]
    pub fn remaining(&self, ticket_type: &TicketTypeRef) -> Option<u32> {
        self.shared
            .rows
            .lock()
            .ok()
            .and_then(|rows| rows.get(ticket_type).map(|stock| stock.remaining))
    }

    /// Every committed ticket.
    #[must_use]
    pub fn tickets(&self) -> Vec<Ticket> {
        self.shared
            .tickets
            .lock()
            .map(|tickets| tickets.clone())
            .unwrap_or_default()
    }

    /// Make the next commit fail with `Storage` and discard its writes.
    pub fn fail_next_commit(&self) {
        self.shared.fail_next_commit.store(true, Ordering::SeqCst);
    }

    fn row_lock(&self, ticket_type: &TicketTypeRef) -> Result<Arc<tokio::sync::Mutex<()>>> {
        let mut locks = self.shared.row_locks.lock().map_err(poisoned)?;
        Ok(Arc::clone(
            locks
                .entry(ticket_type.clone())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        ))
    }
}

impl InventoryStore for InMemoryInventory {
    type Transaction = InMemoryTransaction;

    async fn begin(&self) -> Result<InMemoryTransaction> {
        Ok(InMemoryTransaction {
            inventory: self.clone(),
            guards: BTreeMap::new(),
            staged_rows: BTreeMap::new(),
            staged_tickets: Vec::new(),
            staged_voids: Vec::new(),
            reserved_codes: Vec::new(),
        })
    }

    async fn stock(&self, ticket_type: &TicketTypeRef) -> Result<Option<TicketTypeStock>> {
        Ok(self.shared.rows.lock().map_err(poisoned)?.get(ticket_type).cloned())
    }

    async fn tickets_for_payment(&self, payment_id: PaymentId) -> Result<Vec<Ticket>> {
        Ok(self
            .shared
            .tickets
            .lock()
            .map_err(poisoned)?
            .iter()
            .filter(|ticket| ticket.payment_id == payment_id)
            .cloned()
            .collect())
    }
}

/// Transaction over an [`InMemoryInventory`].
///
/// Dropping it without committing discards every staged write and releases
/// its row locks and code reservations.
pub struct InMemoryTransaction {
    inventory: InMemoryInventory,
    guards: BTreeMap<TicketTypeRef, OwnedMutexGuard<()>>,
    staged_rows: BTreeMap<TicketTypeRef, TicketTypeStock>,
    staged_tickets: Vec<Ticket>,
    staged_voids: Vec<PaymentId>,
    reserved_codes: Vec<TicketCode>,
}

impl InMemoryTransaction {
    fn staged_row(&mut self, ticket_type: &TicketTypeRef) -> Result<&mut TicketTypeStock> {
        if !self.guards.contains_key(ticket_type) {
            return Err(CheckoutError::storage(format!("{ticket_type} written without its row lock")));
        }
        self.staged_rows
            .get_mut(ticket_type)
            .ok_or_else(|| CheckoutError::storage(format!("{ticket_type} has no stock row")))
    }

    fn release_codes(&mut self) {
        if let Ok(mut codes) = self.inventory.shared.codes.lock() {
            for code in self.reserved_codes.drain(..) {
                codes.remove(&code);
            }
        }
    }

    fn visible_tickets(&self, payment_id: PaymentId) -> Result<Vec<Ticket>> {
        let committed = self.inventory.shared.tickets.lock().map_err(poisoned)?;
        let voided = self.staged_voids.contains(&payment_id);
        Ok(committed
            .iter()
            .chain(self.staged_tickets.iter())
            .filter(|ticket| ticket.payment_id == payment_id)
            .cloned()
            .map(|mut ticket| {
                if voided {
                    ticket.status = TicketStatus::Voided;
                }
                ticket
            })
            .collect())
    }
}

impl CheckoutTransaction for InMemoryTransaction {
    async fn lock_stock(&mut self, ticket_type: &TicketTypeRef) -> Result<Option<TicketTypeStock>> {
        if let Some(staged) = self.staged_rows.get(ticket_type) {
            return Ok(Some(staged.clone()));
        }

        let lock = self.inventory.row_lock(ticket_type)?;
        let guard = lock.lock_owned().await;

        let Some(stock) = self.inventory.stock(ticket_type).await? else {
            return Ok(None);
        };
        self.guards.insert(ticket_type.clone(), guard);
        self.staged_rows.insert(ticket_type.clone(), stock.clone());
        Ok(Some(stock))
    }

    async fn decrement_remaining(&mut self, ticket_type: &TicketTypeRef, quantity: u32) -> Result<()> {
        let row = self.staged_row(ticket_type)?;
        row.remaining = row
            .remaining
            .checked_sub(quantity)
            .ok_or_else(|| CheckoutError::storage(format!("check constraint: {ticket_type} remaining >= 0")))?;
        Ok(())
    }

    async fn increment_remaining(&mut self, ticket_type: &TicketTypeRef, quantity: u32) -> Result<()> {
        let row = self.staged_row(ticket_type)?;
        let restored = row
            .remaining
            .checked_add(quantity)
            .filter(|restored| *restored <= row.total_quantity)
            .ok_or_else(|| {
                CheckoutError::storage(format!("check constraint: {ticket_type} remaining <= total_quantity"))
            })?;
        row.remaining = restored;
        Ok(())
    }

    async fn insert_ticket(&mut self, ticket: &Ticket) -> Result<bool> {
        let mut codes = self.inventory.shared.codes.lock().map_err(poisoned)?;
        if !codes.insert(ticket.code.clone()) {
            return Ok(false);
        }
        drop(codes);

        self.reserved_codes.push(ticket.code.clone());
        self.staged_tickets.push(ticket.clone());
        Ok(true)
    }

    async fn tickets_for_payment(&mut self, payment_id: PaymentId) -> Result<Vec<Ticket>> {
        self.visible_tickets(payment_id)
    }

    async fn void_tickets(&mut self, payment_id: PaymentId) -> Result<u64> {
        let valid = self
            .visible_tickets(payment_id)?
            .iter()
            .filter(|ticket| ticket.status == TicketStatus::Valid)
            .count();
        if valid > 0 {
            self.staged_voids.push(payment_id);
        }
        Ok(u64::try_from(valid).unwrap_or(u64::MAX))
    }

    async fn commit(mut self) -> Result<()> {
        if self.inventory.shared.fail_next_commit.swap(false, Ordering::SeqCst) {
            self.release_codes();
            return Err(CheckoutError::storage("commit failed: injected fault"));
        }

        {
            let mut rows = self.inventory.shared.rows.lock().map_err(poisoned)?;
            let mut tickets = self.inventory.shared.tickets.lock().map_err(poisoned)?;

            for (ticket_type, stock) in std::mem::take(&mut self.staged_rows) {
                rows.insert(ticket_type, stock);
            }
            tickets.append(&mut self.staged_tickets);
            for payment_id in &self.staged_voids {
                for ticket in tickets.iter_mut().filter(|ticket| ticket.payment_id == *payment_id) {
                    ticket.status = TicketStatus::Voided;
                }
            }
        }

        // Reservations became permanent codes.
        self.reserved_codes.clear();
        Ok(())
    }

    async fn rollback(mut self) -> Result<()> {
        self.release_codes();
        Ok(())
    }
}

impl Drop for InMemoryTransaction {
    fn drop(&mut self) {
        self.release_codes();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::time::Duration;
    use ticket_checkout_core::{Currency, EventId, Money};

    fn seeded(quantity: u32) -> (InMemoryInventory, TicketTypeRef) {
        let inventory = InMemoryInventory::new();
        let general = TicketTypeRef::new(EventId::new(), "General");
        inventory
            .upsert_stock(TicketTypeStock::new(
                general.clone(),
                Money::from_cents(2_500),
                Currency::usd(),
                quantity,
            ))
            .unwrap();
        (inventory, general)
    }

    #[tokio::test]
    async fn writes_are_invisible_until_commit() {
        let (inventory, general) = seeded(5);

        let mut tx = inventory.begin().await.unwrap();
        tx.lock_stock(&general).await.unwrap();
        tx.decrement_remaining(&general, 2).await.unwrap();
        assert_eq!(inventory.remaining(&general), Some(5));

        tx.commit().await.unwrap();
        assert_eq!(inventory.remaining(&general), Some(3));
    }

    #[tokio::test]
    async fn dropped_transaction_discards_writes() {
        let (inventory, general) = seeded(5);

        {
            let mut tx = inventory.begin().await.unwrap();
            tx.lock_stock(&general).await.unwrap();
            tx.decrement_remaining(&general, 5).await.unwrap();
        }

        assert_eq!(inventory.remaining(&general), Some(5));
    }

    #[tokio::test]
    async fn second_locker_waits_for_the_first() {
        let (inventory, general) = seeded(1);

        let mut first = inventory.begin().await.unwrap();
        first.lock_stock(&general).await.unwrap();

        let contender = inventory.clone();
        let row = general.clone();
        let waiter = tokio::spawn(async move {
            let mut second = contender.begin().await.unwrap();
            second.lock_stock(&row).await.unwrap().unwrap().remaining
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        first.decrement_remaining(&general, 1).await.unwrap();
        first.commit().await.unwrap();

        assert_eq!(waiter.await.unwrap(), 0);
    }

    #[tokio::test]
    async fn decrement_below_zero_violates_the_check_constraint() {
        let (inventory, general) = seeded(1);
        let mut tx = inventory.begin().await.unwrap();
        tx.lock_stock(&general).await.unwrap();

        assert!(matches!(
            tx.decrement_remaining(&general, 2).await,
            Err(CheckoutError::Storage(_))
        ));
    }

    #[tokio::test]
    async fn unlocked_writes_are_refused() {
        let (inventory, general) = seeded(3);
        let mut tx = inventory.begin().await.unwrap();
        assert!(tx.decrement_remaining(&general, 1).await.is_err());
    }
}
