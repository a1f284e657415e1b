//! `PostgreSQL` inventory store.
//!
//! Stock rows are locked with `SELECT ... FOR UPDATE` inside one database
//! transaction per checkout. Writes are guarded updates so the table's
//! `CHECK (remaining >= 0 AND remaining <= total_quantity)` is never the
//! first line of defence, and ticket codes rely on the primary key:
//! `ON CONFLICT (code) DO NOTHING` turns a collision into `Ok(false)`.

use crate::rows::{self, storage, to_i32, to_i64};
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashSet;
use std::time::Duration;
use ticket_checkout_core::{
    CheckoutError, CheckoutTransaction, InventoryStore, PaymentId, Result, Ticket, TicketStatus, TicketTypeRef,
    TicketTypeStock,
};

const STOCK_COLUMNS: &str = "event_id, ticket_type, unit_price_cents, currency, total_quantity, remaining";
const TICKET_COLUMNS: &str = "code, owner_id, event_id, ticket_type, payment_id, status, issued_at";

/// `PostgreSQL` [`InventoryStore`].
#[derive(Clone, Debug)]
pub struct PostgresInventory {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PostgresInventory {
    /// Create an inventory over `pool`.
    ///
    /// Every checkout transaction gives up waiting for a row lock after
    /// `lock_timeout` and fails with `Storage`.
    #[must_use]
    pub const fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }

    /// Insert a stock row, or reset price and quantities of an existing one.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the write fails or the event does not exist.
    pub async fn upsert_stock(&self, stock: &TicketTypeStock) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO ticket_type_stock (
                event_id, ticket_type, unit_price_cents, currency, total_quantity, remaining
            ) VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (event_id, ticket_type) DO UPDATE SET
                unit_price_cents = EXCLUDED.unit_price_cents,
                currency = EXCLUDED.currency,
                total_quantity = EXCLUDED.total_quantity,
                remaining = EXCLUDED.remaining
            ",
        )
        .bind(*stock.ticket_type.event_id.as_uuid())
        .bind(&stock.ticket_type.ticket_type)
        .bind(to_i64(stock.unit_price, "unit_price_cents")?)
        .bind(stock.currency.as_str())
        .bind(to_i32(stock.total_quantity, "total_quantity")?)
        .bind(to_i32(stock.remaining, "remaining")?)
        .execute(&self.pool)
        .await
        .map_err(storage("upsert stock"))?;

        tracing::debug!(ticket_type = %stock.ticket_type, remaining = stock.remaining, "Stock row upserted");
        Ok(())
    }
}

impl InventoryStore for PostgresInventory {
    type Transaction = PgCheckoutTransaction;

    async fn begin(&self) -> Result<PgCheckoutTransaction> {
        let mut tx = self.pool.begin().await.map_err(storage("begin transaction"))?;

        // SET does not take bind parameters; the value is an integer we formatted.
        let millis = self.lock_timeout.as_millis();
        sqlx::query(&format!("SET LOCAL lock_timeout = '{millis}ms'"))
            .execute(&mut *tx)
            .await
            .map_err(storage("set lock_timeout"))?;

        Ok(PgCheckoutTransaction {
            tx,
            locked: HashSet::new(),
        })
    }

    async fn stock(&self, ticket_type: &TicketTypeRef) -> Result<Option<TicketTypeStock>> {
        sqlx::query(&format!(
            "SELECT {STOCK_COLUMNS} FROM ticket_type_stock WHERE event_id = $1 AND ticket_type = $2"
        ))
        .bind(*ticket_type.event_id.as_uuid())
        .bind(&ticket_type.ticket_type)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage("read stock"))?
        .as_ref()
        .map(rows::stock)
        .transpose()
    }

    async fn tickets_for_payment(&self, payment_id: PaymentId) -> Result<Vec<Ticket>> {
        sqlx::query(&format!(
            "SELECT {TICKET_COLUMNS} FROM tickets WHERE payment_id = $1 ORDER BY issued_at, code"
        ))
        .bind(*payment_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(storage("read tickets"))?
        .iter()
        .map(rows::ticket)
        .collect()
    }
}

/// One open checkout transaction.
///
/// Dropping it without committing rolls the database transaction back.
pub struct PgCheckoutTransaction {
    tx: Transaction<'static, Postgres>,
    locked: HashSet<TicketTypeRef>,
}

impl PgCheckoutTransaction {
    fn require_lock(&self, ticket_type: &TicketTypeRef) -> Result<()> {
        if self.locked.contains(ticket_type) {
            Ok(())
        } else {
            Err(CheckoutError::storage(format!("{ticket_type} written without its row lock")))
        }
    }
}

impl CheckoutTransaction for PgCheckoutTransaction {
    async fn lock_stock(&mut self, ticket_type: &TicketTypeRef) -> Result<Option<TicketTypeStock>> {
        let stock = sqlx::query(&format!(
            "SELECT {STOCK_COLUMNS} FROM ticket_type_stock WHERE event_id = $1 AND ticket_type = $2 FOR UPDATE"
        ))
        .bind(*ticket_type.event_id.as_uuid())
        .bind(&ticket_type.ticket_type)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(storage("lock stock row"))?
        .as_ref()
        .map(rows::stock)
        .transpose()?;

        if stock.is_some() {
            self.locked.insert(ticket_type.clone());
        }
        Ok(stock)
    }

    async fn decrement_remaining(&mut self, ticket_type: &TicketTypeRef, quantity: u32) -> Result<()> {
        self.require_lock(ticket_type)?;
        let updated = sqlx::query(
            r"
            UPDATE ticket_type_stock
            SET remaining = remaining - $3
            WHERE event_id = $1 AND ticket_type = $2 AND remaining >= $3
            ",
        )
        .bind(*ticket_type.event_id.as_uuid())
        .bind(&ticket_type.ticket_type)
        .bind(to_i32(quantity, "quantity")?)
        .execute(&mut *self.tx)
        .await
        .map_err(storage("decrement remaining"))?;

        if updated.rows_affected() == 1 {
            Ok(())
        } else {
            Err(CheckoutError::storage(format!("{ticket_type} has fewer than {quantity} remaining")))
        }
    }

    async fn increment_remaining(&mut self, ticket_type: &TicketTypeRef, quantity: u32) -> Result<()> {
        self.require_lock(ticket_type)?;
        let updated = sqlx::query(
            r"
            UPDATE ticket_type_stock
            SET remaining = remaining + $3
            WHERE event_id = $1 AND ticket_type = $2 AND remaining + $3 <= total_quantity
            ",
        )
        .bind(*ticket_type.event_id.as_uuid())
        .bind(&ticket_type.ticket_type)
        .bind(to_i32(quantity, "quantity")?)
        .execute(&mut *self.tx)
        .await
        .map_err(storage("increment remaining"))?;

        if updated.rows_affected() == 1 {
            Ok(())
        } else {
            Err(CheckoutError::storage(format!(
                "{ticket_type} cannot take back {quantity} units without exceeding its total"
            )))
        }
    }

    async fn insert_ticket(&mut self, ticket: &Ticket) -> Result<bool> {
        let inserted = sqlx::query(
            r"
            INSERT INTO tickets (code, owner_id, event_id, ticket_type, payment_id, status, issued_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (code) DO NOTHING
            ",
        )
        .bind(ticket.code.as_str())
        .bind(*ticket.owner.as_uuid())
        .bind(*ticket.event_id.as_uuid())
        .bind(&ticket.ticket_type.ticket_type)
        .bind(*ticket.payment_id.as_uuid())
        .bind(ticket.status.as_str())
        .bind(ticket.issued_at)
        .execute(&mut *self.tx)
        .await
        .map_err(storage("insert ticket"))?;

        Ok(inserted.rows_affected() == 1)
    }

    async fn tickets_for_payment(&mut self, payment_id: PaymentId) -> Result<Vec<Ticket>> {
        sqlx::query(&format!(
            "SELECT {TICKET_COLUMNS} FROM tickets WHERE payment_id = $1 ORDER BY issued_at, code"
        ))
        .bind(*payment_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(storage("read tickets"))?
        .iter()
        .map(rows::ticket)
        .collect()
    }

    async fn void_tickets(&mut self, payment_id: PaymentId) -> Result<u64> {
        let voided = sqlx::query("UPDATE tickets SET status = $2 WHERE payment_id = $1 AND status = $3")
            .bind(*payment_id.as_uuid())
            .bind(TicketStatus::Voided.as_str())
            .bind(TicketStatus::Valid.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(storage("void tickets"))?;
        Ok(voided.rows_affected())
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await.map_err(storage("commit"))
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await.map_err(storage("rollback"))
    }
}
