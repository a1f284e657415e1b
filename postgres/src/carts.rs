//! Carts persisted in `carts` and `cart_lines`.

use crate::rows::{self, storage, to_i32, to_i64};
use sqlx::PgPool;
use ticket_checkout_core::{Cart, CartStore, Result, UserId};

/// `PostgreSQL` [`CartStore`].
///
/// Each save replaces the user's lines in one transaction; line order is kept
/// in a `position` column.
#[derive(Clone, Debug)]
pub struct PostgresCartStore {
    pool: PgPool,
}

impl PostgresCartStore {
    /// Create a cart store over `pool`.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl CartStore for PostgresCartStore {
    async fn load(&self, owner: UserId) -> Result<Option<Cart>> {
        let exists = sqlx::query("SELECT 1 FROM carts WHERE owner_id = $1")
            .bind(*owner.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage("read cart"))?;
        if exists.is_none() {
            return Ok(None);
        }

        let lines = sqlx::query(
            r"
            SELECT event_id, ticket_type, quantity, unit_price_cents, currency
            FROM cart_lines
            WHERE owner_id = $1
            ORDER BY position
            ",
        )
        .bind(*owner.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(storage("read cart lines"))?
        .iter()
        .map(rows::cart_line)
        .collect::<Result<Vec<_>>>()?;

        Ok(Some(Cart { owner, lines }))
    }

    async fn save(&self, cart: &Cart) -> Result<()> {
        let owner = *cart.owner.as_uuid();
        let mut tx = self.pool.begin().await.map_err(storage("begin transaction"))?;

        sqlx::query(
            r"
            INSERT INTO carts (owner_id) VALUES ($1)
            ON CONFLICT (owner_id) DO UPDATE SET updated_at = now()
            ",
        )
        .bind(owner)
        .execute(&mut *tx)
        .await
        .map_err(storage("upsert cart"))?;

        sqlx::query("DELETE FROM cart_lines WHERE owner_id = $1")
            .bind(owner)
            .execute(&mut *tx)
            .await
            .map_err(storage("replace cart lines"))?;

        for (position, line) in cart.lines.iter().enumerate() {
            let position = u32::try_from(position).unwrap_or(u32::MAX);
            sqlx::query(
                r"
                INSERT INTO cart_lines (
                    owner_id, position, event_id, ticket_type, quantity, unit_price_cents, currency
                ) VALUES ($1, $2, $3, $4, $5, $6, $7)
                ",
            )
            .bind(owner)
            .bind(to_i32(position, "position")?)
            .bind(*line.ticket_type.event_id.as_uuid())
            .bind(&line.ticket_type.ticket_type)
            .bind(to_i32(line.quantity, "quantity")?)
            .bind(to_i64(line.unit_price, "unit_price_cents")?)
            .bind(line.currency.as_str())
            .execute(&mut *tx)
            .await
            .map_err(storage("insert cart line"))?;
        }

        tx.commit().await.map_err(storage("commit cart"))
    }

    async fn clear(&self, owner: UserId) -> Result<()> {
        sqlx::query("DELETE FROM carts WHERE owner_id = $1")
            .bind(*owner.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(storage("clear cart"))?;
        Ok(())
    }
}
