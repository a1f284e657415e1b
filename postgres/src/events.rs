//! Event windows read from the `events` table.

use crate::rows::{self, storage};
use sqlx::PgPool;
use ticket_checkout_core::{Event, EventId, EventLookup, Result};

/// `PostgreSQL` [`EventLookup`].
#[derive(Clone, Debug)]
pub struct PostgresEventLookup {
    pool: PgPool,
}

impl PostgresEventLookup {
    /// Create a lookup over `pool`.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert an event or move its purchase window.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the write fails or `start_time` is after `end_time`.
    pub async fn upsert(&self, event: &Event) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO events (event_id, name, start_time, end_time)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (event_id) DO UPDATE SET
                name = EXCLUDED.name,
                start_time = EXCLUDED.start_time,
                end_time = EXCLUDED.end_time
            ",
        )
        .bind(*event.id.as_uuid())
        .bind(&event.name)
        .bind(event.start_time)
        .bind(event.end_time)
        .execute(&self.pool)
        .await
        .map_err(storage("upsert event"))?;
        Ok(())
    }
}

impl EventLookup for PostgresEventLookup {
    async fn find_by_id(&self, event_id: EventId) -> Result<Option<Event>> {
        sqlx::query("SELECT event_id, name, start_time, end_time FROM events WHERE event_id = $1")
            .bind(*event_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage("read event"))?
            .as_ref()
            .map(rows::event)
            .transpose()
    }
}
