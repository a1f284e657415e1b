//! `PostgreSQL` stores for the ticket checkout engine.
//!
//! This crate implements the storage traits of `ticket-checkout-core` on top
//! of sqlx:
//!
//! - [`PostgresInventory`]: stock rows locked with `SELECT ... FOR UPDATE`,
//!   guarded decrements, tickets keyed by their unique code
//! - [`PostgresCartStore`]: carts persisted across requests
//! - [`PostgresEventLookup`]: event purchase windows
//!
//! # Example
//!
//! ```ignore
//! use ticket_checkout_postgres::{connect, migrate, PostgresInventory};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = connect("postgres://localhost/tickets", 10).await?;
//!     migrate(&pool).await?;
//!     let inventory = PostgresInventory::new(pool, std::time::Duration::from_secs(5));
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod carts;
mod events;
mod inventory;
mod rows;

pub use carts::PostgresCartStore;
pub use events::PostgresEventLookup;
pub use inventory::{PgCheckoutTransaction, PostgresInventory};

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use ticket_checkout_core::Result;

/// Open a connection pool.
///
/// # Errors
///
/// Returns `Storage` if the database cannot be reached.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .map_err(rows::storage("connect"))
}

/// Apply the embedded migrations.
///
/// # Errors
///
/// Returns `Storage` if a migration fails.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| ticket_checkout_core::CheckoutError::storage(format!("Migration failed: {e}")))?;
    tracing::info!("Checkout schema migrated");
    Ok(())
}
