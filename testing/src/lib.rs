//! # Ticket Checkout Testing
//!
//! In-memory collaborators and fixtures for the ticket checkout engine.
//!
//! This crate provides:
//! - [`InMemoryInventory`]: stock rows with per-row locks held for a transaction's lifetime
//! - [`InMemoryCartStore`] and [`InMemoryEventLookup`]
//! - [`MockPaymentGateway`]: idempotent, scriptable provider
//! - [`RecordingNotifier`] and [`SequenceCodeGenerator`]
//! - [`FixedClock`] for pinning "now" to window boundaries
//!
//! ## Example
//!
//! ```ignore
//! use ticket_checkout_testing::{fixtures, test_clock, InMemoryInventory};
//!
//! let clock = test_clock();
//! let event = fixtures::event_on_sale(clock.now());
//! let inventory = InMemoryInventory::new();
//! inventory.upsert_stock(fixtures::stock(&event, "General", 2_500, 100))?;
//! ```

pub mod clock;
pub mod collaborators;
pub mod fixtures;
pub mod gateway;
pub mod inventory;
pub mod stores;

// Re-export commonly used items
pub use clock::{FixedClock, test_clock};
pub use collaborators::{RecordingNotifier, SentNotification, SequenceCodeGenerator};
pub use gateway::MockPaymentGateway;
pub use inventory::{InMemoryInventory, InMemoryTransaction};
pub use stores::{InMemoryCartStore, InMemoryEventLookup};
