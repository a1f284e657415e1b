//! # Ticket Checkout App
//!
//! Deployment glue for the ticket checkout engine: environment
//! configuration, the HTTP payment gateway adapter, a log-backed
//! notification dispatcher, and the bootstrap that wires them to the
//! `PostgreSQL` stores.

pub mod bootstrap;
pub mod config;
pub mod gateway;
pub mod notifier;

pub use bootstrap::{PgCartService, PgCheckout, Services, payment_gateway};
pub use config::Config;
pub use gateway::HttpPaymentGateway;
pub use notifier::LogNotifier;
