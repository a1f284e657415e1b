//! # Ticket Checkout Runtime
//!
//! Effectful services of the ticket checkout engine.
//!
//! This crate drives the collaborators declared in `ticket-checkout-core`:
//! it mutates carts, runs the locked checkout transaction against an
//! inventory store and a payment gateway, mints tickets, and issues refunds.
//!
//! ## Core Components
//!
//! - **`CartService`**: advisory add-to-cart, view, clear
//! - **`CheckoutOrchestrator`**: the all-or-nothing checkout, compensation and refunds
//! - **`TicketMinter`**: one uniquely coded ticket per unit, retried on collision
//!
//! ## Example
//!
//! ```ignore
//! use ticket_checkout_runtime::{CartService, CheckoutEnvironment, CheckoutOrchestrator};
//!
//! let env = CheckoutEnvironment::new(inventory, carts, events, gateway, notifier, clock, codes, config).shared();
//! let carts = CartService::new(env.clone());
//! let checkout = CheckoutOrchestrator::new(env);
//!
//! carts.add(buyer.id, general_admission, 2).await?;
//! let receipt = checkout.checkout(CheckoutRequest::with_card(buyer, attempt_id, card)).await?;
//! ```

/// Retry logic with exponential backoff
pub mod retry;

/// Prometheus metrics for observability
pub mod metrics;

/// Shared service dependencies
pub mod environment;

/// Add-to-cart, view and clear
pub mod cart_service;

/// Ticket minting
pub mod minter;

/// Checkout and refund orchestration
pub mod checkout;

pub use cart_service::CartService;
pub use checkout::{Buyer, CheckoutOrchestrator, CheckoutReceipt, CheckoutRequest, RefundReceipt};
pub use environment::CheckoutEnvironment;
pub use minter::TicketMinter;
