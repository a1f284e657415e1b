//! # Ticket Checkout Core
//!
//! Domain types, error taxonomy and collaborator traits for the ticket
//! checkout engine.
//!
//! This crate holds everything that does not perform I/O on its own: the
//! cart model, event purchase windows, card validation, ticket-code
//! generation, idempotency keys, the checkout state machine, and the
//! transaction-scoped stock lock. Backends (in-memory, PostgreSQL, HTTP)
//! implement the traits declared here; the runtime crate drives them.
//!
//! ## Core Concepts
//!
//! - **Ticket type**: a purchasable category of an event, with its own price
//!   and stock ([`TicketTypeStock`])
//! - **Cart**: per-user lines, mutated outside any transaction ([`cart`])
//! - **Gate**: whether an event's purchase window is open ([`availability`])
//! - **Locked stock**: exclusive row access for one transaction ([`stock`])
//! - **Gateway**: the external payment provider ([`payment`])
//!
//! ## Invariants
//!
//! - `remaining` never goes negative
//! - no buyer is charged without receiving tickets
//! - stock is never decremented without a successful charge

pub mod availability;
pub mod card;
pub mod cart;
pub mod checkout_state;
pub mod config;
pub mod environment;
pub mod error;
pub mod idempotency;
pub mod notification;
pub mod payment;
pub mod stock;
pub mod ticket_code;
pub mod types;

// Re-export commonly used types
pub use availability::{EventAvailabilityGate, EventLookup};
pub use card::{CardDetails, CardRejection};
pub use cart::{Cart, CartLine, CartStore, CartView};
pub use checkout_state::{CheckoutProgress, CheckoutState};
pub use config::{CheckoutConfig, RestockPolicy};
pub use environment::{Clock, SystemClock};
pub use error::{CheckoutError, Result};
pub use idempotency::IdempotencyKey;
pub use notification::{NotificationDispatcher, NotificationError, NotificationKind};
pub use payment::{ChargeRequest, GatewayFuture, GatewayResult, PaymentGateway, PaymentGatewayError};
pub use stock::{CheckoutTransaction, InventoryStore, LockedStockAccessor};
pub use ticket_code::{CodeGenerator, RandomCodeGenerator, TicketCode};
pub use types::{
    Currency, Event, EventId, Money, Payment, PaymentId, PaymentMethod, PaymentMethodId, PaymentStatus, Ticket,
    TicketStatus, TicketTypeRef, TicketTypeStock, UserId,
};
