//! Shared wiring for the runtime integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;
use ticket_checkout_core::{CheckoutConfig, CodeGenerator, Event, PaymentMethodId, TicketTypeRef, UserId};
use ticket_checkout_runtime::{Buyer, CartService, CheckoutEnvironment, CheckoutOrchestrator, CheckoutRequest};
use ticket_checkout_testing::{
    FixedClock, InMemoryCartStore, InMemoryEventLookup, InMemoryInventory, MockPaymentGateway, RecordingNotifier,
    SequenceCodeGenerator, fixtures, test_clock,
};
use uuid::Uuid;

pub type TestCarts = CartService<InMemoryInventory, InMemoryCartStore, InMemoryEventLookup>;
pub type TestCheckout = CheckoutOrchestrator<InMemoryInventory, InMemoryCartStore, InMemoryEventLookup>;

/// Route engine logs through the test harness; `RUST_LOG` picks the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Retries without real waiting.
pub fn fast_config() -> CheckoutConfig {
    CheckoutConfig::default().with_gateway_retry_delay_ms(1)
}

/// Handles on every in-memory collaborator plus the two services under test.
pub struct Harness {
    pub inventory: InMemoryInventory,
    pub carts: InMemoryCartStore,
    pub events: InMemoryEventLookup,
    pub gateway: MockPaymentGateway,
    pub notifier: RecordingNotifier,
    pub clock: FixedClock,
    pub cart_service: TestCarts,
    pub checkout: TestCheckout,
}

pub struct HarnessBuilder {
    config: CheckoutConfig,
    codes: Arc<dyn CodeGenerator>,
    gateway: MockPaymentGateway,
}

impl HarnessBuilder {
    pub fn config(mut self, config: CheckoutConfig) -> Self {
        self.config = config;
        self
    }

    pub fn codes(mut self, codes: SequenceCodeGenerator) -> Self {
        self.codes = Arc::new(codes);
        self
    }

    pub fn gateway_latency(mut self, latency: Duration) -> Self {
        self.gateway = self.gateway.with_latency(latency);
        self
    }

    pub fn build(self) -> Harness {
        init_tracing();
        let inventory = InMemoryInventory::new();
        let carts = InMemoryCartStore::new();
        let events = InMemoryEventLookup::new();
        let notifier = RecordingNotifier::new();
        let clock = test_clock();

        let env = CheckoutEnvironment::new(
            inventory.clone(),
            carts.clone(),
            events.clone(),
            Arc::new(self.gateway.clone()),
            Arc::new(notifier.clone()),
            Arc::new(clock.clone()),
            self.codes,
            self.config,
        )
        .shared();

        Harness {
            inventory,
            carts,
            events,
            gateway: self.gateway,
            notifier,
            clock,
            cart_service: CartService::new(Arc::clone(&env)),
            checkout: CheckoutOrchestrator::new(env),
        }
    }
}

impl Harness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder {
            config: fast_config(),
            codes: Arc::new(SequenceCodeGenerator::new()),
            gateway: MockPaymentGateway::new(),
        }
    }

    pub fn new() -> Self {
        Self::builder().build()
    }

    /// An event on sale around the harness clock.
    pub fn event(&self) -> Event {
        let event = fixtures::event_on_sale(ticket_checkout_core::Clock::now(&self.clock));
        self.events.insert(event.clone()).unwrap();
        event
    }

    /// A USD ticket type with `quantity` units at `cents` each.
    pub fn stock(&self, event: &Event, name: &str, cents: u64, quantity: u32) -> TicketTypeRef {
        let stock = fixtures::stock(event, name, cents, quantity);
        let ticket_type = stock.ticket_type.clone();
        self.inventory.upsert_stock(stock).unwrap();
        ticket_type
    }

    pub fn remaining(&self, ticket_type: &TicketTypeRef) -> u32 {
        self.inventory.remaining(ticket_type).expect("stock row exists")
    }

    /// A buyer with a saved card on the mock gateway.
    pub fn buyer(&self, name: &str) -> (Buyer, PaymentMethodId) {
        let buyer = Buyer {
            id: UserId::new(),
            name: name.to_string(),
        };
        let method = self.gateway.add_payment_method(buyer.id);
        (buyer, method.id)
    }

    pub fn saved_request(buyer: &Buyer, method: PaymentMethodId) -> CheckoutRequest {
        CheckoutRequest::with_saved_method(buyer.clone(), Uuid::new_v4(), method)
    }
}
