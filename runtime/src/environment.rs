//! Dependencies shared by the cart service and the checkout orchestrator.

use std::sync::Arc;
use ticket_checkout_core::{
    CartStore, CheckoutConfig, Clock, CodeGenerator, EventAvailabilityGate, EventLookup, InventoryStore,
    NotificationDispatcher, PaymentGateway,
};

/// Everything a checkout touches, injected once at startup.
///
/// Stores are generic (their futures stay unboxed); the external services
/// behind the gateway and the notifier are trait objects so deployments can
/// swap them without changing types.
pub struct CheckoutEnvironment<I, C, E> {
    /// Stock rows and tickets
    pub inventory: I,
    /// Externalized carts
    pub carts: C,
    /// Event purchase windows
    pub gate: EventAvailabilityGate<E>,
    /// Payment provider
    pub gateway: Arc<dyn PaymentGateway>,
    /// Purchase notifications
    pub notifier: Arc<dyn NotificationDispatcher>,
    /// Source of "now"
    pub clock: Arc<dyn Clock>,
    /// Source of ticket codes
    pub codes: Arc<dyn CodeGenerator>,
    /// Tuning knobs
    pub config: CheckoutConfig,
}

impl<I, C, E> CheckoutEnvironment<I, C, E>
where
    I: InventoryStore,
    C: CartStore,
    E: EventLookup,
{
    /// Wires an environment together.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        inventory: I,
        carts: C,
        events: E,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn NotificationDispatcher>,
        clock: Arc<dyn Clock>,
        codes: Arc<dyn CodeGenerator>,
        config: CheckoutConfig,
    ) -> Self {
        Self {
            inventory,
            carts,
            gate: EventAvailabilityGate::new(events),
            gateway,
            notifier,
            clock,
            codes,
            config,
        }
    }

    /// Share the environment between services.
    #[must_use]
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}
