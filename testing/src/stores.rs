//! In-memory cart store and event lookup.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use ticket_checkout_core::{Cart, CartStore, CheckoutError, Event, EventId, EventLookup, Result, UserId};

/// Mock cart store.
///
/// Uses in-memory storage for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCartStore {
    carts: Arc<Mutex<HashMap<UserId, Cart>>>,
    fail_clears: Arc<AtomicBool>,
}

impl InMemoryCartStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `clear` fail until called again with `false`.
    pub fn fail_clears(&self, fail: bool) {
        self.fail_clears.store(fail, Ordering::SeqCst);
    }

    /// Current cart of a user, bypassing the trait.
    #[must_use]
    pub fn snapshot(&self, owner: UserId) -> Option<Cart> {
        self.carts.lock().ok().and_then(|carts| carts.get(&owner).cloned())
    }
}

impl CartStore for InMemoryCartStore {
    async fn load(&self, owner: UserId) -> Result<Option<Cart>> {
        Ok(self
            .carts
            .lock()
            .map_err(|_| CheckoutError::storage("cart store lock poisoned"))?
            .get(&owner)
            .cloned())
    }

    async fn save(&self, cart: &Cart) -> Result<()> {
        self.carts
            .lock()
            .map_err(|_| CheckoutError::storage("cart store lock poisoned"))?
            .insert(cart.owner, cart.clone());
        Ok(())
    }

    async fn clear(&self, owner: UserId) -> Result<()> {
        if self.fail_clears.load(Ordering::SeqCst) {
            return Err(CheckoutError::storage("cart store unavailable"));
        }
        self.carts
            .lock()
            .map_err(|_| CheckoutError::storage("cart store lock poisoned"))?
            .remove(&owner);
        Ok(())
    }
}

/// Mock event lookup.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventLookup {
    events: Arc<Mutex<HashMap<EventId, Event>>>,
}

impl InMemoryEventLookup {
    /// Create an empty lookup.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an event.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the lock is poisoned.
    pub fn insert(&self, event: Event) -> Result<()> {
        self.events
            .lock()
            .map_err(|_| CheckoutError::storage("event lookup lock poisoned"))?
            .insert(event.id, event);
        Ok(())
    }
}

impl EventLookup for InMemoryEventLookup {
    async fn find_by_id(&self, event_id: EventId) -> Result<Option<Event>> {
        Ok(self
            .events
            .lock()
            .map_err(|_| CheckoutError::storage("event lookup lock poisoned"))?
            .get(&event_id)
            .cloned())
    }
}
