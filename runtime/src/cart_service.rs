//! Add-to-cart, view and clear.
//!
//! Every check made here is advisory. Stock may be sold to someone else, or
//! the event window may close, between adding a line and checking out; the
//! orchestrator repeats these checks under the row locks.

use crate::environment::CheckoutEnvironment;
use crate::metrics::CheckoutMetrics;
use std::sync::Arc;
use ticket_checkout_core::{
    Cart, CartLine, CartStore, CartView, CheckoutError, EventLookup, InventoryStore, Result, TicketTypeRef, UserId,
};

/// Cart operations for one deployment.
pub struct CartService<I, C, E> {
    env: Arc<CheckoutEnvironment<I, C, E>>,
}

impl<I, C, E> Clone for CartService<I, C, E> {
    fn clone(&self) -> Self {
        Self {
            env: Arc::clone(&self.env),
        }
    }
}

impl<I, C, E> CartService<I, C, E>
where
    I: InventoryStore,
    C: CartStore,
    E: EventLookup,
{
    /// Creates a cart service over a shared environment
    #[must_use]
    pub const fn new(env: Arc<CheckoutEnvironment<I, C, E>>) -> Self {
        Self { env }
    }

    /// Add `quantity` units of a ticket type to the user's cart.
    ///
    /// Merges into an existing line for the same ticket type; the merged
    /// quantity must still fit in the current `remaining`.
    ///
    /// # Errors
    ///
    /// - `InvalidQuantity` if `quantity` is zero
    /// - `NotFound` if the ticket type or its event does not exist
    /// - `EventUnavailable` if the event is not on sale now
    /// - `InsufficientStock` if the merged quantity exceeds `remaining`
    /// - `MixedCurrency` if the ticket type is priced in another currency than the cart
    pub async fn add(&self, user: UserId, ticket_type: TicketTypeRef, quantity: u32) -> Result<CartView> {
        let result = self.add_line(user, &ticket_type, quantity).await;
        match &result {
            Ok(view) => {
                CheckoutMetrics::record_cart_mutation("added");
                tracing::info!(
                    user_id = %user,
                    ticket_type = %ticket_type,
                    quantity,
                    cart_total = view.total.cents(),
                    "Added to cart"
                );
            }
            Err(err) => {
                CheckoutMetrics::record_cart_mutation(err.kind());
                tracing::info!(
                    user_id = %user,
                    ticket_type = %ticket_type,
                    quantity,
                    error = %err,
                    "Add to cart rejected"
                );
            }
        }
        result
    }

    async fn add_line(&self, user: UserId, ticket_type: &TicketTypeRef, quantity: u32) -> Result<CartView> {
        if quantity == 0 {
            return Err(CheckoutError::InvalidQuantity { quantity });
        }

        let stock = self
            .env
            .inventory
            .stock(ticket_type)
            .await?
            .ok_or_else(|| CheckoutError::not_found("ticket type", ticket_type))?;

        self.env.gate.check(ticket_type.event_id, self.env.clock.now()).await?;

        let mut cart = self.env.carts.load(user).await?.unwrap_or_else(|| Cart::new(user));

        let requested = cart
            .quantity_of(ticket_type)
            .checked_add(quantity)
            .ok_or(CheckoutError::InvalidQuantity { quantity })?;
        if requested > stock.remaining {
            return Err(CheckoutError::InsufficientStock {
                ticket_type: ticket_type.clone(),
                requested,
                remaining: stock.remaining,
            });
        }

        cart.add(CartLine {
            ticket_type: ticket_type.clone(),
            quantity,
            unit_price: stock.unit_price,
            currency: stock.currency,
        })?;
        self.env.carts.save(&cart).await?;

        cart.view()
    }

    /// The user's cart with its total; an empty view if none exists.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the cart cannot be read.
    pub async fn get(&self, user: UserId) -> Result<CartView> {
        self.env.carts.load(user).await?.unwrap_or_else(|| Cart::new(user)).view()
    }

    /// Remove every line from the user's cart.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the cart cannot be written.
    pub async fn clear(&self, user: UserId) -> Result<()> {
        self.env.carts.clear(user).await?;
        tracing::debug!(user_id = %user, "Cart cleared");
        Ok(())
    }
}
