//! Per-user carts.
//!
//! A cart is explicit state owned by one user and kept in a [`CartStore`]
//! rather than in process memory, so any instance of the service can serve
//! any request. Lines carry a price snapshot for display; checkout always
//! reprices from the locked stock rows.

use crate::error::{CheckoutError, Result};
use crate::types::{Currency, Money, TicketTypeRef, UserId};
use serde::{Deserialize, Serialize};
use std::future::Future;

/// One (ticket type, quantity) entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    /// Ticket type being bought
    pub ticket_type: TicketTypeRef,
    /// Units, always at least one
    pub quantity: u32,
    /// Unit price when the line was last touched
    pub unit_price: Money,
    /// Currency of `unit_price`
    pub currency: Currency,
}

impl CartLine {
    /// `unit_price × quantity`, or `None` on overflow
    #[must_use]
    pub const fn subtotal(&self) -> Option<Money> {
        self.unit_price.checked_mul(self.quantity)
    }
}

/// A user's cart.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    /// The only user allowed to touch this cart
    pub owner: UserId,
    /// Lines in insertion order, at most one per ticket type
    pub lines: Vec<CartLine>,
}

impl Cart {
    /// An empty cart for `owner`
    #[must_use]
    pub const fn new(owner: UserId) -> Self {
        Self {
            owner,
            lines: Vec::new(),
        }
    }

    /// Whether the cart has no lines
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Currency of the cart, taken from its first line
    #[must_use]
    pub fn currency(&self) -> Option<&Currency> {
        self.lines.first().map(|line| &line.currency)
    }

    /// Units already requested for `ticket_type`
    #[must_use]
    pub fn quantity_of(&self, ticket_type: &TicketTypeRef) -> u32 {
        self.lines
            .iter()
            .find(|line| &line.ticket_type == ticket_type)
            .map_or(0, |line| line.quantity)
    }

    /// Append a line, or merge it into the existing line for the same ticket type.
    ///
    /// The merged line takes the newer price snapshot.
    ///
    /// # Errors
    ///
    /// - `InvalidQuantity` if `line.quantity` is zero
    /// - `MixedCurrency` if the line's currency differs from the cart's
    pub fn add(&mut self, line: CartLine) -> Result<()> {
        if line.quantity == 0 {
            return Err(CheckoutError::InvalidQuantity { quantity: 0 });
        }

        if let Some(expected) = self.currency() {
            if *expected != line.currency {
                return Err(CheckoutError::MixedCurrency {
                    expected: expected.clone(),
                    found: line.currency,
                });
            }
        }

        match self
            .lines
            .iter_mut()
            .find(|existing| existing.ticket_type == line.ticket_type)
        {
            Some(existing) => {
                existing.quantity = existing
                    .quantity
                    .checked_add(line.quantity)
                    .ok_or(CheckoutError::InvalidQuantity {
                        quantity: line.quantity,
                    })?;
                existing.unit_price = line.unit_price;
            }
            None => self.lines.push(line),
        }
        Ok(())
    }

    /// Sum of line subtotals.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the sum overflows, which only corrupt data can cause.
    pub fn total(&self) -> Result<Money> {
        self.lines.iter().try_fold(Money::ZERO, |total, line| {
            line.subtotal()
                .and_then(|subtotal| total.checked_add(subtotal))
                .ok_or_else(|| CheckoutError::storage("cart total overflows"))
        })
    }

    /// Read-only view with the computed total
    ///
    /// # Errors
    ///
    /// See [`Cart::total`].
    pub fn view(&self) -> Result<CartView> {
        Ok(CartView {
            owner: self.owner,
            lines: self.lines.clone(),
            total: self.total()?,
            currency: self.currency().cloned(),
        })
    }
}

/// What `get` returns: the lines and their total.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartView {
    /// Cart owner
    pub owner: UserId,
    /// Current lines
    pub lines: Vec<CartLine>,
    /// Σ unit price × quantity
    pub total: Money,
    /// Currency of the total; `None` for an empty cart
    pub currency: Option<Currency>,
}

/// Externalized storage for carts.
pub trait CartStore: Send + Sync {
    /// Load a user's cart; `None` if they never added anything.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the read fails.
    fn load(&self, owner: UserId) -> impl Future<Output = Result<Option<Cart>>> + Send;

    /// Replace the stored cart with `cart`.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the write fails.
    fn save(&self, cart: &Cart) -> impl Future<Output = Result<()>> + Send;

    /// Remove every line of a user's cart.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the write fails.
    fn clear(&self, owner: UserId) -> impl Future<Output = Result<()>> + Send;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::EventId;

    fn line(ticket_type: &TicketTypeRef, quantity: u32, cents: u64) -> CartLine {
        CartLine {
            ticket_type: ticket_type.clone(),
            quantity,
            unit_price: Money::from_cents(cents),
            currency: Currency::usd(),
        }
    }

    #[test]
    fn adding_same_ticket_type_merges_lines() {
        let general = TicketTypeRef::new(EventId::new(), "General");
        let mut cart = Cart::new(UserId::new());

        cart.add(line(&general, 1, 2_500)).unwrap();
        cart.add(line(&general, 2, 2_500)).unwrap();

        assert_eq!(cart.lines.len(), 1);
        assert_eq!(cart.quantity_of(&general), 3);
        assert_eq!(cart.total().unwrap(), Money::from_cents(7_500));
    }

    #[test]
    fn zero_quantity_is_rejected() {
        let general = TicketTypeRef::new(EventId::new(), "General");
        let mut cart = Cart::new(UserId::new());

        let result = cart.add(line(&general, 0, 2_500));
        assert_eq!(result, Err(CheckoutError::InvalidQuantity { quantity: 0 }));
        assert!(cart.is_empty());
    }

    #[test]
    fn lines_keep_insertion_order_and_total() {
        let event = EventId::new();
        let vip = TicketTypeRef::new(event, "VIP");
        let general = TicketTypeRef::new(event, "General");
        let mut cart = Cart::new(UserId::new());

        cart.add(line(&vip, 1, 10_000)).unwrap();
        cart.add(line(&general, 2, 2_500)).unwrap();

        let view = cart.view().unwrap();
        assert_eq!(view.lines[0].ticket_type, vip);
        assert_eq!(view.lines[1].ticket_type, general);
        assert_eq!(view.total, Money::from_cents(15_000));
        assert_eq!(view.currency, Some(Currency::usd()));
    }

    #[test]
    fn mixed_currency_is_rejected() {
        let event = EventId::new();
        let mut cart = Cart::new(UserId::new());
        cart.add(line(&TicketTypeRef::new(event, "General"), 1, 100)).unwrap();

        let mut euro = line(&TicketTypeRef::new(event, "VIP"), 1, 100);
        euro.currency = Currency::eur();

        assert!(matches!(cart.add(euro), Err(CheckoutError::MixedCurrency { .. })));
        assert_eq!(cart.lines.len(), 1);
    }

    proptest::proptest! {
        #[test]
        fn total_is_sum_of_every_add(adds in proptest::collection::vec((0usize..3, 1u32..20), 1..30)) {
            let event = EventId::new();
            let types = [
                TicketTypeRef::new(event, "General"),
                TicketTypeRef::new(event, "VIP"),
                TicketTypeRef::new(event, "Balcony"),
            ];
            let mut cart = Cart::new(UserId::new());
            let mut expected = 0u64;

            for (index, quantity) in adds {
                cart.add(line(&types[index], quantity, 150)).unwrap();
                expected += u64::from(quantity) * 150;
            }

            proptest::prop_assert!(cart.lines.len() <= types.len());
            proptest::prop_assert_eq!(cart.total().unwrap(), Money::from_cents(expected));
        }
    }
}
