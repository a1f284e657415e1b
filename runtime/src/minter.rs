//! Ticket minting.
//!
//! One ticket per purchased unit, written through the checkout transaction
//! so tickets and the stock decrement commit or vanish together.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use ticket_checkout_core::{
    CheckoutError, CheckoutTransaction, CodeGenerator, PaymentId, Result, Ticket, TicketStatus, TicketTypeRef, UserId,
};

/// Mints tickets with store-enforced unique codes.
#[derive(Clone)]
pub struct TicketMinter {
    codes: Arc<dyn CodeGenerator>,
    max_attempts: usize,
}

impl TicketMinter {
    /// Creates a minter that tries at most `max_attempts` codes per ticket
    #[must_use]
    pub fn new(codes: Arc<dyn CodeGenerator>, max_attempts: usize) -> Self {
        Self {
            codes,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Mint one ticket inside `tx`.
    ///
    /// A code the store already holds is discarded and a fresh one drawn.
    ///
    /// # Errors
    ///
    /// - `CodeSpaceExhausted` if every attempt collided
    /// - `Storage` if the insert fails for another reason
    pub async fn mint<T: CheckoutTransaction>(
        &self,
        tx: &mut T,
        owner: UserId,
        ticket_type: &TicketTypeRef,
        payment_id: PaymentId,
        issued_at: DateTime<Utc>,
    ) -> Result<Ticket> {
        for attempt in 1..=self.max_attempts {
            let ticket = Ticket {
                code: self.codes.generate(),
                owner,
                event_id: ticket_type.event_id,
                ticket_type: ticket_type.clone(),
                payment_id,
                status: TicketStatus::Valid,
                issued_at,
            };

            if tx.insert_ticket(&ticket).await? {
                return Ok(ticket);
            }

            tracing::warn!(
                code = %ticket.code,
                attempt,
                max_attempts = self.max_attempts,
                "Ticket code collision, drawing another"
            );
        }

        Err(CheckoutError::CodeSpaceExhausted {
            attempts: self.max_attempts,
        })
    }

    /// Mint `quantity` tickets of one type.
    ///
    /// # Errors
    ///
    /// Stops at the first ticket that fails; see [`TicketMinter::mint`].
    pub async fn mint_many<T: CheckoutTransaction>(
        &self,
        tx: &mut T,
        owner: UserId,
        ticket_type: &TicketTypeRef,
        quantity: u32,
        payment_id: PaymentId,
        issued_at: DateTime<Utc>,
    ) -> Result<Vec<Ticket>> {
        let mut tickets = Vec::with_capacity(usize::try_from(quantity).unwrap_or_default());
        for _ in 0..quantity {
            tickets.push(self.mint(tx, owner, ticket_type, payment_id, issued_at).await?);
        }
        Ok(tickets)
    }
}

impl std::fmt::Debug for TicketMinter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicketMinter")
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}
