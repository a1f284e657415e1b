//! Checkout state machine.
//!
//! ```text
//! Started -> StockValidated -> PaymentCharged -> TicketsMinted -> Committed
//!    \              \                 \                 \
//!     +--------------+-----------------+-----------------+--> Aborted
//! ```
//!
//! The orchestrator drives one [`CheckoutProgress`] per attempt and logs
//! every transition; a transition the diagram does not allow is an
//! internal error.

use crate::error::CheckoutError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

/// Phase of one checkout attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutState {
    /// Request accepted, nothing locked yet
    Started,
    /// Rows locked, windows and stock re-checked
    StockValidated,
    /// Gateway approved the charge
    PaymentCharged,
    /// Stock decremented and every ticket inserted
    TicketsMinted,
    /// Transaction committed
    Committed,
    /// Rolled back; nothing persisted
    Aborted,
}

impl CheckoutState {
    /// Stable name for logs
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::StockValidated => "stock_validated",
            Self::PaymentCharged => "payment_charged",
            Self::TicketsMinted => "tickets_minted",
            Self::Committed => "committed",
            Self::Aborted => "aborted",
        }
    }

    /// `Committed` and `Aborted` end an attempt
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed | Self::Aborted)
    }

    /// Whether `self -> next` is an allowed step
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        match (self, next) {
            (Self::Started, Self::StockValidated)
            | (Self::StockValidated, Self::PaymentCharged)
            | (Self::PaymentCharged, Self::TicketsMinted)
            | (Self::TicketsMinted, Self::Committed) => true,
            (current, Self::Aborted) => !current.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for CheckoutState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks the current phase of one attempt.
#[derive(Debug)]
pub struct CheckoutProgress {
    state: CheckoutState,
    started_at: Instant,
}

impl CheckoutProgress {
    /// A fresh attempt in `Started`
    #[must_use]
    pub fn start() -> Self {
        Self {
            state: CheckoutState::Started,
            started_at: Instant::now(),
        }
    }

    /// Current phase
    #[must_use]
    pub const fn state(&self) -> CheckoutState {
        self.state
    }

    /// Seconds since [`CheckoutProgress::start`]
    #[must_use]
    pub fn elapsed_secs(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64()
    }

    /// Move to `next`.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Internal` if the step is not allowed.
    pub fn advance(&mut self, next: CheckoutState) -> Result<(), CheckoutError> {
        if !self.state.can_transition_to(next) {
            return Err(CheckoutError::Internal(format!(
                "illegal checkout transition {} -> {next}",
                self.state
            )));
        }
        tracing::debug!(from = %self.state, to = %next, "Checkout transition");
        self.state = next;
        Ok(())
    }

    /// Move to `Aborted` unless already terminal. Returns the phase that was left.
    pub fn abort(&mut self) -> CheckoutState {
        let left = self.state;
        if !left.is_terminal() {
            tracing::debug!(from = %left, "Checkout aborted");
            self.state = CheckoutState::Aborted;
        }
        left
    }
}
