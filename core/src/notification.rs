//! Outbound purchase notifications.
//!
//! Delivery belongs to another service. The engine only hands over a kind
//! and a JSON payload after its transaction has committed.

use crate::types::UserId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// What happened to the user's purchase
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// Tickets were minted and paid for
    PurchaseCompleted,
    /// A payment was refunded and its tickets voided
    PurchaseRefunded,
}

impl NotificationKind {
    /// Stable name used in payloads and logs
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PurchaseCompleted => "purchase_completed",
            Self::PurchaseRefunded => "purchase_refunded",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notification could not be handed over
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Notification failed: {0}")]
pub struct NotificationError(pub String);

/// Fire-and-forget dispatcher.
pub trait NotificationDispatcher: Send + Sync {
    /// Hand a notification to the delivery service.
    ///
    /// # Errors
    ///
    /// Returns `NotificationError` if the hand-over fails. Callers log it and
    /// carry on; a committed purchase is never undone by a failed notification.
    fn notify(
        &self,
        user: UserId,
        kind: NotificationKind,
        payload: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotificationError>> + Send>>;
}
