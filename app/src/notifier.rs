//! Notification dispatcher that writes to the log.

use std::future::Future;
use std::pin::Pin;
use ticket_checkout_core::{NotificationDispatcher, NotificationError, NotificationKind, UserId};

/// Emits every notification as a structured `tracing` event.
///
/// Stands in for an email or push sender; delivery is whatever the log
/// pipeline does with `target = "notifications"`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl NotificationDispatcher for LogNotifier {
    fn notify(
        &self,
        user: UserId,
        kind: NotificationKind,
        payload: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotificationError>> + Send>> {
        Box::pin(async move {
            tracing::info!(
                target: "notifications",
                user_id = %user,
                kind = %kind,
                payload = %payload,
                "Notification dispatched"
            );
            Ok(())
        })
    }
}
