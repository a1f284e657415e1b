//! Recording notifier and deterministic ticket codes.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use ticket_checkout_core::{CodeGenerator, NotificationDispatcher, NotificationError, NotificationKind, TicketCode, UserId};

/// One captured notification
#[derive(Debug, Clone, PartialEq)]
pub struct SentNotification {
    /// Recipient
    pub user: UserId,
    /// Kind
    pub kind: NotificationKind,
    /// Payload as handed over
    pub payload: serde_json::Value,
}

/// Captures notifications instead of delivering them.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<SentNotification>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingNotifier {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every hand-over fail until called again with `false`.
    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Notifications captured so far
    #[must_use]
    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }
}

impl NotificationDispatcher for RecordingNotifier {
    fn notify(
        &self,
        user: UserId,
        kind: NotificationKind,
        payload: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotificationError>> + Send>> {
        let sent = Arc::clone(&self.sent);
        let failing = self.failing.load(Ordering::SeqCst);
        Box::pin(async move {
            if failing {
                return Err(NotificationError("mailer offline".to_string()));
            }
            sent.lock()
                .map_err(|_| NotificationError("recorder lock poisoned".to_string()))?
                .push(SentNotification { user, kind, payload });
            Ok(())
        })
    }
}

/// Hands out scripted codes first, then unique sequential ones.
#[derive(Debug, Default)]
pub struct SequenceCodeGenerator {
    scripted: Mutex<VecDeque<TicketCode>>,
    repeat: Option<TicketCode>,
    counter: AtomicU64,
}

impl SequenceCodeGenerator {
    /// Sequential codes `SEQ000000001`, `SEQ000000002`, ...
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return `codes` in order, then fall back to sequential codes.
    #[must_use]
    pub fn scripted<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            scripted: Mutex::new(codes.into_iter().map(|code| TicketCode::from_string(code.into())).collect()),
            ..Self::default()
        }
    }

    /// Always return `code`; every insert after the first collides.
    #[must_use]
    pub fn repeating(code: &str) -> Self {
        Self {
            repeat: Some(TicketCode::from_string(code.to_string())),
            ..Self::default()
        }
    }
}

impl CodeGenerator for SequenceCodeGenerator {
    fn generate(&self) -> TicketCode {
        if let Some(code) = &self.repeat {
            return code.clone();
        }
        if let Some(code) = self.scripted.lock().ok().and_then(|mut scripted| scripted.pop_front()) {
            return code;
        }
        let next = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        TicketCode::from_string(format!("SEQ{next:09}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_codes_come_first() {
        let codes = SequenceCodeGenerator::scripted(["AAAA2222BBBB"]);
        assert_eq!(codes.generate().as_str(), "AAAA2222BBBB");
        assert_eq!(codes.generate().as_str(), "SEQ000000001");
        assert_eq!(codes.generate().as_str(), "SEQ000000002");
    }

    #[tokio::test]
    async fn failing_notifier_records_nothing() {
        let notifier = RecordingNotifier::new();
        notifier.fail(true);
        let result = notifier
            .notify(UserId::new(), NotificationKind::PurchaseCompleted, serde_json::json!({}))
            .await;
        assert!(result.is_err());
        assert!(notifier.sent().is_empty());
    }
}
