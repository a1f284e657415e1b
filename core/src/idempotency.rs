//! Idempotency keys for payment calls.
//!
//! A key is derived from the buyer and the client's attempt id, so a retried
//! request for the same attempt always reaches the gateway under the same
//! key, while a new attempt by the same buyer gets a new one.

use crate::types::{PaymentId, UserId};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

const KEY_PREFIX: &str = "chk_";

/// Key sent with every gateway call belonging to one checkout attempt.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Derive the key for `(user, attempt_id)`.
    #[must_use]
    pub fn derive(user: UserId, attempt_id: Uuid) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(format!("checkout:{user}:{attempt_id}").as_bytes());
        let digest = hasher.finalize();
        Self(format!("{KEY_PREFIX}{}", URL_SAFE_NO_PAD.encode(digest)))
    }

    /// Key used to compensate a charge made under this key.
    #[must_use]
    pub fn compensation(&self) -> String {
        format!("{}:refund", self.0)
    }

    /// Key used for a buyer-requested refund of a payment.
    #[must_use]
    pub fn refund(payment_id: PaymentId) -> String {
        format!("refund:{payment_id}")
    }

    /// The key as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<IdempotencyKey> for String {
    fn from(key: IdempotencyKey) -> Self {
        key.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_attempt_gives_same_key() {
        let user = UserId::new();
        let attempt = Uuid::new_v4();
        assert_eq!(IdempotencyKey::derive(user, attempt), IdempotencyKey::derive(user, attempt));
    }

    #[test]
    fn different_attempts_or_users_give_different_keys() {
        let user = UserId::new();
        let attempt = Uuid::new_v4();
        let key = IdempotencyKey::derive(user, attempt);

        assert_ne!(key, IdempotencyKey::derive(user, Uuid::new_v4()));
        assert_ne!(key, IdempotencyKey::derive(UserId::new(), attempt));
    }

    #[test]
    fn key_is_url_safe_and_prefixed() {
        let key = IdempotencyKey::derive(UserId::new(), Uuid::new_v4());
        assert!(key.as_str().starts_with("chk_"));
        // 32 digest bytes encode to 43 unpadded base64 characters
        assert_eq!(key.as_str().len(), 4 + 43);
        assert!(key.as_str()[4..].chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert!(key.compensation().ends_with(":refund"));
    }
}
