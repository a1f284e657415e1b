//! Checkout tuning knobs.
//!
//! Loads from `CHECKOUT_*` environment variables with defaults for every field.

use crate::ticket_code::DEFAULT_CODE_LENGTH;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Upper bound on gateway retries after a transport failure.
pub const MAX_GATEWAY_RETRIES: u32 = 1;

/// What a refund does to stock
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestockPolicy {
    /// Refunded units stay sold
    #[default]
    Never,
    /// Refunded units return to `remaining`
    OnRefund,
}

/// Checkout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutConfig {
    /// Symbols per ticket code
    pub code_length: usize,
    /// Codes tried per ticket before giving up
    pub max_code_attempts: usize,
    /// Extra gateway attempts after a transport failure, at most [`MAX_GATEWAY_RETRIES`]
    pub gateway_retries: u32,
    /// Delay before the first gateway retry, in milliseconds
    pub gateway_retry_delay_ms: u64,
    /// Extra notification attempts after a failure
    pub notification_retries: u32,
    /// Whether refunds restock
    pub restock_policy: RestockPolicy,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            code_length: DEFAULT_CODE_LENGTH,
            max_code_attempts: 8,
            gateway_retries: 1,
            gateway_retry_delay_ms: 200,
            notification_retries: 2,
            restock_policy: RestockPolicy::Never,
        }
    }
}

impl CheckoutConfig {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable variables fall back to [`CheckoutConfig::default`].
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            code_length: env::var("CHECKOUT_CODE_LENGTH")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|length| *length > 0)
                .unwrap_or(defaults.code_length),
            max_code_attempts: env::var("CHECKOUT_CODE_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|attempts| *attempts > 0)
                .unwrap_or(defaults.max_code_attempts),
            gateway_retries: env::var("CHECKOUT_GATEWAY_RETRIES")
                .ok()
                .and_then(|s| s.parse::<u32>().ok())
                .map_or(defaults.gateway_retries, |retries| retries.min(MAX_GATEWAY_RETRIES)),
            gateway_retry_delay_ms: env::var("CHECKOUT_GATEWAY_RETRY_DELAY_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.gateway_retry_delay_ms),
            notification_retries: env::var("CHECKOUT_NOTIFICATION_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.notification_retries),
            restock_policy: env::var("CHECKOUT_RESTOCK_ON_REFUND")
                .ok()
                .and_then(|s| s.parse::<bool>().ok())
                .map_or(defaults.restock_policy, |restock| {
                    if restock {
                        RestockPolicy::OnRefund
                    } else {
                        RestockPolicy::Never
                    }
                }),
        }
    }

    /// Builder: set the restock policy
    #[must_use]
    pub const fn with_restock_policy(mut self, policy: RestockPolicy) -> Self {
        self.restock_policy = policy;
        self
    }

    /// Builder: set the gateway retry count, clamped to [`MAX_GATEWAY_RETRIES`]
    #[must_use]
    pub const fn with_gateway_retries(mut self, retries: u32) -> Self {
        self.gateway_retries = if retries > MAX_GATEWAY_RETRIES {
            MAX_GATEWAY_RETRIES
        } else {
            retries
        };
        self
    }

    /// Builder: set the gateway retry delay
    #[must_use]
    pub const fn with_gateway_retry_delay_ms(mut self, delay_ms: u64) -> Self {
        self.gateway_retry_delay_ms = delay_ms;
        self
    }

    /// Builder: set how many codes to try per ticket
    #[must_use]
    pub const fn with_max_code_attempts(mut self, attempts: usize) -> Self {
        self.max_code_attempts = attempts;
        self
    }

    /// Gateway retry delay as a `Duration`
    #[must_use]
    pub const fn gateway_retry_delay(&self) -> Duration {
        Duration::from_millis(self.gateway_retry_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_retry_the_gateway_once_and_never_restock() {
        let config = CheckoutConfig::default();
        assert_eq!(config.gateway_retries, 1);
        assert_eq!(config.max_code_attempts, 8);
        assert_eq!(config.code_length, 12);
        assert_eq!(config.restock_policy, RestockPolicy::Never);
    }

    #[test]
    fn gateway_retries_never_exceed_one() {
        assert_eq!(CheckoutConfig::default().with_gateway_retries(5).gateway_retries, 1);
        assert_eq!(CheckoutConfig::default().with_gateway_retries(0).gateway_retries, 0);
    }

    #[test]
    fn builders_override_fields() {
        let config = CheckoutConfig::default()
            .with_restock_policy(RestockPolicy::OnRefund)
            .with_gateway_retries(0)
            .with_gateway_retry_delay_ms(5);
        assert_eq!(config.restock_policy, RestockPolicy::OnRefund);
        assert_eq!(config.gateway_retries, 0);
        assert_eq!(config.gateway_retry_delay(), Duration::from_millis(5));
    }
}
