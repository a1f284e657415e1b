//! Bounded retry with exponential backoff for calls to external services.
//!
//! The checkout engine retries two kinds of calls: payment gateway requests
//! that failed in transport (always under the same idempotency key, so a
//! retry can never charge twice), and post-commit notifications. Everything
//! else fails on the first error.
//!
//! # Example
//!
//! ```rust
//! use ticket_checkout_runtime::retry::{RetryPolicy, retry_with_predicate};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), String> {
//! let policy = RetryPolicy::builder()
//!     .max_retries(1)
//!     .initial_delay(Duration::from_millis(50))
//!     .build();
//!
//! let result = retry_with_predicate(
//!     policy,
//!     "gateway.charge",
//!     || async { Ok::<_, String>(42) },
//!     |err: &String| err.contains("unreachable"),
//! )
//! .await?;
//! assert_eq!(result, 42);
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use ticket_checkout_core::CheckoutConfig;
use ticket_checkout_core::config::MAX_GATEWAY_RETRIES;

/// Retry policy configuration for exponential backoff.
///
/// # Default Values
///
/// - `max_retries`: 1
/// - `initial_delay`: 200ms
/// - `max_delay`: 5 seconds
/// - `multiplier`: 2.0 (delay doubles each retry)
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; zero means a single attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Cap for the exponential backoff
    pub max_delay: Duration,
    /// Growth factor between consecutive delays
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Create a new policy builder.
    #[must_use]
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder {
            policy: Self::default(),
        }
    }

    /// Exactly one attempt.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Policy for payment gateway calls; never more than one retry.
    #[must_use]
    pub fn gateway(config: &CheckoutConfig) -> Self {
        Self::builder()
            .max_retries(config.gateway_retries.min(MAX_GATEWAY_RETRIES))
            .initial_delay(config.gateway_retry_delay())
            .build()
    }

    /// Policy for post-commit notifications.
    #[must_use]
    pub fn notification(config: &CheckoutConfig) -> Self {
        Self::builder()
            .max_retries(config.notification_retries)
            .initial_delay(config.gateway_retry_delay())
            .build()
    }

    /// Delay before retry number `retry` (zero-based).
    ///
    /// `initial_delay * multiplier^retry`, capped at `max_delay`.
    #[must_use]
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent).max(1.0);
        Duration::try_from_secs_f64(secs).map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

/// Builder for [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder {
    policy: RetryPolicy,
}

impl RetryPolicyBuilder {
    /// Set maximum number of retries.
    #[must_use]
    pub const fn max_retries(mut self, max_retries: u32) -> Self {
        self.policy.max_retries = max_retries;
        self
    }

    /// Set delay before the first retry.
    #[must_use]
    pub const fn initial_delay(mut self, delay: Duration) -> Self {
        self.policy.initial_delay = delay;
        self
    }

    /// Set maximum delay.
    #[must_use]
    pub const fn max_delay(mut self, delay: Duration) -> Self {
        self.policy.max_delay = delay;
        self
    }

    /// Set multiplier for exponential backoff.
    #[must_use]
    pub const fn multiplier(mut self, multiplier: f64) -> Self {
        self.policy.multiplier = multiplier;
        self
    }

    /// Build the [`RetryPolicy`].
    #[must_use]
    pub fn build(self) -> RetryPolicy {
        self.policy
    }
}

/// Retry an async operation on every error.
///
/// # Errors
///
/// Returns the last error once `policy.max_retries` retries are spent.
pub async fn retry_with_backoff<F, Fut, T, E>(policy: RetryPolicy, operation_name: &str, operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    retry_with_predicate(policy, operation_name, operation, |_| true).await
}

/// Retry an async operation while `is_retryable` accepts its error.
///
/// # Errors
///
/// Returns the first non-retryable error immediately, or the last error
/// once `policy.max_retries` retries are spent.
pub async fn retry_with_predicate<F, Fut, T, E, P>(
    policy: RetryPolicy,
    operation_name: &str,
    mut operation: F,
    is_retryable: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut retry = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if retry > 0 {
                    tracing::info!(operation = operation_name, retry, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(err) => {
                if !is_retryable(&err) {
                    return Err(err);
                }

                if retry >= policy.max_retries {
                    tracing::error!(
                        operation = operation_name,
                        attempts = retry + 1,
                        error = %err,
                        "Operation failed after max retries"
                    );
                    return Err(err);
                }

                let delay = policy.delay_for_retry(retry);
                tracing::warn!(
                    operation = operation_name,
                    retry,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "Operation failed, retrying"
                );

                sleep(delay).await;
                retry += 1;
            }
        }
    }
}
