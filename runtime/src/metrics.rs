//! Prometheus metrics for the checkout engine.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `checkout_attempts_total{outcome}` - checkouts by outcome (`committed`, `replayed` or an error kind)
//! - `checkout_tickets_minted_total` - tickets minted
//! - `checkout_revenue_cents_total` - charged amount of committed checkouts
//! - `checkout_compensations_total{outcome}` - refunds issued after a failed post-charge step
//! - `checkout_refunds_total{outcome}` - buyer-requested refunds
//! - `cart_mutations_total{outcome}` - add-to-cart calls
//!
//! ## Histograms
//! - `checkout_duration_seconds` - wall time of one checkout
//!
//! # Example
//!
//! ```rust,no_run
//! use ticket_checkout_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//! # Ok(())
//! # }
//! ```

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use thiserror::Error;

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus recorder plus the address it is published on.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server for `addr` (e.g. `0.0.0.0:9090`).
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Describe every checkout metric and install the Prometheus recorder.
    ///
    /// A recorder installed earlier in the same process (common in tests) is
    /// tolerated; [`MetricsServer::render`] then returns `None`.
    ///
    /// # Errors
    ///
    /// Returns `MetricsError` if the exporter cannot be built or installed.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(addr = %self.addr, "Metrics recorder installed");
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Address the metrics are meant to be scraped from
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus text format.
    ///
    /// Returns `None` if this instance did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(
        "checkout_attempts_total",
        "Checkout attempts by outcome (committed, replayed, or error kind)"
    );
    describe_counter!("checkout_tickets_minted_total", "Tickets minted by committed checkouts");
    describe_counter!(
        "checkout_revenue_cents_total",
        "Amount charged by committed checkouts, in minor units"
    );
    describe_counter!(
        "checkout_compensations_total",
        "Refunds issued after a step failed following an approved charge"
    );
    describe_counter!("checkout_refunds_total", "Buyer-requested refunds by outcome");
    describe_counter!("cart_mutations_total", "Add-to-cart calls by outcome");
    describe_histogram!("checkout_duration_seconds", "Wall time of one checkout");
}

/// Checkout metrics recorder.
pub struct CheckoutMetrics;

impl CheckoutMetrics {
    /// Record the end of one checkout.
    pub fn record_outcome(outcome: &'static str, duration_secs: f64) {
        counter!("checkout_attempts_total", "outcome" => outcome).increment(1);
        histogram!("checkout_duration_seconds").record(duration_secs);
    }

    /// Record a committed purchase.
    pub fn record_committed(tickets: usize, revenue_cents: u64) {
        counter!("checkout_tickets_minted_total").increment(u64::try_from(tickets).unwrap_or(u64::MAX));
        counter!("checkout_revenue_cents_total").increment(revenue_cents);
    }

    /// Record a compensating refund.
    pub fn record_compensation(outcome: &'static str) {
        counter!("checkout_compensations_total", "outcome" => outcome).increment(1);
    }

    /// Record a buyer-requested refund.
    pub fn record_refund(outcome: &'static str) {
        counter!("checkout_refunds_total", "outcome" => outcome).increment(1);
    }

    /// Record an add-to-cart call.
    pub fn record_cart_mutation(outcome: &'static str) {
        counter!("cart_mutations_total", "outcome" => outcome).increment(1);
    }
}
