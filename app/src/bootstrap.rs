//! Wiring: connect the stores, pick a gateway, build the services.
//!
//! # Example
//!
//! ```rust,ignore
//! let config = Config::from_env();
//! let services = Services::from_config(&config).await?;
//! services.carts.add(user, ticket_type, 2).await?;
//! ```

use crate::config::Config;
use crate::gateway::HttpPaymentGateway;
use crate::notifier::LogNotifier;
use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use ticket_checkout_core::{PaymentGateway, RandomCodeGenerator, SystemClock};
use ticket_checkout_postgres::{PostgresCartStore, PostgresEventLookup, PostgresInventory, connect, migrate};
use ticket_checkout_runtime::metrics::MetricsServer;
use ticket_checkout_runtime::{CartService, CheckoutEnvironment, CheckoutOrchestrator};
use ticket_checkout_testing::MockPaymentGateway;
use tracing::{info, warn};

/// Cart service over the `PostgreSQL` stores
pub type PgCartService = CartService<PostgresInventory, PostgresCartStore, PostgresEventLookup>;
/// Checkout orchestrator over the `PostgreSQL` stores
pub type PgCheckout = CheckoutOrchestrator<PostgresInventory, PostgresCartStore, PostgresEventLookup>;

/// Everything the service needs at runtime.
pub struct Services {
    /// Add-to-cart, view, clear
    pub carts: PgCartService,
    /// Checkout and refunds
    pub checkout: PgCheckout,
    /// Stock administration
    pub inventory: PostgresInventory,
    /// Event administration
    pub events: PostgresEventLookup,
    /// Prometheus exporter, when `METRICS_PORT` is set
    pub metrics: Option<MetricsServer>,
}

impl Services {
    /// Connect to `PostgreSQL`, run migrations and build the services.
    ///
    /// # Errors
    ///
    /// Returns an error if the database is unreachable, a migration fails, the
    /// gateway client cannot be built or the metrics exporter cannot start.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let metrics = start_metrics(config)?;

        info!(max_connections = config.postgres.max_connections, "Connecting to database...");
        let pool = connect(&config.postgres.url, config.postgres.max_connections)
            .await
            .context("database connection failed")?;
        migrate(&pool).await.context("migrations failed")?;
        info!("Database ready");

        let inventory = PostgresInventory::new(pool.clone(), config.lock_timeout());
        let events = PostgresEventLookup::new(pool.clone());

        let env = CheckoutEnvironment::new(
            inventory.clone(),
            PostgresCartStore::new(pool),
            events.clone(),
            payment_gateway(config)?,
            Arc::new(LogNotifier),
            Arc::new(SystemClock),
            Arc::new(RandomCodeGenerator::new(config.checkout.code_length)),
            config.checkout.clone(),
        )
        .shared();

        Ok(Self {
            carts: CartService::new(Arc::clone(&env)),
            checkout: CheckoutOrchestrator::new(env),
            inventory,
            events,
            metrics,
        })
    }
}

/// The HTTP gateway when a provider URL is configured, the in-process mock otherwise.
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be built.
pub fn payment_gateway(config: &Config) -> anyhow::Result<Arc<dyn PaymentGateway>> {
    match &config.gateway.url {
        Some(url) => {
            info!(url = %url, "Using HTTP payment gateway");
            let gateway = HttpPaymentGateway::new(url.clone(), config.gateway.api_key.clone(), config.gateway_timeout())
                .context("failed to build payment gateway client")?;
            Ok(Arc::new(gateway))
        }
        None => {
            warn!("PAYMENT_GATEWAY_URL not set, using the in-process mock gateway");
            Ok(Arc::new(MockPaymentGateway::new()))
        }
    }
}

fn start_metrics(config: &Config) -> anyhow::Result<Option<MetricsServer>> {
    let Some(port) = config.telemetry.metrics_port else {
        return Ok(None);
    };
    let mut server = MetricsServer::new(SocketAddr::from(([0, 0, 0, 0], port)));
    server.start().context("metrics exporter failed to start")?;
    info!(port, "Metrics exporter listening");
    Ok(Some(server))
}
