//! Checkout demo.
//!
//! Seeds an on-sale event, buys two tickets with a card, replays the same
//! attempt, then refunds it. Needs a reachable `DATABASE_URL`; uses the
//! in-process mock gateway unless `PAYMENT_GATEWAY_URL` is set.

use anyhow::Context;
use chrono::{Datelike, Duration, Utc};
use ticket_checkout_app::{Config, Services};
use ticket_checkout_core::{CardDetails, Currency, Event, EventId, Money, TicketTypeRef, TicketTypeStock, UserId};
use ticket_checkout_runtime::metrics::MetricsServer;
use ticket_checkout_runtime::{Buyer, CheckoutRequest};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.telemetry.log_filter.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting checkout demo");
    let services = Services::from_config(&config).await?;

    // Seed one event with a single ticket type
    let now = Utc::now();
    let event = Event {
        id: EventId::new(),
        name: "Demo Night".to_string(),
        start_time: now - Duration::hours(1),
        end_time: now + Duration::days(7),
    };
    services.events.upsert(&event).await?;
    let general = TicketTypeRef::new(event.id, "General");
    services
        .inventory
        .upsert_stock(&TicketTypeStock::new(
            general.clone(),
            Money::from_cents(2_500),
            Currency::usd(),
            100,
        ))
        .await?;
    info!(event_id = %event.id, "Event seeded");

    let buyer = Buyer {
        id: UserId::new(),
        name: "Ada Lovelace".to_string(),
    };
    let cart = services.carts.add(buyer.id, general.clone(), 2).await?;
    info!(total = %cart.total, lines = cart.lines.len(), "Cart ready");

    let card = CardDetails {
        holder_name: buyer.name.clone(),
        number: "4242 4242 4242 4242".to_string(),
        exp_month: 12,
        exp_year: now.year() + 2,
        cvc: "123".to_string(),
        currency: Currency::usd(),
    };
    let request = CheckoutRequest::with_card(buyer.clone(), Uuid::new_v4(), card);

    let receipt = services.checkout.checkout(request.clone()).await.context("checkout failed")?;
    for ticket in &receipt.tickets {
        info!(code = %ticket.code, ticket_type = %ticket.ticket_type, "Ticket issued");
    }

    let replay = services.checkout.checkout(request).await.context("replay failed")?;
    info!(
        replayed = replay.replayed,
        same_payment = replay.payment.id == receipt.payment.id,
        "Attempt replayed"
    );

    let refund = services
        .checkout
        .refund(buyer.id, receipt.payment.id)
        .await
        .context("refund failed")?;
    info!(
        amount = %refund.amount,
        voided = refund.voided,
        restocked = refund.restocked,
        "Refund issued"
    );

    if let Some(rendered) = services.metrics.as_ref().and_then(MetricsServer::render) {
        info!(bytes = rendered.len(), "Metrics snapshot rendered");
    }

    info!("Checkout demo finished");
    Ok(())
}
