//! Row decoding and error mapping shared by the stores.

use sqlx::Row;
use sqlx::postgres::PgRow;
use ticket_checkout_core::{
    CheckoutError, Currency, Event, EventId, Money, PaymentId, Result, Ticket, TicketCode, TicketStatus,
    TicketTypeRef, TicketTypeStock, UserId,
};
use uuid::Uuid;

/// SQLSTATE raised when `lock_timeout` expires.
const LOCK_NOT_AVAILABLE: &str = "55P03";

/// Map a `sqlx` error into `CheckoutError::Storage`, prefixed with what was being done.
pub(crate) fn storage(context: &'static str) -> impl FnOnce(sqlx::Error) -> CheckoutError {
    move |err| {
        if is_lock_timeout(&err) {
            metrics::counter!("inventory_lock_timeouts_total").increment(1);
            tracing::warn!(context, "Row lock wait exceeded lock_timeout");
        }
        CheckoutError::storage(format!("{context}: {err}"))
    }
}

fn is_lock_timeout(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some(LOCK_NOT_AVAILABLE))
}

pub(crate) fn to_i32(value: u32, column: &str) -> Result<i32> {
    i32::try_from(value).map_err(|_| CheckoutError::storage(format!("{column} {value} exceeds INTEGER")))
}

pub(crate) fn to_i64(value: Money, column: &str) -> Result<i64> {
    i64::try_from(value.cents()).map_err(|_| CheckoutError::storage(format!("{column} {value} exceeds BIGINT")))
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(name)
        .map_err(|err| CheckoutError::storage(format!("decode {name}: {err}")))
}

fn quantity(row: &PgRow, name: &str) -> Result<u32> {
    let value: i32 = column(row, name)?;
    u32::try_from(value).map_err(|_| CheckoutError::storage(format!("{name} is negative: {value}")))
}

fn money(row: &PgRow, name: &str) -> Result<Money> {
    let value: i64 = column(row, name)?;
    u64::try_from(value)
        .map(Money::from_cents)
        .map_err(|_| CheckoutError::storage(format!("{name} is negative: {value}")))
}

fn currency(row: &PgRow, name: &str) -> Result<Currency> {
    let code: String = column(row, name)?;
    Currency::parse(&code).ok_or_else(|| CheckoutError::storage(format!("{name} is not a currency code: {code}")))
}

pub(crate) fn ticket_type_ref(row: &PgRow) -> Result<TicketTypeRef> {
    let event_id: Uuid = column(row, "event_id")?;
    let ticket_type: String = column(row, "ticket_type")?;
    Ok(TicketTypeRef::new(EventId::from_uuid(event_id), ticket_type))
}

pub(crate) fn stock(row: &PgRow) -> Result<TicketTypeStock> {
    Ok(TicketTypeStock {
        ticket_type: ticket_type_ref(row)?,
        unit_price: money(row, "unit_price_cents")?,
        currency: currency(row, "currency")?,
        total_quantity: quantity(row, "total_quantity")?,
        remaining: quantity(row, "remaining")?,
    })
}

pub(crate) fn ticket(row: &PgRow) -> Result<Ticket> {
    let status: String = column(row, "status")?;
    let ticket_type = ticket_type_ref(row)?;
    Ok(Ticket {
        code: TicketCode::from_string(column(row, "code")?),
        owner: UserId::from_uuid(column(row, "owner_id")?),
        event_id: ticket_type.event_id,
        ticket_type,
        payment_id: PaymentId::from_uuid(column(row, "payment_id")?),
        status: TicketStatus::parse(&status)
            .ok_or_else(|| CheckoutError::storage(format!("unknown ticket status: {status}")))?,
        issued_at: column(row, "issued_at")?,
    })
}

pub(crate) fn event(row: &PgRow) -> Result<Event> {
    Ok(Event {
        id: EventId::from_uuid(column(row, "event_id")?),
        name: column(row, "name")?,
        start_time: column(row, "start_time")?,
        end_time: column(row, "end_time")?,
    })
}

pub(crate) fn cart_line(row: &PgRow) -> Result<ticket_checkout_core::CartLine> {
    Ok(ticket_checkout_core::CartLine {
        ticket_type: ticket_type_ref(row)?,
        quantity: quantity(row, "quantity")?,
        unit_price: money(row, "unit_price_cents")?,
        currency: currency(row, "currency")?,
    })
}
