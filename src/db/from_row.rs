//! Row mapping trait and helpers for reducing boilerplate in queries.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::*;

/// Parse a string column into an enum type, converting parse errors to
/// rusqlite errors instead of panicking on corrupted data.
fn parse_enum<T: std::str::FromStr>(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<T> {
    row.get::<_, String>(col)?.parse::<T>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

/// Trait for constructing a type from a database row.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Query for a single optional result.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

/// Query for multiple results.
pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============ SQL SELECT Constants ============

pub const USER_COLS: &str = "id, email, name, api_token_hash, created_at";

pub const NGO_COLS: &str = "id, name, created_at";

pub const CAMPAIGN_COLS: &str = "id, name, created_at";

pub const PAYMENT_SESSION_COLS: &str = "id, donor_id, target_kind, target_id, external_session_id, amount_cents, currency, cadence, item_kind, status, payment_intent_id, external_customer_id, created_at, completed_at";

pub const SUBSCRIPTION_COLS: &str = "id, donor_id, target_kind, target_id, external_subscription_id, external_customer_id, external_price_id, amount_cents, currency, interval, status, current_period_start, current_period_end, created_at";

pub const DONATION_COLS: &str =
    "id, subscription_id, external_invoice_id, amount_cents, currency, created_at";

pub const WEBHOOK_EVENT_COLS: &str = "id, provider, event_id, event_type, payload, created_at";

// ============ FromRow Implementations ============

impl FromRow for User {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(User {
            id: row.get(0)?,
            email: row.get(1)?,
            name: row.get(2)?,
            api_token_hash: row.get(3)?,
            created_at: row.get(4)?,
        })
    }
}

impl FromRow for Ngo {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Ngo {
            id: row.get(0)?,
            name: row.get(1)?,
            created_at: row.get(2)?,
        })
    }
}

impl FromRow for Campaign {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Campaign {
            id: row.get(0)?,
            name: row.get(1)?,
            created_at: row.get(2)?,
        })
    }
}

impl FromRow for PaymentSession {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(PaymentSession {
            id: row.get(0)?,
            donor_id: row.get(1)?,
            target_kind: parse_enum(row, 2, "target_kind")?,
            target_id: row.get(3)?,
            external_session_id: row.get(4)?,
            amount_cents: row.get(5)?,
            currency: row.get(6)?,
            cadence: parse_enum(row, 7, "cadence")?,
            item_kind: parse_enum(row, 8, "item_kind")?,
            status: parse_enum(row, 9, "status")?,
            payment_intent_id: row.get(10)?,
            external_customer_id: row.get(11)?,
            created_at: row.get(12)?,
            completed_at: row.get(13)?,
        })
    }
}

impl FromRow for Subscription {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Subscription {
            id: row.get(0)?,
            donor_id: row.get(1)?,
            target_kind: parse_enum(row, 2, "target_kind")?,
            target_id: row.get(3)?,
            external_subscription_id: row.get(4)?,
            external_customer_id: row.get(5)?,
            external_price_id: row.get(6)?,
            amount_cents: row.get(7)?,
            currency: row.get(8)?,
            interval: parse_enum(row, 9, "interval")?,
            status: parse_enum(row, 10, "status")?,
            current_period_start: row.get(11)?,
            current_period_end: row.get(12)?,
            created_at: row.get(13)?,
        })
    }
}

impl FromRow for Donation {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Donation {
            id: row.get(0)?,
            subscription_id: row.get(1)?,
            external_invoice_id: row.get(2)?,
            amount_cents: row.get(3)?,
            currency: row.get(4)?,
            created_at: row.get(5)?,
        })
    }
}

impl FromRow for WebhookEventRecord {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(WebhookEventRecord {
            id: row.get(0)?,
            provider: row.get(1)?,
            event_id: row.get(2)?,
            event_type: row.get(3)?,
            payload: row.get(4)?,
            created_at: row.get(5)?,
        })
    }
}
