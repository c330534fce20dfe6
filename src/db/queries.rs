use chrono::Utc;
use rusqlite::{params, Connection};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::Result;
use crate::id::EntityType;
use crate::models::*;

use super::from_row::{
    query_all, query_one, CAMPAIGN_COLS, DONATION_COLS, NGO_COLS, PAYMENT_SESSION_COLS,
    SUBSCRIPTION_COLS, USER_COLS, WEBHOOK_EVENT_COLS,
};

fn now() -> i64 {
    Utc::now().timestamp()
}

/// Generate a new donor bearer token. Only its hash is ever stored.
pub fn generate_api_token() -> String {
    format!("dct_{}", Uuid::new_v4().as_simple())
}

/// SHA-256 hex digest of a bearer token, used as the stored credential.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

// ============ Users ============

pub fn create_user(conn: &Connection, input: &CreateUser, token_hash: &str) -> Result<User> {
    let id = EntityType::User.gen_id();
    let created_at = now();

    conn.execute(
        "INSERT INTO users (id, email, name, api_token_hash, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![&id, &input.email, &input.name, token_hash, created_at],
    )?;

    Ok(User {
        id,
        email: input.email.clone(),
        name: input.name.clone(),
        api_token_hash: token_hash.to_string(),
        created_at,
    })
}

pub fn get_user_by_id(conn: &Connection, id: &str) -> Result<Option<User>> {
    query_one(
        conn,
        &format!("SELECT {} FROM users WHERE id = ?1", USER_COLS),
        &[&id],
    )
}

pub fn get_user_by_token_hash(conn: &Connection, token_hash: &str) -> Result<Option<User>> {
    query_one(
        conn,
        &format!("SELECT {} FROM users WHERE api_token_hash = ?1", USER_COLS),
        &[&token_hash],
    )
}

// ============ Donation Targets ============

pub fn create_ngo(conn: &Connection, name: &str) -> Result<Ngo> {
    let id = EntityType::Ngo.gen_id();
    let created_at = now();
    conn.execute(
        "INSERT INTO ngos (id, name, created_at) VALUES (?1, ?2, ?3)",
        params![&id, name, created_at],
    )?;
    Ok(Ngo {
        id,
        name: name.to_string(),
        created_at,
    })
}

pub fn create_campaign(conn: &Connection, name: &str) -> Result<Campaign> {
    let id = EntityType::Campaign.gen_id();
    let created_at = now();
    conn.execute(
        "INSERT INTO campaigns (id, name, created_at) VALUES (?1, ?2, ?3)",
        params![&id, name, created_at],
    )?;
    Ok(Campaign {
        id,
        name: name.to_string(),
        created_at,
    })
}

pub fn get_ngo_by_id(conn: &Connection, id: &str) -> Result<Option<Ngo>> {
    query_one(
        conn,
        &format!("SELECT {} FROM ngos WHERE id = ?1", NGO_COLS),
        &[&id],
    )
}

pub fn get_campaign_by_id(conn: &Connection, id: &str) -> Result<Option<Campaign>> {
    query_one(
        conn,
        &format!("SELECT {} FROM campaigns WHERE id = ?1", CAMPAIGN_COLS),
        &[&id],
    )
}

/// Resolve a target's display name, verifying existence in one lookup.
pub fn get_target_name(conn: &Connection, kind: TargetKind, id: &str) -> Result<Option<String>> {
    match kind {
        TargetKind::Ngo => Ok(get_ngo_by_id(conn, id)?.map(|n| n.name)),
        TargetKind::Campaign => Ok(get_campaign_by_id(conn, id)?.map(|c| c.name)),
    }
}

// ============ Payment Sessions ============

pub fn create_payment_session(
    conn: &Connection,
    input: &CreatePaymentSession,
) -> Result<PaymentSession> {
    let id = EntityType::PaymentSession.gen_id();
    let created_at = now();

    conn.execute(
        "INSERT INTO payment_sessions
            (id, donor_id, target_kind, target_id, external_session_id, amount_cents,
             currency, cadence, item_kind, status, external_customer_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 'pending', ?10, ?11)",
        params![
            &id,
            &input.donor_id,
            input.target_kind.as_str(),
            &input.target_id,
            &input.external_session_id,
            input.amount_cents,
            &input.currency,
            input.cadence.as_str(),
            input.item_kind.as_str(),
            &input.external_customer_id,
            created_at,
        ],
    )?;

    Ok(PaymentSession {
        id,
        donor_id: input.donor_id.clone(),
        target_kind: input.target_kind,
        target_id: input.target_id.clone(),
        external_session_id: input.external_session_id.clone(),
        amount_cents: input.amount_cents,
        currency: input.currency.clone(),
        cadence: input.cadence,
        item_kind: input.item_kind,
        status: SessionStatus::Pending,
        payment_intent_id: None,
        external_customer_id: input.external_customer_id.clone(),
        created_at,
        completed_at: None,
    })
}

pub fn get_payment_session_by_external_id(
    conn: &Connection,
    external_session_id: &str,
) -> Result<Option<PaymentSession>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM payment_sessions WHERE external_session_id = ?1",
            PAYMENT_SESSION_COLS
        ),
        &[&external_session_id],
    )
}

/// Atomically transition a payment session from `pending` to `completed`,
/// stamping the completion time and attributing the payment intent and
/// customer returned by the processor.
///
/// Compare-and-set on (external_session_id, status): two concurrent
/// deliveries of the same completion event cannot both observe `pending`,
/// so downstream side effects gated on the `true` return fire exactly once.
///
/// Returns:
/// - `Ok(true)` if this call performed the transition
/// - `Ok(false)` if the session was already in a non-pending state
pub fn try_complete_payment_session(
    conn: &Connection,
    external_session_id: &str,
    payment_intent_id: Option<&str>,
    external_customer_id: Option<&str>,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE payment_sessions
         SET status = 'completed',
             completed_at = ?1,
             payment_intent_id = COALESCE(?2, payment_intent_id),
             external_customer_id = COALESCE(?3, external_customer_id)
         WHERE external_session_id = ?4 AND status = 'pending'",
        params![
            now(),
            payment_intent_id,
            external_customer_id,
            external_session_id
        ],
    )?;
    Ok(affected > 0)
}

/// Mark a pending session expired. Non-pending sessions are untouched.
pub fn mark_session_expired(conn: &Connection, external_session_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE payment_sessions SET status = 'expired'
         WHERE external_session_id = ?1 AND status = 'pending'",
        params![external_session_id],
    )?;
    Ok(affected > 0)
}

/// Best-effort failure marking by payment intent. Sessions that never
/// recorded an intent (payment mode fails before completion) simply miss.
pub fn mark_session_failed_by_intent(conn: &Connection, payment_intent_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE payment_sessions SET status = 'failed'
         WHERE payment_intent_id = ?1 AND status = 'pending'",
        params![payment_intent_id],
    )?;
    Ok(affected > 0)
}

// ============ Subscriptions ============

/// Create a subscription row unless one already exists for this external
/// subscription id. INSERT OR IGNORE against the unique key makes the
/// creation idempotent under duplicate completion deliveries.
///
/// Returns true if a new row was inserted.
pub fn insert_subscription_if_absent(
    conn: &Connection,
    input: &CreateSubscription,
) -> Result<bool> {
    let id = EntityType::Subscription.gen_id();
    let affected = conn.execute(
        "INSERT OR IGNORE INTO subscriptions
            (id, donor_id, target_kind, target_id, external_subscription_id,
             external_customer_id, external_price_id, amount_cents, currency,
             interval, status, current_period_start, current_period_end, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 'active', ?11, ?12, ?13)",
        params![
            &id,
            &input.donor_id,
            input.target_kind.as_str(),
            &input.target_id,
            &input.external_subscription_id,
            &input.external_customer_id,
            &input.external_price_id,
            input.amount_cents,
            &input.currency,
            input.interval.as_str(),
            input.current_period_start,
            input.current_period_end,
            now(),
        ],
    )?;
    Ok(affected > 0)
}

pub fn get_subscription_by_external_id(
    conn: &Connection,
    external_subscription_id: &str,
) -> Result<Option<Subscription>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM subscriptions WHERE external_subscription_id = ?1",
            SUBSCRIPTION_COLS
        ),
        &[&external_subscription_id],
    )
}

/// Apply billing-period bounds from a subscription lifecycle event.
/// Returns false when no row exists yet (the update raced ahead of the
/// completion event) - callers treat that as an acknowledged no-op.
pub fn update_subscription_period(
    conn: &Connection,
    external_subscription_id: &str,
    period_start: Option<i64>,
    period_end: Option<i64>,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE subscriptions
         SET current_period_start = COALESCE(?1, current_period_start),
             current_period_end = COALESCE(?2, current_period_end)
         WHERE external_subscription_id = ?3",
        params![period_start, period_end, external_subscription_id],
    )?;
    Ok(affected > 0)
}

pub fn mark_subscription_cancelled(
    conn: &Connection,
    external_subscription_id: &str,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE subscriptions SET status = 'cancelled'
         WHERE external_subscription_id = ?1 AND status = 'active'",
        params![external_subscription_id],
    )?;
    Ok(affected > 0)
}

// ============ Donations (recurring billing cycles) ============

/// Record a completed billing cycle for a subscription, keyed by the
/// external invoice id. INSERT OR IGNORE makes replayed invoice events
/// record the cycle exactly once; returns true on first insert.
pub fn record_cycle_donation(
    conn: &Connection,
    subscription_id: &str,
    external_invoice_id: &str,
    amount_cents: i64,
    currency: &str,
) -> Result<bool> {
    let id = EntityType::Donation.gen_id();
    let affected = conn.execute(
        "INSERT OR IGNORE INTO donations
            (id, subscription_id, external_invoice_id, amount_cents, currency, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            &id,
            subscription_id,
            external_invoice_id,
            amount_cents,
            currency,
            now(),
        ],
    )?;
    Ok(affected > 0)
}

pub fn list_donations_for_subscription(
    conn: &Connection,
    subscription_id: &str,
) -> Result<Vec<Donation>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM donations WHERE subscription_id = ?1 ORDER BY created_at",
            DONATION_COLS
        ),
        &[&subscription_id],
    )
}

pub fn count_donations_for_subscription(conn: &Connection, subscription_id: &str) -> Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM donations WHERE subscription_id = ?1",
        params![subscription_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

// ============ Webhook Event Log ============

/// Append a received event to the durable log. Duplicate deliveries of
/// the same event id are silently skipped (the log keeps one copy).
///
/// This log is observability only; callers must treat append failures as
/// non-fatal and never gate processing on it.
pub fn record_webhook_event(
    conn: &Connection,
    provider: &str,
    event_id: &str,
    event_type: &str,
    payload: &str,
) -> Result<bool> {
    let id = EntityType::WebhookEvent.gen_id();
    let affected = conn.execute(
        "INSERT OR IGNORE INTO webhook_events
            (id, provider, event_id, event_type, payload, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![&id, provider, event_id, event_type, payload, now()],
    )?;
    Ok(affected > 0)
}

pub fn get_webhook_event(
    conn: &Connection,
    provider: &str,
    event_id: &str,
) -> Result<Option<WebhookEventRecord>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM webhook_events WHERE provider = ?1 AND event_id = ?2",
            WEBHOOK_EVENT_COLS
        ),
        &[&provider, &event_id],
    )
}

/// Purge old webhook event log rows beyond the retention period.
/// Payment sessions are never purged - they are the audit trail.
pub fn purge_old_webhook_events(conn: &Connection, retention_days: i64) -> Result<usize> {
    let cutoff = now() - (retention_days * 86400);
    let deleted = conn.execute(
        "DELETE FROM webhook_events WHERE created_at < ?1",
        params![cutoff],
    )?;
    Ok(deleted)
}
