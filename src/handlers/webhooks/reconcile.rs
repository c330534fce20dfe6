//! State transitions applied by the webhook reconciler.
//!
//! Every function here is safe to re-execute: each computes its effect
//! from current persisted state, and an "already applied" condition is a
//! normal, successful no-op return rather than an error. Downstream side
//! effects (receipt notifications) fire only from the branch that won the
//! guarded transition, so redelivery produces a single observable effect.

use axum::http::StatusCode;
use chrono::Utc;

use crate::db::{queries, AppState};
use crate::models::{BillingInterval, Cadence, CreateSubscription};
use crate::notify::{spawn_receipt, ReceiptEvent};
use crate::payments::{
    StripeCheckoutSession, StripeInvoice, StripePaymentIntent, StripeSubscription,
};

/// Result type for webhook operations. A non-2xx status propagates
/// failure so the processor redelivers on its own backoff schedule.
pub type WebhookResult = (StatusCode, &'static str);

const DB_ERROR: WebhookResult = (StatusCode::INTERNAL_SERVER_ERROR, "Database error");

/// Process a `checkout.session.completed` event.
///
/// The `pending -> completed` transition and the subscription-row insert
/// happen in one database transaction: either both land or neither does,
/// and a retried delivery after a partial failure can still succeed.
pub async fn process_checkout_completed(
    state: &AppState,
    session: StripeCheckoutSession,
) -> WebhookResult {
    let mut conn = match state.db.get() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("DB connection error: {}", e);
            return DB_ERROR;
        }
    };

    let local = match queries::get_payment_session_by_external_id(&conn, &session.id) {
        Ok(Some(s)) => s,
        Ok(None) => {
            // Session created outside this system, or by another deploy.
            // Acknowledge so the processor stops redelivering.
            tracing::warn!("No payment session for external id {}", session.id);
            return (StatusCode::OK, "Unknown session");
        }
        Err(e) => {
            tracing::error!("DB error: {}", e);
            return DB_ERROR;
        }
    };

    if let Some(payment_status) = session.payment_status.as_deref() {
        if payment_status != "paid" && payment_status != "no_payment_required" {
            return (StatusCode::OK, "Checkout not paid");
        }
    }

    let is_subscription =
        session.mode.as_deref() == Some("subscription") || session.subscription.is_some();

    // Billing-period bounds come from the processor when reachable;
    // creation-time defaults (no bounds) otherwise.
    let mut period_start = None;
    let mut period_end = None;
    if let Some(sub_id) = session.subscription.as_deref() {
        match state.stripe.get_subscription(sub_id).await {
            Ok(sub) => {
                period_start = sub.current_period_start;
                period_end = sub.current_period_end;
            }
            Err(e) => {
                tracing::warn!(
                    "Could not fetch subscription {} for period bounds: {}",
                    sub_id,
                    e
                );
            }
        }
    }

    let interval = session
        .metadata
        .interval
        .as_deref()
        .and_then(|s| s.parse::<BillingInterval>().ok())
        .unwrap_or(BillingInterval::Monthly);

    let tx = match conn.transaction() {
        Ok(tx) => tx,
        Err(e) => {
            tracing::error!("Failed to start transaction: {}", e);
            return DB_ERROR;
        }
    };

    // Guarded transition: only one delivery can ever move this session
    // out of pending, no matter how many arrive concurrently.
    let claimed = match queries::try_complete_payment_session(
        &tx,
        &session.id,
        session.payment_intent.as_deref(),
        session.customer.as_deref(),
    ) {
        Ok(claimed) => claimed,
        Err(e) => {
            tracing::error!("Failed to complete payment session: {}", e);
            return DB_ERROR;
        }
    };

    if !claimed {
        return (StatusCode::OK, "Already completed");
    }

    if is_subscription {
        let Some(external_subscription_id) = session.subscription.clone() else {
            // Subscription-mode session without a subscription id is a
            // malformed delivery; dropping the transaction keeps the
            // session pending so a corrected redelivery can complete it.
            tracing::error!(
                "Subscription-mode session {} has no subscription id",
                session.id
            );
            return (StatusCode::BAD_REQUEST, "Missing subscription id");
        };

        let created = queries::insert_subscription_if_absent(
            &tx,
            &CreateSubscription {
                donor_id: local.donor_id.clone(),
                target_kind: local.target_kind,
                target_id: local.target_id.clone(),
                external_subscription_id,
                external_customer_id: session.customer.clone(),
                external_price_id: None,
                amount_cents: local.amount_cents,
                currency: local.currency.clone(),
                interval,
                current_period_start: period_start,
                current_period_end: period_end,
            },
        );
        match created {
            Ok(_) => {}
            Err(e) => {
                // Rolled back on drop; the processor retries the delivery.
                tracing::error!("Failed to create subscription: {}", e);
                return DB_ERROR;
            }
        }
    }

    if let Err(e) = tx.commit() {
        tracing::error!("Failed to commit completion: {}", e);
        return DB_ERROR;
    }

    tracing::info!(
        "Checkout completed: external_session={}, session={}, subscription={:?}",
        session.id,
        local.id,
        session.subscription
    );

    // Fires at most once per external session id - gated on the claim.
    spawn_receipt(
        state.http_client.clone(),
        state.receipt_webhook_url.clone(),
        ReceiptEvent {
            event: if is_subscription {
                "subscription_started".to_string()
            } else {
                "donation_completed".to_string()
            },
            donor_id: local.donor_id.clone(),
            target_kind: local.target_kind.as_str().to_string(),
            target_id: local.target_id.clone(),
            amount_cents: local.amount_cents,
            currency: local.currency.clone(),
            cadence: local.cadence.as_str().to_string(),
            external_reference: session.id.clone(),
            timestamp: Utc::now().timestamp(),
        },
    );

    (StatusCode::OK, "OK")
}

/// Process a `checkout.session.expired` event. Only pending sessions
/// move to expired; anything else is an acknowledged no-op.
pub fn process_session_expired(state: &AppState, session: &StripeCheckoutSession) -> WebhookResult {
    let conn = match state.db.get() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("DB connection error: {}", e);
            return DB_ERROR;
        }
    };

    match queries::mark_session_expired(&conn, &session.id) {
        Ok(true) => {
            tracing::info!("Payment session expired: external_session={}", session.id);
            (StatusCode::OK, "OK")
        }
        Ok(false) => (StatusCode::OK, "Session not pending"),
        Err(e) => {
            tracing::error!("Failed to mark session expired: {}", e);
            DB_ERROR
        }
    }
}

/// Process a `payment_intent.payment_failed` event. Best-effort: a
/// missed lookup (no session recorded this intent) is acknowledged.
pub fn process_payment_failed(state: &AppState, intent: &StripePaymentIntent) -> WebhookResult {
    let conn = match state.db.get() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("DB connection error: {}", e);
            return DB_ERROR;
        }
    };

    match queries::mark_session_failed_by_intent(&conn, &intent.id) {
        Ok(true) => {
            tracing::info!("Payment failed: intent={}", intent.id);
            (StatusCode::OK, "OK")
        }
        Ok(false) => (StatusCode::OK, "No matching session"),
        Err(e) => {
            tracing::error!("Failed to mark session failed: {}", e);
            DB_ERROR
        }
    }
}

/// Process a `customer.subscription.updated` event by refreshing the
/// billing-period bounds. The event can legitimately arrive before the
/// completion event that creates the subscription row; that case is a
/// no-op, not an error, and the row picks up period bounds from the next
/// update once it exists.
pub fn process_subscription_updated(
    state: &AppState,
    subscription: &StripeSubscription,
) -> WebhookResult {
    let conn = match state.db.get() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("DB connection error: {}", e);
            return DB_ERROR;
        }
    };

    match queries::update_subscription_period(
        &conn,
        &subscription.id,
        subscription.current_period_start,
        subscription.current_period_end,
    ) {
        Ok(true) => (StatusCode::OK, "OK"),
        Ok(false) => {
            tracing::debug!(
                "Subscription update for {} before local row exists",
                subscription.id
            );
            (StatusCode::OK, "Subscription not yet recorded")
        }
        Err(e) => {
            tracing::error!("Failed to update subscription period: {}", e);
            DB_ERROR
        }
    }
}

/// Process a `customer.subscription.deleted` event.
pub fn process_subscription_deleted(
    state: &AppState,
    subscription: &StripeSubscription,
) -> WebhookResult {
    let conn = match state.db.get() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("DB connection error: {}", e);
            return DB_ERROR;
        }
    };

    match queries::mark_subscription_cancelled(&conn, &subscription.id) {
        Ok(true) => {
            tracing::info!("Subscription cancelled: external={}", subscription.id);
            (StatusCode::OK, "OK")
        }
        Ok(false) => (StatusCode::OK, "Subscription not found"),
        Err(e) => {
            tracing::error!("Failed to cancel subscription: {}", e);
            DB_ERROR
        }
    }
}

/// Process an `invoice.payment_succeeded` event. Renewal invoices record
/// a completed donation for the billing cycle, keyed by invoice id so a
/// replayed delivery records it once. The initial invoice is handled by
/// checkout completion and skipped here.
pub fn process_invoice_paid(state: &AppState, invoice: &StripeInvoice) -> WebhookResult {
    if let Some(status) = invoice.status.as_deref() {
        if status != "paid" {
            return (StatusCode::OK, "Invoice not paid");
        }
    }

    let Some(external_subscription_id) = invoice.subscription.as_deref() else {
        return (StatusCode::OK, "Not a subscription invoice");
    };

    match invoice.billing_reason.as_deref() {
        Some("subscription_cycle") | Some("subscription_update") => {}
        Some("subscription_create") => {
            return (StatusCode::OK, "Initial cycle handled by checkout");
        }
        _ => return (StatusCode::OK, "Event ignored"),
    }

    let conn = match state.db.get() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("DB connection error: {}", e);
            return DB_ERROR;
        }
    };

    let subscription = match queries::get_subscription_by_external_id(&conn, external_subscription_id)
    {
        Ok(Some(s)) => s,
        Ok(None) => {
            // Cycle invoice raced ahead of the completion event.
            tracing::warn!(
                "Invoice {} for unknown subscription {}",
                invoice.id,
                external_subscription_id
            );
            return (StatusCode::OK, "Subscription not yet recorded");
        }
        Err(e) => {
            tracing::error!("DB error: {}", e);
            return DB_ERROR;
        }
    };

    let amount_cents = invoice.amount_paid.unwrap_or(subscription.amount_cents);
    let currency = invoice
        .currency
        .clone()
        .unwrap_or_else(|| subscription.currency.clone());

    let recorded = match queries::record_cycle_donation(
        &conn,
        &subscription.id,
        &invoice.id,
        amount_cents,
        &currency,
    ) {
        Ok(recorded) => recorded,
        Err(e) => {
            tracing::error!("Failed to record cycle donation: {}", e);
            return DB_ERROR;
        }
    };

    if !recorded {
        return (StatusCode::OK, "Already processed");
    }

    tracing::info!(
        "Billing cycle recorded: subscription={}, invoice={}, amount={} {}",
        subscription.id,
        invoice.id,
        amount_cents,
        currency
    );

    spawn_receipt(
        state.http_client.clone(),
        state.receipt_webhook_url.clone(),
        ReceiptEvent {
            event: "subscription_cycle".to_string(),
            donor_id: subscription.donor_id.clone(),
            target_kind: subscription.target_kind.as_str().to_string(),
            target_id: subscription.target_id.clone(),
            amount_cents,
            currency,
            cadence: Cadence::Recurring.as_str().to_string(),
            external_reference: invoice.id.clone(),
            timestamp: Utc::now().timestamp(),
        },
    );

    (StatusCode::OK, "OK")
}
