use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::db::{queries, AppState};
use crate::payments::{
    StripeCheckoutSession, StripeInvoice, StripePaymentIntent, StripeSubscription,
    StripeWebhookEvent,
};

use super::reconcile::{self, WebhookResult};

/// Body returned to the processor. `received: true` acknowledges the
/// delivery; anything else makes the processor redeliver on its own
/// backoff schedule.
#[derive(Serialize)]
struct WebhookAck {
    received: bool,
    detail: &'static str,
}

fn ack((status, detail): WebhookResult) -> Response {
    let received = status.is_success();
    (status, Json(WebhookAck { received, detail })).into_response()
}

/// Axum handler for Stripe webhooks.
///
/// Signature verification happens on the raw body before any business
/// content is parsed; an unverifiable payload is rejected outright and
/// causes zero state changes.
pub async fn handle_stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = match headers.get("stripe-signature").and_then(|v| v.to_str().ok()) {
        Some(s) => s,
        None => {
            return ack((StatusCode::BAD_REQUEST, "Missing stripe-signature header"));
        }
    };

    match state.stripe.verify_webhook_signature(&body, signature) {
        Ok(true) => {}
        Ok(false) => return ack((StatusCode::BAD_REQUEST, "Invalid signature")),
        Err(e) => {
            tracing::warn!("Malformed Stripe signature header: {}", e);
            return ack((StatusCode::BAD_REQUEST, "Invalid signature header"));
        }
    }

    let event: StripeWebhookEvent = match serde_json::from_slice(&body) {
        Ok(e) => e,
        Err(e) => {
            tracing::error!("Failed to parse Stripe webhook: {}", e);
            return ack((StatusCode::BAD_REQUEST, "Invalid JSON"));
        }
    };

    // Durable event log, best-effort: a failed append must never abort
    // reconciliation. Idempotency is enforced on the domain rows, not here.
    match state.db.get() {
        Ok(conn) => {
            if let Err(e) = queries::record_webhook_event(
                &conn,
                "stripe",
                &event.id,
                &event.event_type,
                &String::from_utf8_lossy(&body),
            ) {
                tracing::warn!("Failed to log webhook event {}: {}", event.id, e);
            }
        }
        Err(e) => {
            tracing::warn!("Failed to get connection for webhook event log: {}", e);
        }
    }

    let result = dispatch(&state, &event).await;
    ack(result)
}

async fn dispatch(state: &AppState, event: &StripeWebhookEvent) -> WebhookResult {
    match event.event_type.as_str() {
        "checkout.session.completed" => {
            match parse_object::<StripeCheckoutSession>(event, "checkout session") {
                Ok(session) => reconcile::process_checkout_completed(state, session).await,
                Err(e) => e,
            }
        }
        "checkout.session.expired" => {
            match parse_object::<StripeCheckoutSession>(event, "checkout session") {
                Ok(session) => reconcile::process_session_expired(state, &session),
                Err(e) => e,
            }
        }
        "payment_intent.payment_failed" => {
            match parse_object::<StripePaymentIntent>(event, "payment intent") {
                Ok(intent) => reconcile::process_payment_failed(state, &intent),
                Err(e) => e,
            }
        }
        "customer.subscription.updated" => {
            match parse_object::<StripeSubscription>(event, "subscription") {
                Ok(subscription) => reconcile::process_subscription_updated(state, &subscription),
                Err(e) => e,
            }
        }
        "customer.subscription.deleted" => {
            match parse_object::<StripeSubscription>(event, "subscription") {
                Ok(subscription) => reconcile::process_subscription_deleted(state, &subscription),
                Err(e) => e,
            }
        }
        "invoice.payment_succeeded" => match parse_object::<StripeInvoice>(event, "invoice") {
            Ok(invoice) => reconcile::process_invoice_paid(state, &invoice),
            Err(e) => e,
        },
        other => {
            tracing::debug!("Ignoring Stripe event type: {}", other);
            (StatusCode::OK, "Event ignored")
        }
    }
}

fn parse_object<T: serde::de::DeserializeOwned>(
    event: &StripeWebhookEvent,
    what: &str,
) -> Result<T, WebhookResult> {
    serde_json::from_value(event.data.object.clone()).map_err(|e| {
        tracing::error!("Failed to parse {}: {}", what, e);
        (StatusCode::BAD_REQUEST, "Invalid event object")
    })
}
