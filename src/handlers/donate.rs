use axum::{
    extract::State,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};

use crate::db::{queries, AppState};
use crate::error::{AppError, OptionExt, Result};
use crate::extractors::{Donor, Json, Query};
use crate::models::{
    BillingInterval, Cadence, CreatePaymentSession, ItemKind, SessionStatus, TargetKind,
};
use crate::payments::CheckoutMetadata;

/// A donation checkout request. `amount` is in minor currency units.
#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub amount: i64,
    pub target_type: TargetKind,
    pub target_id: String,
    /// Display name shown on the processor's checkout page. Falls back to
    /// the stored target name when omitted.
    #[serde(default)]
    pub target_name: Option<String>,
    pub donation_type: Cadence,
    pub item_type: ItemKind,
    /// Billing interval for recurring donations. Defaults to monthly.
    #[serde(default)]
    pub interval: Option<BillingInterval>,
    /// ISO 4217 code, lowercase. Defaults to "usd".
    #[serde(default)]
    pub currency: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub session_id: String,
    pub external_session_id: String,
    pub redirect_url: String,
}

/// Initiate a donation checkout: create the processor-side session first,
/// then persist the local pending record carrying its identifier.
///
/// The ordering is load-bearing. The external call is not compensable
/// from inside this process, so it happens first and the local record
/// captures its result. If the local persist fails afterwards, the
/// response is a reconciliation-gap error (logged with the orphaned
/// external session id) - never a silent success and never an automatic
/// retry, which would mint a second external session.
pub async fn initiate_checkout(
    State(state): State<AppState>,
    Donor(donor): Donor,
    Json(request): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>> {
    if request.item_type != ItemKind::Money {
        return Err(AppError::BadRequest(
            "Only money donations go through checkout".into(),
        ));
    }

    if request.amount <= 0 || request.amount < state.limits.min_cents {
        return Err(AppError::InvalidAmount(format!(
            "Amount must be at least {} minor units",
            state.limits.min_cents
        )));
    }
    if request.amount > state.limits.max_cents {
        return Err(AppError::InvalidAmount(format!(
            "Amount must not exceed {} minor units",
            state.limits.max_cents
        )));
    }

    let conn = state.db.get()?;

    // Target must exist before any external call - a rejected request
    // leaves no trace on either side.
    let stored_name = queries::get_target_name(&conn, request.target_type, &request.target_id)?
        .or_target_not_found(&request.target_id)?;
    let target_name = request.target_name.clone().unwrap_or(stored_name);

    let currency = request
        .currency
        .clone()
        .unwrap_or_else(|| "usd".to_string());
    let interval = request.interval.unwrap_or(BillingInterval::Monthly);

    let metadata = CheckoutMetadata {
        donor_id: donor.id.clone(),
        target_kind: request.target_type,
        target_id: request.target_id.clone(),
        cadence: request.donation_type,
        item_kind: request.item_type,
        interval: match request.donation_type {
            Cadence::Recurring => Some(interval),
            Cadence::OneTime => None,
        },
    };

    // The processor substitutes its session id into the success URL so
    // the redirect-driven success page can poll GET /donate/session.
    let success_url = format!("{}?session={{CHECKOUT_SESSION_ID}}", state.success_page_url);
    let cancel_url = state.cancel_page_url.clone();

    let (external_session_id, redirect_url, external_customer_id) = match request.donation_type {
        Cadence::OneTime => {
            let (id, url) = state
                .stripe
                .create_payment_checkout_session(
                    request.amount,
                    &currency,
                    &target_name,
                    &metadata,
                    &success_url,
                    &cancel_url,
                )
                .await?;
            (id, url, None)
        }
        Cadence::Recurring => {
            // Customer is resolved by email before creating, so repeated
            // recurring donations by one donor share a customer record.
            let customer_id = state
                .stripe
                .find_or_create_customer(&donor.email, &donor.name)
                .await?;
            let price_id = state
                .stripe
                .create_recurring_price(request.amount, &currency, interval, &target_name)
                .await?;
            let (id, url) = state
                .stripe
                .create_subscription_checkout_session(
                    &customer_id,
                    &price_id,
                    &metadata,
                    &success_url,
                    &cancel_url,
                )
                .await?;
            (id, url, Some(customer_id))
        }
    };

    let session = queries::create_payment_session(
        &conn,
        &CreatePaymentSession {
            donor_id: donor.id.clone(),
            target_kind: request.target_type,
            target_id: request.target_id.clone(),
            external_session_id: external_session_id.clone(),
            amount_cents: request.amount,
            currency,
            cadence: request.donation_type,
            item_kind: request.item_type,
            external_customer_id,
        },
    )
    .map_err(|e| match e {
        AppError::Database(source) => AppError::ReconciliationGap {
            external_session_id: external_session_id.clone(),
            source,
        },
        other => other,
    })?;

    Ok(Json(CheckoutResponse {
        session_id: session.id,
        external_session_id,
        redirect_url,
    }))
}

#[derive(Debug, Deserialize)]
pub struct SessionStatusQuery {
    /// External checkout session id, as substituted into the success URL.
    pub session: String,
}

#[derive(Debug, Serialize)]
pub struct SessionStatusResponse {
    pub session_id: String,
    pub status: SessionStatus,
    pub amount_cents: i64,
    pub currency: String,
    pub cadence: Cadence,
    pub completed_at: Option<i64>,
}

/// Read-only status view for the redirect-driven success page. The page
/// never blocks on webhook completion - a still-pending session is a
/// normal response here.
pub async fn session_status(
    State(state): State<AppState>,
    Query(query): Query<SessionStatusQuery>,
) -> Result<Json<SessionStatusResponse>> {
    let conn = state.db.get()?;

    let session = queries::get_payment_session_by_external_id(&conn, &query.session)?
        .or_not_found("Payment session")?;

    Ok(Json(SessionStatusResponse {
        session_id: session.id,
        status: session.status,
        amount_cents: session.amount_cents,
        currency: session.currency,
        cadence: session.cadence,
        completed_at: session.completed_at,
    }))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/donate/checkout", post(initiate_checkout))
        .route("/donate/session", get(session_status))
}
