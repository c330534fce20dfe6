//! Test utilities and fixtures for DonorConnect integration tests

#![allow(dead_code)]

use axum::Router;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

pub use donorconnect::config::{DonationLimits, StripeConfig};
pub use donorconnect::db::{init_db, queries, AppState};
pub use donorconnect::models::*;
pub use donorconnect::payments::StripeClient;

/// Webhook signing secret shared by all test fixtures.
pub const TEST_WEBHOOK_SECRET: &str = "whsec_test_secret";

pub fn test_stripe_config() -> StripeConfig {
    StripeConfig {
        secret_key: "sk_test_xxx".to_string(),
        webhook_secret: TEST_WEBHOOK_SECRET.to_string(),
    }
}

/// A Stripe client pointed at an unroutable address: any accidental API
/// call in a test fails fast instead of reaching the network.
pub fn test_stripe_client() -> StripeClient {
    StripeClient::with_api_base(&test_stripe_config(), "http://127.0.0.1:9")
}

/// Create an in-memory test database with schema initialized
pub fn setup_test_db() -> Connection {
    let conn = Connection::open_in_memory().expect("Failed to create in-memory database");
    init_db(&conn).expect("Failed to initialize schema");
    conn
}

/// Create an AppState backed by a single-connection in-memory pool.
/// One connection keeps every pooled checkout looking at the same data.
pub fn create_test_app_state() -> AppState {
    let manager = SqliteConnectionManager::memory();
    let pool = Pool::builder().max_size(1).build(manager).unwrap();
    {
        let conn = pool.get().unwrap();
        init_db(&conn).unwrap();
    }

    AppState {
        db: pool,
        stripe: test_stripe_client(),
        http_client: reqwest::Client::new(),
        base_url: "http://localhost:3000".to_string(),
        success_page_url: "http://localhost:3000/donate/success".to_string(),
        cancel_page_url: "http://localhost:3000/donate/cancel".to_string(),
        receipt_webhook_url: None,
        limits: DonationLimits {
            min_cents: 100,
            max_cents: 10_000_000,
        },
    }
}

/// Router with the public donation endpoints
pub fn donate_app(state: AppState) -> Router {
    donorconnect::handlers::donate::router().with_state(state)
}

/// Router with the webhook endpoint
pub fn webhook_app(state: AppState) -> Router {
    donorconnect::handlers::webhooks::router().with_state(state)
}

/// Create a test donor, returning the entity and its raw bearer token
pub fn create_test_donor(conn: &Connection, email: &str) -> (User, String) {
    let token = queries::generate_api_token();
    let user = queries::create_user(
        conn,
        &CreateUser {
            email: email.to_string(),
            name: format!("Test Donor {}", email),
        },
        &queries::hash_token(&token),
    )
    .expect("Failed to create test donor");
    (user, token)
}

pub fn create_test_ngo(conn: &Connection, name: &str) -> Ngo {
    queries::create_ngo(conn, name).expect("Failed to create test NGO")
}

pub fn create_test_campaign(conn: &Connection, name: &str) -> Campaign {
    queries::create_campaign(conn, name).expect("Failed to create test campaign")
}

/// Create a pending payment session for a donor/target pair
pub fn create_test_session(
    conn: &Connection,
    donor_id: &str,
    target_kind: TargetKind,
    target_id: &str,
    external_session_id: &str,
    amount_cents: i64,
    cadence: Cadence,
) -> PaymentSession {
    queries::create_payment_session(
        conn,
        &CreatePaymentSession {
            donor_id: donor_id.to_string(),
            target_kind,
            target_id: target_id.to_string(),
            external_session_id: external_session_id.to_string(),
            amount_cents,
            currency: "usd".to_string(),
            cadence,
            item_kind: ItemKind::Money,
            external_customer_id: None,
        },
    )
    .expect("Failed to create test payment session")
}

/// Create a subscription row directly (for invoice/update event tests)
pub fn create_test_subscription(
    conn: &Connection,
    donor_id: &str,
    target_kind: TargetKind,
    target_id: &str,
    external_subscription_id: &str,
    amount_cents: i64,
) -> Subscription {
    let created = queries::insert_subscription_if_absent(
        conn,
        &CreateSubscription {
            donor_id: donor_id.to_string(),
            target_kind,
            target_id: target_id.to_string(),
            external_subscription_id: external_subscription_id.to_string(),
            external_customer_id: Some("cus_test".to_string()),
            external_price_id: None,
            amount_cents,
            currency: "usd".to_string(),
            interval: BillingInterval::Monthly,
            current_period_start: None,
            current_period_end: None,
        },
    )
    .expect("Failed to create test subscription");
    assert!(created, "Test subscription should be newly inserted");
    queries::get_subscription_by_external_id(conn, external_subscription_id)
        .expect("Query should succeed")
        .expect("Subscription should exist")
}

/// Get the current timestamp
pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Compute a valid Stripe signature header for a payload
pub fn sign_stripe_payload(payload: &[u8], secret: &str) -> String {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    type HmacSha256 = Hmac<Sha256>;

    let timestamp = now().to_string();
    let signed_payload = format!("{}.{}", timestamp, String::from_utf8_lossy(payload));
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(signed_payload.as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());
    format!("t={},v1={}", timestamp, signature)
}

/// POST a signed webhook payload through the router, returning the
/// response status and parsed JSON body.
pub async fn deliver_webhook(
    app: Router,
    payload: &serde_json::Value,
) -> (axum::http::StatusCode, serde_json::Value) {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    let body = serde_json::to_vec(payload).unwrap();
    let signature = sign_stripe_payload(&body, TEST_WEBHOOK_SECRET);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook/stripe")
                .header("stripe-signature", signature)
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value =
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}
