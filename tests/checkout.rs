//! Tests for the POST /donate/checkout endpoint validation logic.
//!
//! These cover the rejections that happen before any payment processor
//! API call - a rejected request must leave no local record and make no
//! external call. The full happy path requires the live processor and is
//! exercised against its test environment, not here.

use axum::{body::Body, http::Request};
use serde_json::{json, Value};
use tower::ServiceExt;

mod common;
use common::*;

async fn post_checkout(
    app: axum::Router,
    token: Option<&str>,
    body: &Value,
) -> (axum::http::StatusCode, Value) {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/donate/checkout")
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }

    let response = app
        .oneshot(
            builder
                .body(Body::from(serde_json::to_string(body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

fn session_count(state: &AppState) -> i64 {
    let conn = state.db.get().unwrap();
    conn.query_row("SELECT COUNT(*) FROM payment_sessions", [], |row| {
        row.get(0)
    })
    .unwrap()
}

#[tokio::test]
async fn test_checkout_requires_authentication() {
    let state = create_test_app_state();
    let body = json!({
        "amount": 500,
        "target_type": "ngo",
        "target_id": "dc_ngo_x",
        "donation_type": "one_time",
        "item_type": "money"
    });

    let (status, _) = post_checkout(donate_app(state.clone()), None, &body).await;
    assert_eq!(status, axum::http::StatusCode::UNAUTHORIZED);
    assert_eq!(session_count(&state), 0);
}

#[tokio::test]
async fn test_checkout_rejects_bad_token() {
    let state = create_test_app_state();
    let body = json!({
        "amount": 500,
        "target_type": "ngo",
        "target_id": "dc_ngo_x",
        "donation_type": "one_time",
        "item_type": "money"
    });

    let (status, _) =
        post_checkout(donate_app(state.clone()), Some("dct_not_a_real_token"), &body).await;
    assert_eq!(status, axum::http::StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_checkout_rejects_zero_and_negative_amounts() {
    let state = create_test_app_state();
    let (ngo_id, token) = {
        let conn = state.db.get().unwrap();
        let (_, token) = create_test_donor(&conn, "donor@example.com");
        let ngo = create_test_ngo(&conn, "Helping Hands");
        (ngo.id, token)
    };

    for amount in [0, -500] {
        let body = json!({
            "amount": amount,
            "target_type": "ngo",
            "target_id": ngo_id,
            "donation_type": "one_time",
            "item_type": "money"
        });

        let (status, json) = post_checkout(donate_app(state.clone()), Some(&token), &body).await;
        assert_eq!(
            status,
            axum::http::StatusCode::BAD_REQUEST,
            "Amount {} must be rejected",
            amount
        );
        assert_eq!(json["error"], "Invalid amount");
    }

    assert_eq!(session_count(&state), 0, "No local record on rejection");
}

#[tokio::test]
async fn test_checkout_rejects_amount_below_minimum() {
    let state = create_test_app_state();
    let (ngo_id, token) = {
        let conn = state.db.get().unwrap();
        let (_, token) = create_test_donor(&conn, "donor@example.com");
        let ngo = create_test_ngo(&conn, "Helping Hands");
        (ngo.id, token)
    };

    // Test limits: min 100
    let body = json!({
        "amount": 50,
        "target_type": "ngo",
        "target_id": ngo_id,
        "donation_type": "one_time",
        "item_type": "money"
    });

    let (status, _) = post_checkout(donate_app(state.clone()), Some(&token), &body).await;
    assert_eq!(status, axum::http::StatusCode::BAD_REQUEST);
    assert_eq!(session_count(&state), 0);
}

#[tokio::test]
async fn test_checkout_rejects_amount_above_maximum() {
    let state = create_test_app_state();
    let (ngo_id, token) = {
        let conn = state.db.get().unwrap();
        let (_, token) = create_test_donor(&conn, "donor@example.com");
        let ngo = create_test_ngo(&conn, "Helping Hands");
        (ngo.id, token)
    };

    // Test limits: max 10_000_000
    let body = json!({
        "amount": 10_000_001i64,
        "target_type": "ngo",
        "target_id": ngo_id,
        "donation_type": "one_time",
        "item_type": "money"
    });

    let (status, json) = post_checkout(donate_app(state.clone()), Some(&token), &body).await;
    assert_eq!(status, axum::http::StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Invalid amount");
    assert_eq!(session_count(&state), 0);
}

#[tokio::test]
async fn test_checkout_rejects_unknown_target() {
    let state = create_test_app_state();
    let token = {
        let conn = state.db.get().unwrap();
        let (_, token) = create_test_donor(&conn, "donor@example.com");
        token
    };

    let body = json!({
        "amount": 500,
        "target_type": "campaign",
        "target_id": "dc_camp_00000000000000000000000000000000",
        "donation_type": "one_time",
        "item_type": "money"
    });

    let (status, json) = post_checkout(donate_app(state.clone()), Some(&token), &body).await;
    assert_eq!(status, axum::http::StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "Donation target not found");
    assert_eq!(session_count(&state), 0);
}

#[tokio::test]
async fn test_checkout_rejects_in_kind_items() {
    let state = create_test_app_state();
    let (ngo_id, token) = {
        let conn = state.db.get().unwrap();
        let (_, token) = create_test_donor(&conn, "donor@example.com");
        let ngo = create_test_ngo(&conn, "Helping Hands");
        (ngo.id, token)
    };

    let body = json!({
        "amount": 500,
        "target_type": "ngo",
        "target_id": ngo_id,
        "donation_type": "one_time",
        "item_type": "goods"
    });

    let (status, _) = post_checkout(donate_app(state.clone()), Some(&token), &body).await;
    assert_eq!(status, axum::http::StatusCode::BAD_REQUEST);
    assert_eq!(session_count(&state), 0);
}

#[tokio::test]
async fn test_checkout_rejects_invalid_body() {
    let state = create_test_app_state();
    let token = {
        let conn = state.db.get().unwrap();
        let (_, token) = create_test_donor(&conn, "donor@example.com");
        token
    };

    let body = json!({
        "amount": "five hundred",
        "target_type": "ngo",
        "target_id": "dc_ngo_x",
        "donation_type": "one_time",
        "item_type": "money"
    });

    let (status, _) = post_checkout(donate_app(state.clone()), Some(&token), &body).await;
    assert_eq!(status, axum::http::StatusCode::BAD_REQUEST);
}

// ============ GET /donate/session ============

#[tokio::test]
async fn test_session_status_returns_pending_session() {
    let state = create_test_app_state();
    {
        let conn = state.db.get().unwrap();
        let (donor, _) = create_test_donor(&conn, "donor@example.com");
        let ngo = create_test_ngo(&conn, "Helping Hands");
        create_test_session(
            &conn,
            &donor.id,
            TargetKind::Ngo,
            &ngo.id,
            "cs_test_status",
            500,
            Cadence::OneTime,
        );
    }

    let response = donate_app(state)
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/donate/session?session=cs_test_status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), axum::http::StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["status"], "pending");
    assert_eq!(json["amount_cents"], 500);
    assert_eq!(json["cadence"], "one_time");
}

#[tokio::test]
async fn test_session_status_unknown_session_is_404() {
    let state = create_test_app_state();

    let response = donate_app(state)
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/donate/session?session=cs_nope")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), axum::http::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health_endpoint() {
    let state = create_test_app_state();

    let response = donate_app(state)
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), axum::http::StatusCode::OK);
}
