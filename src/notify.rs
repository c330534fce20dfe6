//! Receipt/notification webhook support.
//!
//! When configured via `RECEIPT_WEBHOOK_URL`, DonorConnect emits a receipt
//! event after a donation completes. Delivery is fire-and-forget: the
//! completion transition never waits on it and never rolls back if it
//! fails. Exactly-once emission is the caller's responsibility - receipts
//! are fired only from the branch that won the guarded state transition.

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use reqwest::Client;
use serde::Serialize;

/// Retry delays in milliseconds for receipt webhooks.
/// Quick retries (100ms, 200ms) so a flaky receiver doesn't pile up tasks.
const RECEIPT_RETRY_DELAYS: &[u64] = &[100, 200];

/// Receipt event payload emitted after a completed donation.
#[derive(Debug, Clone, Serialize)]
pub struct ReceiptEvent {
    /// Event type: "donation_completed", "subscription_started",
    /// "subscription_cycle"
    pub event: String,
    pub donor_id: String,
    pub target_kind: String,
    pub target_id: String,
    /// Amount in minor currency units.
    pub amount_cents: i64,
    pub currency: String,
    /// "one_time" or "recurring"
    pub cadence: String,
    /// External reference for the receipt: checkout session id for
    /// one-time donations, invoice id for billing cycles.
    pub external_reference: String,
    /// Unix timestamp
    pub timestamp: i64,
}

/// Spawn a fire-and-forget receipt notification.
///
/// If no receipt webhook is configured, this is a no-op. The event is
/// sent in a background task; failures are logged and don't affect the
/// caller. Panics in the spawned task are logged rather than swallowed.
pub fn spawn_receipt(client: Client, receipt_url: Option<String>, event: ReceiptEvent) {
    if let Some(url) = receipt_url {
        let event_type = event.event.clone();
        tokio::spawn(
            AssertUnwindSafe(async move {
                send_receipt(&client, &url, &event).await;
            })
            .catch_unwind()
            .map(move |result| {
                if let Err(panic) = result {
                    let panic_msg = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    tracing::error!(
                        "Receipt task panicked for event '{}': {}",
                        event_type,
                        panic_msg
                    );
                }
            }),
        );
    }
}

/// Send a receipt event to the configured webhook URL with quick retries.
async fn send_receipt(client: &Client, url: &str, event: &ReceiptEvent) {
    for (attempt, delay_ms) in std::iter::once(&0u64)
        .chain(RECEIPT_RETRY_DELAYS.iter())
        .enumerate()
    {
        if attempt > 0 {
            tokio::time::sleep(Duration::from_millis(*delay_ms)).await;
        }

        match client
            .post(url)
            .json(event)
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => {
                if attempt > 0 {
                    tracing::debug!("Receipt webhook succeeded after {} retries", attempt);
                }
                return;
            }
            Ok(resp) => {
                tracing::debug!("Receipt webhook returned {}", resp.status());
            }
            Err(e) => {
                tracing::debug!("Receipt webhook failed: {}", e);
            }
        }
    }

    tracing::warn!(
        "Receipt webhook failed after {} attempts",
        RECEIPT_RETRY_DELAYS.len() + 1
    );
}
