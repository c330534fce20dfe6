use serde::{Deserialize, Serialize};

/// Durable record of a received webhook delivery.
///
/// This log exists for observability and debugging only. It is NOT the
/// idempotency mechanism - that is enforced on the domain rows themselves
/// (guarded status transitions and unique external keys). A failed append
/// here must never abort event processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEventRecord {
    pub id: String,
    pub provider: String,
    pub event_id: String,
    pub event_type: String,
    pub payload: String,
    pub created_at: i64,
}
