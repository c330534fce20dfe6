use serde::{Deserialize, Serialize};

/// A completed billing cycle attributed to a subscription, written when
/// an `invoice.payment_succeeded` event arrives for a renewal. Keyed by
/// the external invoice id so replayed deliveries record a cycle once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Donation {
    pub id: String,
    pub subscription_id: String,
    pub external_invoice_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub created_at: i64,
}
