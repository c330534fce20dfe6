use std::time::Duration;

use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::config::StripeConfig;
use crate::error::{AppError, Result};
use crate::models::{BillingInterval, Cadence, ItemKind, TargetKind};

type HmacSha256 = Hmac<Sha256>;

/// Bound on every call to the Stripe API. A timed-out session creation is
/// surfaced as a processor error and leaves no local record.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

const DEFAULT_API_BASE: &str = "https://api.stripe.com";

#[derive(Debug, Deserialize)]
struct CreateCheckoutSessionResponse {
    id: String,
    url: String,
}

#[derive(Debug, Deserialize)]
struct StripeCustomer {
    id: String,
}

#[derive(Debug, Deserialize)]
struct CustomerListResponse {
    data: Vec<StripeCustomer>,
}

#[derive(Debug, Deserialize)]
struct StripePrice {
    id: String,
}

/// Context attached to every checkout session as processor-side metadata.
///
/// The webhook reconciler runs in a separate process invocation and must
/// never assume the original request context exists - everything it needs
/// to complete a session is carried here and echoed back on every event.
#[derive(Debug, Clone)]
pub struct CheckoutMetadata {
    pub donor_id: String,
    pub target_kind: TargetKind,
    pub target_id: String,
    pub cadence: Cadence,
    pub item_kind: ItemKind,
    pub interval: Option<BillingInterval>,
}

impl CheckoutMetadata {
    fn form_fields(&self) -> Vec<(String, String)> {
        let mut fields = vec![
            ("metadata[donor_id]".to_string(), self.donor_id.clone()),
            (
                "metadata[target_kind]".to_string(),
                self.target_kind.as_str().to_string(),
            ),
            ("metadata[target_id]".to_string(), self.target_id.clone()),
            (
                "metadata[cadence]".to_string(),
                self.cadence.as_str().to_string(),
            ),
            (
                "metadata[item_kind]".to_string(),
                self.item_kind.as_str().to_string(),
            ),
        ];
        if let Some(interval) = self.interval {
            fields.push((
                "metadata[interval]".to_string(),
                interval.as_str().to_string(),
            ));
        }
        fields
    }
}

#[derive(Debug, Clone)]
pub struct StripeClient {
    client: Client,
    api_base: String,
    secret_key: String,
    webhook_secret: String,
}

impl StripeClient {
    pub fn new(config: &StripeConfig) -> Self {
        Self::with_api_base(config, DEFAULT_API_BASE)
    }

    /// Construct a client against an alternate API base URL.
    pub fn with_api_base(config: &StripeConfig, api_base: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_base: api_base.into(),
            secret_key: config.secret_key.clone(),
            webhook_secret: config.webhook_secret.clone(),
        }
    }

    async fn post_form<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        form: &[(String, String)],
    ) -> Result<T> {
        let response = self
            .client
            .post(url)
            .basic_auth(&self.secret_key, None::<&str>)
            .form(form)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| AppError::Processor(format!("Stripe API error: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Processor(format!(
                "Stripe API error: {}",
                error_text
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Processor(format!("Failed to parse Stripe response: {}", e)))
    }

    /// Create a one-shot checkout session with inline pricing.
    ///
    /// One-time donations have no pre-configured price object; the amount
    /// and target name are carried as `price_data` on the line item.
    pub async fn create_payment_checkout_session(
        &self,
        amount_cents: i64,
        currency: &str,
        target_name: &str,
        metadata: &CheckoutMetadata,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<(String, String)> {
        let mut form = vec![
            ("mode".to_string(), "payment".to_string()),
            ("success_url".to_string(), success_url.to_string()),
            ("cancel_url".to_string(), cancel_url.to_string()),
            (
                "line_items[0][price_data][currency]".to_string(),
                currency.to_string(),
            ),
            (
                "line_items[0][price_data][unit_amount]".to_string(),
                amount_cents.to_string(),
            ),
            (
                "line_items[0][price_data][product_data][name]".to_string(),
                format!("Donation to {}", target_name),
            ),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
        ];
        form.extend(metadata.form_fields());

        let session: CreateCheckoutSessionResponse = self
            .post_form(&format!("{}/v1/checkout/sessions", self.api_base), &form)
            .await?;

        Ok((session.id, session.url))
    }

    /// Create a subscription-mode checkout session for a previously
    /// created recurring price, bound to an existing customer.
    pub async fn create_subscription_checkout_session(
        &self,
        customer_id: &str,
        price_id: &str,
        metadata: &CheckoutMetadata,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<(String, String)> {
        let mut form = vec![
            ("mode".to_string(), "subscription".to_string()),
            ("success_url".to_string(), success_url.to_string()),
            ("cancel_url".to_string(), cancel_url.to_string()),
            ("customer".to_string(), customer_id.to_string()),
            ("line_items[0][price]".to_string(), price_id.to_string()),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
        ];
        form.extend(metadata.form_fields());

        let session: CreateCheckoutSessionResponse = self
            .post_form(&format!("{}/v1/checkout/sessions", self.api_base), &form)
            .await?;

        Ok((session.id, session.url))
    }

    /// Resolve the Stripe customer for a donor email, creating one only
    /// when no customer with that email exists yet. Repeated recurring
    /// donations by the same donor reuse one customer record.
    pub async fn find_or_create_customer(&self, email: &str, name: &str) -> Result<String> {
        let response = self
            .client
            .get(format!("{}/v1/customers", self.api_base))
            .basic_auth(&self.secret_key, None::<&str>)
            .query(&[("email", email), ("limit", "1")])
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| AppError::Processor(format!("Stripe API error: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Processor(format!(
                "Stripe API error: {}",
                error_text
            )));
        }

        let existing: CustomerListResponse = response
            .json()
            .await
            .map_err(|e| AppError::Processor(format!("Failed to parse Stripe response: {}", e)))?;

        if let Some(customer) = existing.data.into_iter().next() {
            return Ok(customer.id);
        }

        let form = vec![
            ("email".to_string(), email.to_string()),
            ("name".to_string(), name.to_string()),
        ];
        let created: StripeCustomer = self
            .post_form(&format!("{}/v1/customers", self.api_base), &form)
            .await?;
        Ok(created.id)
    }

    /// Create a recurring price scoped to a single checkout. Each
    /// checkout gets its own price; prices are never reused across sessions.
    pub async fn create_recurring_price(
        &self,
        amount_cents: i64,
        currency: &str,
        interval: BillingInterval,
        target_name: &str,
    ) -> Result<String> {
        let form = vec![
            ("unit_amount".to_string(), amount_cents.to_string()),
            ("currency".to_string(), currency.to_string()),
            (
                "recurring[interval]".to_string(),
                interval.stripe_interval().to_string(),
            ),
            (
                "product_data[name]".to_string(),
                format!("Recurring donation to {}", target_name),
            ),
        ];
        let price: StripePrice = self
            .post_form(&format!("{}/v1/prices", self.api_base), &form)
            .await?;
        Ok(price.id)
    }

    /// Retrieve a subscription to read its billing-period bounds.
    pub async fn get_subscription(&self, subscription_id: &str) -> Result<StripeSubscription> {
        let response = self
            .client
            .get(format!(
                "{}/v1/subscriptions/{}",
                self.api_base, subscription_id
            ))
            .basic_auth(&self.secret_key, None::<&str>)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| AppError::Processor(format!("Stripe API error: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Processor(format!(
                "Stripe API error: {}",
                error_text
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Processor(format!("Failed to parse Stripe response: {}", e)))
    }

    /// Maximum age of a webhook timestamp before it's rejected (in seconds).
    /// Stripe recommends 300 seconds (5 minutes).
    const WEBHOOK_TIMESTAMP_TOLERANCE_SECS: i64 = 300;

    pub fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> Result<bool> {
        // Stripe signature format: t=timestamp,v1=signature
        let parts: Vec<&str> = signature.split(',').collect();

        let mut timestamp = None;
        let mut sig_v1 = None;

        for part in parts {
            if let Some(t) = part.strip_prefix("t=") {
                timestamp = Some(t);
            } else if let Some(s) = part.strip_prefix("v1=") {
                sig_v1 = Some(s);
            }
        }

        let timestamp_str = timestamp
            .ok_or_else(|| AppError::BadRequest("Invalid signature header format".into()))?;
        let sig_v1 = sig_v1
            .ok_or_else(|| AppError::BadRequest("Invalid signature header format".into()))?;

        // Parse and validate timestamp to prevent replay of captured
        // deliveries. Reject webhooks older than the tolerance window.
        let timestamp: i64 = timestamp_str
            .parse()
            .map_err(|_| AppError::BadRequest("Invalid timestamp in signature header".into()))?;

        let now = chrono::Utc::now().timestamp();
        let age = now - timestamp;

        if age > Self::WEBHOOK_TIMESTAMP_TOLERANCE_SECS {
            tracing::warn!(
                "Stripe webhook rejected: timestamp too old (age={}s, max={}s)",
                age,
                Self::WEBHOOK_TIMESTAMP_TOLERANCE_SECS
            );
            return Ok(false);
        }

        // Also reject timestamps from the future (clock skew tolerance: 60 seconds)
        if age < -60 {
            tracing::warn!(
                "Stripe webhook rejected: timestamp in the future (age={}s)",
                age
            );
            return Ok(false);
        }

        let signed_payload = format!("{}.{}", timestamp_str, String::from_utf8_lossy(payload));

        let mut mac = HmacSha256::new_from_slice(self.webhook_secret.as_bytes())
            .map_err(|_| AppError::Internal("Invalid webhook secret".into()))?;
        mac.update(signed_payload.as_bytes());
        let expected = hex::encode(mac.finalize().into_bytes());

        // Constant-time comparison. The length check is not constant-time,
        // but signature length is not secret (64 hex chars for SHA-256).
        let expected_bytes = expected.as_bytes();
        let provided_bytes = sig_v1.as_bytes();

        if expected_bytes.len() != provided_bytes.len() {
            return Ok(false);
        }

        Ok(expected_bytes.ct_eq(provided_bytes).into())
    }
}

// ============ Webhook event payloads ============

/// Generic Stripe webhook envelope - object is parsed based on event_type.
#[derive(Debug, Deserialize)]
pub struct StripeWebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Debug, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

// ============ checkout.session.completed / expired ============

#[derive(Debug, Deserialize)]
pub struct StripeCheckoutSession {
    pub id: String,
    pub mode: Option<String>, // "payment" or "subscription"
    pub payment_status: Option<String>,
    pub customer: Option<String>,
    pub subscription: Option<String>, // Present for subscription mode
    pub payment_intent: Option<String>,
    pub amount_total: Option<i64>,
    pub currency: Option<String>,
    #[serde(default)]
    pub metadata: SessionMetadata,
}

/// Metadata echoed back by Stripe on every session-related event.
/// All fields optional - sessions created outside this system carry none.
#[derive(Debug, Default, Deserialize)]
pub struct SessionMetadata {
    pub donor_id: Option<String>,
    pub target_kind: Option<String>,
    pub target_id: Option<String>,
    pub cadence: Option<String>,
    pub item_kind: Option<String>,
    pub interval: Option<String>,
}

// ============ customer.subscription.* ============

#[derive(Debug, Deserialize)]
pub struct StripeSubscription {
    pub id: String,
    pub customer: Option<String>,
    pub status: Option<String>,
    pub current_period_start: Option<i64>,
    pub current_period_end: Option<i64>,
}

// ============ payment_intent.payment_failed ============

#[derive(Debug, Deserialize)]
pub struct StripePaymentIntent {
    pub id: String,
}

// ============ invoice.payment_succeeded ============

#[derive(Debug, Deserialize)]
pub struct StripeInvoice {
    pub id: String,
    pub subscription: Option<String>,
    pub billing_reason: Option<String>, // "subscription_create", "subscription_cycle", ...
    pub status: Option<String>,
    pub amount_paid: Option<i64>,
    pub currency: Option<String>,
}
