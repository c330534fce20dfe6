use serde::{Deserialize, Serialize};

use super::TargetKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingInterval {
    Monthly,
    Yearly,
}

impl BillingInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        }
    }

    /// The interval keyword Stripe expects on recurring prices.
    pub fn stripe_interval(&self) -> &'static str {
        match self {
            Self::Monthly => "month",
            Self::Yearly => "year",
        }
    }
}

impl std::str::FromStr for BillingInterval {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monthly" => Ok(Self::Monthly),
            "yearly" => Ok(Self::Yearly),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for BillingInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Cancelled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for SubscriptionStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(()),
        }
    }
}

/// An ongoing recurring-donation agreement. Created exactly once per
/// external subscription id by the webhook reconciler, on the first
/// successful completion event for a subscription-mode session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub donor_id: String,
    pub target_kind: TargetKind,
    pub target_id: String,
    pub external_subscription_id: String,
    pub external_customer_id: Option<String>,
    pub external_price_id: Option<String>,
    pub amount_cents: i64,
    pub currency: String,
    pub interval: BillingInterval,
    pub status: SubscriptionStatus,
    pub current_period_start: Option<i64>,
    pub current_period_end: Option<i64>,
    pub created_at: i64,
}

/// Data required to create a subscription row. Insertion is keyed on
/// `external_subscription_id` with INSERT OR IGNORE, so duplicate
/// completion deliveries cannot create a second row.
#[derive(Debug, Clone)]
pub struct CreateSubscription {
    pub donor_id: String,
    pub target_kind: TargetKind,
    pub target_id: String,
    pub external_subscription_id: String,
    pub external_customer_id: Option<String>,
    pub external_price_id: Option<String>,
    pub amount_cents: i64,
    pub currency: String,
    pub interval: BillingInterval,
    pub current_period_start: Option<i64>,
    pub current_period_end: Option<i64>,
}
