use serde::{Deserialize, Serialize};

use super::{DonationTarget, TargetKind};

/// Lifecycle of a payment session.
///
/// `Pending` is the only state a session is ever created in. The
/// `Pending -> Completed` transition is a guarded compare-and-set in the
/// database (see `queries::try_complete_payment_session`) so that exactly
/// one completion can ever take effect per external session id. Sessions
/// are never deleted - the table is an append-only audit trail of
/// collection attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Completed,
    Expired,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Expired => "expired",
            Self::Failed => "failed",
        }
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "expired" => Ok(Self::Expired),
            "failed" => Ok(Self::Failed),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether a donation is collected once or on a recurring schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cadence {
    OneTime,
    Recurring,
}

impl Cadence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneTime => "one_time",
            Self::Recurring => "recurring",
        }
    }
}

impl std::str::FromStr for Cadence {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "one_time" => Ok(Self::OneTime),
            "recurring" => Ok(Self::Recurring),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for Cadence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What is being donated. Only `Money` flows through checkout; in-kind
/// donations are coordinated elsewhere and never reach the processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Money,
    Goods,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Money => "money",
            Self::Goods => "goods",
        }
    }
}

impl std::str::FromStr for ItemKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "money" => Ok(Self::Money),
            "goods" => Ok(Self::Goods),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One attempt to collect a money donation. Created in `pending` state at
/// the same logical moment the external checkout session is created, and
/// mutated only by the webhook reconciler afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSession {
    pub id: String,
    pub donor_id: String,
    pub target_kind: TargetKind,
    pub target_id: String,
    /// Opaque identifier issued by the payment processor (`cs_...`).
    pub external_session_id: String,
    /// Amount in minor currency units. Currency never touches floats.
    pub amount_cents: i64,
    pub currency: String,
    pub cadence: Cadence,
    pub item_kind: ItemKind,
    pub status: SessionStatus,
    /// Set by the reconciler when the completion event arrives.
    pub payment_intent_id: Option<String>,
    pub external_customer_id: Option<String>,
    pub created_at: i64,
    pub completed_at: Option<i64>,
}

impl PaymentSession {
    pub fn target(&self) -> DonationTarget {
        DonationTarget {
            kind: self.target_kind,
            id: self.target_id.clone(),
        }
    }
}

/// Data required to persist a new pending payment session.
#[derive(Debug, Clone)]
pub struct CreatePaymentSession {
    pub donor_id: String,
    pub target_kind: TargetKind,
    pub target_id: String,
    pub external_session_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub cadence: Cadence,
    pub item_kind: ItemKind,
    pub external_customer_id: Option<String>,
}
