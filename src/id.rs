//! Prefixed ID generation for DonorConnect entities.
//!
//! All IDs carry a `dc_` brand prefix so local identifiers can never be
//! confused with payment-processor IDs (Stripe's `cs_`, `cus_`, `sub_`,
//! `price_`, `pi_`, etc.).
//!
//! Format: `dc_{entity}_{uuid_simple}` (32 hex chars, no hyphens)

use uuid::Uuid;

/// All known entity prefixes for validation.
const ALL_PREFIXES: &[&str] = &[
    "dc_usr_",
    "dc_ngo_",
    "dc_camp_",
    "dc_ps_",
    "dc_sub_",
    "dc_don_",
    "dc_evt_",
];

/// Validate that a string is a valid DonorConnect prefixed ID.
///
/// Cheap format check to reject garbage before hitting the database.
/// Validates format: `dc_{entity}_{32_hex_chars}`
pub fn is_valid_prefixed_id(s: &str) -> bool {
    let Some(prefix) = ALL_PREFIXES.iter().find(|p| s.starts_with(*p)) else {
        return false;
    };

    let hex_part = &s[prefix.len()..];
    hex_part.len() == 32 && hex_part.chars().all(|c| c.is_ascii_hexdigit())
}

/// Entity types that have prefixed IDs in DonorConnect.
#[derive(Debug, Clone, Copy)]
pub enum EntityType {
    User,
    Ngo,
    Campaign,
    PaymentSession,
    Subscription,
    Donation,
    WebhookEvent,
}

impl EntityType {
    /// Returns the prefix for this entity type.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::User => "dc_usr",
            Self::Ngo => "dc_ngo",
            Self::Campaign => "dc_camp",
            Self::PaymentSession => "dc_ps",
            Self::Subscription => "dc_sub",
            Self::Donation => "dc_don",
            Self::WebhookEvent => "dc_evt",
        }
    }

    /// Generates a new prefixed ID for this entity type.
    pub fn gen_id(&self) -> String {
        format!("{}_{}", self.prefix(), Uuid::new_v4().as_simple())
    }
}
