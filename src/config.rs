use std::env;

/// Default lower bound for a money donation: 100 minor units (e.g. $1.00).
const DEFAULT_MIN_DONATION_CENTS: i64 = 100;

/// Default upper bound: 10,000,000 minor units (e.g. $100,000.00).
const DEFAULT_MAX_DONATION_CENTS: i64 = 10_000_000;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub base_url: String,
    pub stripe: StripeConfig,
    pub limits: DonationLimits,
    /// Fire-and-forget receipt/notification webhook. None disables receipts.
    pub receipt_webhook_url: Option<String>,
    pub success_page_url: String,
    pub cancel_page_url: String,
    /// Days to keep webhook event log rows. 0 = keep forever.
    pub webhook_event_retention_days: i64,
    pub dev_mode: bool,
}

#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
}

/// Platform-configured bounds on money donations, in minor currency units.
#[derive(Debug, Clone, Copy)]
pub struct DonationLimits {
    pub min_cents: i64,
    pub max_cents: i64,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("DONORCONNECT_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let base_url =
            env::var("BASE_URL").unwrap_or_else(|_| format!("http://{}:{}", host, port));

        let min_cents = env::var("MIN_DONATION_CENTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MIN_DONATION_CENTS);
        let max_cents = env::var("MAX_DONATION_CENTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_DONATION_CENTS);

        Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "donorconnect.db".to_string()),
            base_url: base_url.clone(),
            stripe: StripeConfig {
                secret_key: env::var("STRIPE_SECRET_KEY").unwrap_or_default(),
                webhook_secret: env::var("STRIPE_WEBHOOK_SECRET").unwrap_or_default(),
            },
            limits: DonationLimits {
                min_cents,
                max_cents,
            },
            receipt_webhook_url: env::var("RECEIPT_WEBHOOK_URL").ok(),
            success_page_url: env::var("SUCCESS_PAGE_URL")
                .unwrap_or_else(|_| format!("{}/donate/success", base_url)),
            cancel_page_url: env::var("CANCEL_PAGE_URL")
                .unwrap_or_else(|_| format!("{}/donate/cancel", base_url)),
            webhook_event_retention_days: env::var("WEBHOOK_EVENT_RETENTION_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(90),
            dev_mode,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
