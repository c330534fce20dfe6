mod from_row;
pub mod queries;
mod schema;

pub use schema::init_db;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::config::DonationLimits;
use crate::payments::StripeClient;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Application state shared by all request handlers.
///
/// Everything here is constructed once at startup and cheap to clone.
/// No per-request mutable state lives in process memory - all
/// coordination between the initiation path and the webhook path goes
/// through the database.
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    /// Process-wide payment processor client (shared reqwest client inside).
    pub stripe: StripeClient,
    /// Shared HTTP client for fire-and-forget receipt notifications.
    pub http_client: reqwest::Client,
    pub base_url: String,
    pub success_page_url: String,
    pub cancel_page_url: String,
    /// Receipt webhook target; None disables receipt notifications.
    pub receipt_webhook_url: Option<String>,
    pub limits: DonationLimits,
}

pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path);
    Pool::builder().max_size(10).build(manager)
}
