use axum::Router;
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use std::time::Duration;

use donorconnect::config::Config;
use donorconnect::db::{create_pool, init_db, queries, AppState};
use donorconnect::handlers;
use donorconnect::models::CreateUser;
use donorconnect::payments::StripeClient;

#[derive(Parser, Debug)]
#[command(name = "donorconnect")]
#[command(about = "Donation coordination service - payment core")]
struct Cli {
    /// Seed the database with dev data (donor, NGO, campaign)
    #[arg(long)]
    seed: bool,
}

/// Seeds the database with dev data for local testing.
/// Creates a donor (printing their bearer token once), an NGO, and a campaign.
fn seed_dev_data(state: &AppState) {
    let conn = state
        .db
        .get()
        .expect("Failed to get db connection for seeding");

    let existing: i64 = conn
        .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
        .expect("Failed to count users");
    if existing > 0 {
        tracing::info!("Database already has data, skipping seed");
        return;
    }

    let token = queries::generate_api_token();
    let donor = queries::create_user(
        &conn,
        &CreateUser {
            email: "donor@donorconnect.local".to_string(),
            name: "Dev Donor".to_string(),
        },
        &queries::hash_token(&token),
    )
    .expect("Failed to create dev donor");

    let ngo = queries::create_ngo(&conn, "Helping Hands").expect("Failed to create dev NGO");
    let campaign =
        queries::create_campaign(&conn, "Winter Relief").expect("Failed to create dev campaign");

    tracing::info!("============================================");
    tracing::info!("DEV DATA SEEDED");
    tracing::info!("Donor: {} ({})", donor.email, donor.id);
    tracing::info!("Donor bearer token: {}", token);
    tracing::info!("SAVE THIS TOKEN - IT WILL NOT BE SHOWN AGAIN");
    tracing::info!("NGO: {} ({})", ngo.name, ngo.id);
    tracing::info!("Campaign: {} ({})", campaign.name, campaign.id);
    tracing::info!("============================================");
}

/// Spawns a background task that periodically purges old webhook event
/// log rows. Payment sessions are never purged - they are the audit trail.
fn spawn_event_log_purge(state: AppState, retention_days: i64) {
    if retention_days <= 0 {
        return;
    }

    tokio::spawn(async move {
        let interval = Duration::from_secs(6 * 60 * 60); // 6 hours

        loop {
            tokio::time::sleep(interval).await;

            match state.db.get() {
                Ok(conn) => match queries::purge_old_webhook_events(&conn, retention_days) {
                    Ok(count) => {
                        if count > 0 {
                            tracing::debug!("Purged {} old webhook event log rows", count);
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Failed to purge webhook events: {}", e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to get db connection for purge: {}", e);
                }
            }
        }
    });

    tracing::info!(
        "Webhook event log purge task started (retention: {} days)",
        retention_days
    );
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "donorconnect=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    if config.dev_mode {
        tracing::info!("Running in DEVELOPMENT mode");
    }

    let db_pool = create_pool(&config.database_path).expect("Failed to create database pool");
    {
        let conn = db_pool.get().expect("Failed to get connection");
        init_db(&conn).expect("Failed to initialize database");
    }

    let state = AppState {
        db: db_pool,
        stripe: StripeClient::new(&config.stripe),
        http_client: reqwest::Client::new(),
        base_url: config.base_url.clone(),
        success_page_url: config.success_page_url.clone(),
        cancel_page_url: config.cancel_page_url.clone(),
        receipt_webhook_url: config.receipt_webhook_url.clone(),
        limits: config.limits,
    };

    if cli.seed {
        if !config.dev_mode {
            tracing::warn!("--seed flag ignored: not in dev mode (set DONORCONNECT_ENV=dev)");
        } else {
            seed_dev_data(&state);
        }
    }

    spawn_event_log_purge(state.clone(), config.webhook_event_retention_days);

    let app = Router::new()
        .merge(handlers::donate::router())
        .merge(handlers::webhooks::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("DonorConnect server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Failed to start server");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, stopping server...");
}
