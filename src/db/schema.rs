use rusqlite::Connection;

/// Initialize the database schema. Idempotent - safe to run at every startup.
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        -- Donors. api_token_hash is the SHA-256 hex of the bearer token.
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            api_token_hash TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_users_token ON users(api_token_hash);

        -- Donation targets
        CREATE TABLE IF NOT EXISTS ngos (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS campaigns (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );

        -- Payment sessions: one row per collection attempt, never deleted.
        -- The pending -> completed transition is a guarded conditional
        -- UPDATE on (external_session_id, status), so concurrent deliveries
        -- of the same completion event cannot both take effect.
        CREATE TABLE IF NOT EXISTS payment_sessions (
            id TEXT PRIMARY KEY,
            donor_id TEXT NOT NULL REFERENCES users(id),
            target_kind TEXT NOT NULL CHECK (target_kind IN ('ngo', 'campaign')),
            target_id TEXT NOT NULL,
            external_session_id TEXT NOT NULL UNIQUE,
            amount_cents INTEGER NOT NULL,
            currency TEXT NOT NULL,
            cadence TEXT NOT NULL CHECK (cadence IN ('one_time', 'recurring')),
            item_kind TEXT NOT NULL CHECK (item_kind IN ('money', 'goods')),
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'completed', 'expired', 'failed')),
            payment_intent_id TEXT,
            external_customer_id TEXT,
            created_at INTEGER NOT NULL,
            completed_at INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_payment_sessions_donor ON payment_sessions(donor_id);
        CREATE INDEX IF NOT EXISTS idx_payment_sessions_intent
            ON payment_sessions(payment_intent_id) WHERE payment_intent_id IS NOT NULL;

        -- Recurring agreements: at most one row per external subscription id,
        -- enforced at insert time (INSERT OR IGNORE against the unique key).
        CREATE TABLE IF NOT EXISTS subscriptions (
            id TEXT PRIMARY KEY,
            donor_id TEXT NOT NULL REFERENCES users(id),
            target_kind TEXT NOT NULL CHECK (target_kind IN ('ngo', 'campaign')),
            target_id TEXT NOT NULL,
            external_subscription_id TEXT NOT NULL UNIQUE,
            external_customer_id TEXT,
            external_price_id TEXT,
            amount_cents INTEGER NOT NULL,
            currency TEXT NOT NULL,
            interval TEXT NOT NULL CHECK (interval IN ('monthly', 'yearly')),
            status TEXT NOT NULL DEFAULT 'active' CHECK (status IN ('active', 'cancelled')),
            current_period_start INTEGER,
            current_period_end INTEGER,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_subscriptions_donor ON subscriptions(donor_id);

        -- Completed billing cycles per subscription, keyed by invoice id
        -- so a replayed invoice event records a cycle exactly once.
        CREATE TABLE IF NOT EXISTS donations (
            id TEXT PRIMARY KEY,
            subscription_id TEXT NOT NULL REFERENCES subscriptions(id),
            external_invoice_id TEXT NOT NULL UNIQUE,
            amount_cents INTEGER NOT NULL,
            currency TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_donations_subscription ON donations(subscription_id);

        -- Webhook event log (observability only - NOT the idempotency
        -- mechanism; that lives on the domain rows above).
        CREATE TABLE IF NOT EXISTS webhook_events (
            id TEXT PRIMARY KEY,
            provider TEXT NOT NULL,
            event_id TEXT NOT NULL,
            event_type TEXT NOT NULL,
            payload TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            UNIQUE(provider, event_id)
        );
        CREATE INDEX IF NOT EXISTS idx_webhook_events_lookup ON webhook_events(provider, event_id);
        "#,
    )?;
    Ok(())
}
