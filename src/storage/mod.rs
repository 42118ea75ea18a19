//! Persistence layer.
//!
//! All durable state lives in a relational store accessed through `sqlx`
//! (SQLite). The schema is created idempotently on connect. Handlers do
//! sequential read-then-write against it; the only multi-statement
//! transaction is the credit ledger append.

mod challenge;
mod credits;
mod picks;

pub use picks::PickFilter;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::{debug, info};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS competitions (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        status TEXT NOT NULL,
        start_date TEXT NOT NULL,
        end_date TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS ai_models (
        id TEXT PRIMARY KEY,
        display_name TEXT NOT NULL,
        provider TEXT NOT NULL,
        total_picks INTEGER NOT NULL DEFAULT 0,
        wins INTEGER NOT NULL DEFAULT 0,
        losses INTEGER NOT NULL DEFAULT 0,
        win_rate REAL NOT NULL DEFAULT 0,
        current_streak INTEGER NOT NULL DEFAULT 0,
        best_streak INTEGER NOT NULL DEFAULT 0,
        total_profit_loss REAL NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS picks (
        id TEXT PRIMARY KEY,
        competition_id TEXT NOT NULL REFERENCES competitions(id),
        model_id TEXT NOT NULL REFERENCES ai_models(id),
        ticker TEXT NOT NULL,
        category TEXT NOT NULL,
        confidence REAL NOT NULL,
        entry_price REAL NOT NULL,
        target_price REAL NOT NULL,
        reasoning TEXT NOT NULL,
        week_number INTEGER NOT NULL,
        picked_at TEXT NOT NULL,
        expires_at TEXT NOT NULL,
        status TEXT NOT NULL,
        result TEXT,
        exit_price REAL,
        profit_loss_percent REAL,
        resolved_at TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_picks_status ON picks(status)",
    "CREATE INDEX IF NOT EXISTS idx_picks_slot ON picks(competition_id, model_id, category, week_number)",
    "CREATE TABLE IF NOT EXISTS enrollments (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        challenge_id TEXT NOT NULL,
        starting_balance TEXT NOT NULL,
        balance TEXT NOT NULL,
        portfolio_value TEXT NOT NULL,
        total_return_percent REAL NOT NULL DEFAULT 0,
        current_day INTEGER NOT NULL DEFAULT 1,
        trades_count INTEGER NOT NULL DEFAULT 0,
        milestones_count INTEGER NOT NULL DEFAULT 0,
        milestones_achieved TEXT NOT NULL DEFAULT '[]',
        status TEXT NOT NULL,
        started_at TEXT NOT NULL,
        completed_at TEXT,
        final_rank INTEGER
    )",
    "CREATE INDEX IF NOT EXISTS idx_enrollments_user ON enrollments(user_id, challenge_id)",
    "CREATE TABLE IF NOT EXISTS holdings (
        enrollment_id TEXT NOT NULL REFERENCES enrollments(id),
        ticker TEXT NOT NULL,
        quantity TEXT NOT NULL,
        avg_price TEXT NOT NULL,
        last_price TEXT NOT NULL,
        PRIMARY KEY (enrollment_id, ticker)
    )",
    "CREATE TABLE IF NOT EXISTS challenge_trades (
        id TEXT PRIMARY KEY,
        enrollment_id TEXT NOT NULL REFERENCES enrollments(id),
        ticker TEXT NOT NULL,
        side TEXT NOT NULL,
        quantity TEXT NOT NULL,
        price TEXT NOT NULL,
        executed_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS credit_transactions (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        amount INTEGER NOT NULL,
        transaction_type TEXT NOT NULL,
        description TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_credit_tx_user ON credit_transactions(user_id)",
    "CREATE TABLE IF NOT EXISTS user_credits (
        user_id TEXT PRIMARY KEY,
        balance INTEGER NOT NULL
    )",
];

/// Handle to the relational store. Cheap to clone.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Connect to a database URL (e.g. `sqlite://market_oracle.db`) and
    /// ensure the schema exists.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("Invalid database url: {url}"))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open database {url}"))?;

        let store = Self { pool };
        store.migrate().await?;
        info!(url, "Database ready");
        Ok(store)
    }

    /// A private in-memory database (tests, dry runs).
    ///
    /// Pinned to a single connection that never expires, since each SQLite
    /// memory connection is its own database.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None::<std::time::Duration>)
            .max_lifetime(None::<std::time::Duration>)
            .connect_with(options)
            .await
            .context("Failed to open in-memory database")?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("Failed to apply schema")?;
        }
        debug!(statements = SCHEMA.len(), "Schema applied");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Decode a decimal stored as TEXT.
fn parse_decimal(column: &str, value: &str) -> Result<Decimal> {
    Decimal::from_str(value).with_context(|| format!("Invalid decimal in {column}: {value}"))
}
