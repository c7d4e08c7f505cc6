mod accounts;
mod commands;
mod market;
mod meta;
mod rows;
mod schema;
mod signals;
mod trades;

#[cfg(test)]
#[path = "tests.rs"]
mod store_tests;

use sqlx::SqlitePool;

pub use commands::CommandUpdate;
pub use meta::{decision, SymbolOverride};
pub use signals::SignalUpsertOutcome;
pub use trades::{NewTrade, TradeCloseUpdate};

/// Persistence layer. The trades, signals and commands tables are the
/// canonical state; workers communicate about these entities only through
/// this store.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = SqlitePool::connect(database_url).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create all tables and indexes (idempotent, called on startup).
    pub async fn init_tables(&self) -> anyhow::Result<()> {
        schema::init_tables(&self.pool).await
    }
}

pub(crate) fn parse_ts(s: &str) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&chrono::Utc))
        .unwrap_or(chrono::DateTime::UNIX_EPOCH)
}
