//! # cf-db-sqlite Implementation
//!
//! This crate implements the data mapping between the SQLite relational model
//! and the `cf-core` domain models.

mod directory;
mod feed;
mod submissions;

pub use directory::SqliteAuditSink;

use std::str::FromStr;
use std::time::Duration;

use cf_core::error::StoreError;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

/// One pool backing every store port: feed, submissions, and the directories.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (or creates) the database at `url` and applies migrations.
    ///
    /// In-memory URLs get a single long-lived connection, since every new
    /// SQLite connection to `:memory:` would see an empty database.
    pub async fn new(url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let in_memory = url.contains(":memory:") || url.contains("mode=memory");
        let mut options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(max_connections.max(1))
        };
        let pool = pool_options.connect_with(options).await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!(url, in_memory, "sqlite store ready");
        Ok(Self { pool })
    }

    /// Audit sink writing to this database's `activity_logs` table.
    pub fn audit_sink(&self) -> SqliteAuditSink {
        SqliteAuditSink::new(self.pool.clone())
    }
}

pub(crate) fn unavailable(err: sqlx::Error) -> StoreError {
    StoreError::Unavailable(err.into())
}
