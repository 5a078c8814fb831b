//! # Local Database Module
//!
//! Durable storage for the offline queue, open conflicts and sync metadata.
//! Everything the user did while offline lives here until the server has
//! confirmed it or the user explicitly discarded it.
//!
//! ## Key Components
//!
//! - `LocalDatabase`: connection pool and schema management
//! - `schema.rs`: schema versioning
//! - `queue.rs`: queued mutation rows
//! - `conflicts.rs`: open conflict rows
//! - `sync.rs`: key/value sync metadata (last sync time, strategy)
//!
//! ## Durability
//!
//! File-backed databases run in WAL mode with `synchronous=FULL`, so a write
//! that returned `Ok` survives a process crash.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use claimsync::client::local_db::LocalDatabase;
//!
//! # async fn example() -> Result<(), sqlx::Error> {
//! let db = LocalDatabase::open("/var/lib/claimsync/queue.db").await?;
//! let stats = db.get_stats().await?;
//! println!("{} queued mutations", stats.queued_mutations);
//! # Ok(())
//! # }
//! ```

pub mod conflicts;
pub mod queue;
pub mod schema;
pub mod sync;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Result as SqlxResult, SqlitePool};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Result type for local database operations
pub type Result<T> = SqlxResult<T>;

/// Local database connection manager
#[derive(Debug, Clone)]
pub struct LocalDatabase {
    pool: SqlitePool,
}

impl LocalDatabase {
    /// Open or create a file-backed database
    ///
    /// Creates the parent directory and the file if they don't exist and
    /// initializes the schema.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        tracing::debug!(path = %path.display(), "Opened local queue database");
        Self::with_pool(pool).await
    }

    /// Open a private in-memory database
    ///
    /// The pool is pinned to one connection that never expires; a second
    /// connection would see a different, empty database.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self> {
        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    /// Platform-specific default path for the queue database
    pub fn default_path() -> PathBuf {
        let mut path = dirs::data_dir().unwrap_or_else(std::env::temp_dir);
        path.push("claimsync");
        path.push("queue.db");
        path
    }

    /// Initialize database schema
    ///
    /// Creates all necessary tables and runs any pending migrations.
    async fn init_schema(&self) -> Result<()> {
        sqlx::raw_sql(include_str!("schema.sql"))
            .execute(&self.pool)
            .await?;

        self.run_migrations().await?;

        for table in schema::REQUIRED_TABLES {
            let (count,): (i64,) = sqlx::query_as(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
            )
            .bind(*table)
            .fetch_one(&self.pool)
            .await?;
            if count == 0 {
                return Err(sqlx::Error::Protocol(format!("missing table {}", table)));
            }
        }

        Ok(())
    }

    /// Run database migrations
    ///
    /// Checks the current schema version and applies any pending migrations.
    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        let (current_version,): (i64,) =
            sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
                .fetch_one(&self.pool)
                .await?;

        if !schema::needs_migration(current_version as i32) {
            return Ok(());
        }

        for version in schema::get_pending_migrations(current_version as i32) {
            // Version 1 is the baseline created by schema.sql.
            sqlx::query("INSERT INTO schema_migrations (version, applied_at) VALUES (?, ?)")
                .bind(version)
                .bind(chrono::Utc::now().to_rfc3339())
                .execute(&self.pool)
                .await?;
            tracing::info!(version, "Applied local schema migration");
        }

        Ok(())
    }

    /// Get connection pool reference
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Get database statistics
    pub async fn get_stats(&self) -> Result<DatabaseStats> {
        let (queued,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM offline_queue")
            .fetch_one(&self.pool)
            .await?;

        let (dead,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM offline_queue WHERE state = 'dead_lettered'")
                .fetch_one(&self.pool)
                .await?;

        let (bytes,): (i64,) =
            sqlx::query_as("SELECT COALESCE(SUM(payload_bytes), 0) FROM offline_queue")
                .fetch_one(&self.pool)
                .await?;

        let (conflicts,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM conflicts")
            .fetch_one(&self.pool)
            .await?;

        Ok(DatabaseStats {
            queued_mutations: queued as u64,
            dead_lettered: dead as u64,
            queued_bytes: bytes as u64,
            open_conflicts: conflicts as u64,
        })
    }
}

/// Database statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseStats {
    /// Rows in the offline queue, whatever their state
    pub queued_mutations: u64,
    /// Rows that need manual handling
    pub dead_lettered: u64,
    /// Sum of payload sizes held by the queue
    pub queued_bytes: u64,
    /// Conflicts awaiting a decision
    pub open_conflicts: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_database_creation() {
        let db = LocalDatabase::in_memory().await;
        assert!(db.is_ok());
    }

    #[tokio::test]
    async fn test_database_stats_empty() {
        let db = LocalDatabase::in_memory().await.unwrap();
        let stats = db.get_stats().await.unwrap();
        assert_eq!(stats.queued_mutations, 0);
        assert_eq!(stats.dead_lettered, 0);
        assert_eq!(stats.queued_bytes, 0);
        assert_eq!(stats.open_conflicts, 0);
    }

    #[tokio::test]
    async fn test_file_database_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("queue.db");

        let db = LocalDatabase::open(&path).await.unwrap();
        db.set_sync_metadata("probe", "1").await.unwrap();
        drop(db);

        let db = LocalDatabase::open(&path).await.unwrap();
        assert_eq!(db.get_sync_metadata("probe").await.unwrap(), Some("1".to_string()));
    }
}
