//! # Sync Metadata Operations
//!
//! Key/value storage for state that must survive a restart but is not part
//! of the queue itself.
//!
//! ## Keys
//!
//! - `last_sync_time`: end of the last completed drain pass (RFC 3339)
//! - `conflict_strategy`: process-wide conflict policy
//! - `offline_capabilities`: JSON-encoded capability flags
//!
//! ## Usage
//!
//! ```rust,no_run
//! use claimsync::client::local_db::LocalDatabase;
//!
//! # async fn example() -> Result<(), sqlx::Error> {
//! let db = LocalDatabase::in_memory().await?;
//! db.set_last_sync_time(chrono::Utc::now()).await?;
//! let last = db.get_last_sync_time().await?;
//! assert!(last.is_some());
//! # Ok(())
//! # }
//! ```

use crate::client::local_db::{LocalDatabase, Result};
use crate::shared::config::{ConflictStrategy, OfflineCapabilities};
use chrono::{DateTime, Utc};
use sqlx::Row;

const LAST_SYNC_TIME: &str = "last_sync_time";
const CONFLICT_STRATEGY: &str = "conflict_strategy";
const OFFLINE_CAPABILITIES: &str = "offline_capabilities";

impl LocalDatabase {
    /// Set sync metadata
    pub async fn set_sync_metadata(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO sync_metadata (key, value, updated_at)
             VALUES (?, ?, ?)",
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Get sync metadata
    pub async fn get_sync_metadata(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM sync_metadata WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(row.try_get("value")?)),
            None => Ok(None),
        }
    }

    /// Get last sync timestamp
    ///
    /// An unparseable stored value reads as "never synced".
    pub async fn get_last_sync_time(&self) -> Result<Option<DateTime<Utc>>> {
        let value = self.get_sync_metadata(LAST_SYNC_TIME).await?;
        Ok(value
            .and_then(|v| DateTime::parse_from_rfc3339(&v).ok())
            .map(|t| t.with_timezone(&Utc)))
    }

    /// Set last sync timestamp
    pub async fn set_last_sync_time(&self, at: DateTime<Utc>) -> Result<()> {
        self.set_sync_metadata(LAST_SYNC_TIME, &at.to_rfc3339()).await
    }

    /// Persisted conflict strategy, if one was ever set
    pub async fn get_conflict_strategy(&self) -> Result<Option<ConflictStrategy>> {
        let value = self.get_sync_metadata(CONFLICT_STRATEGY).await?;
        Ok(value.as_deref().and_then(ConflictStrategy::parse))
    }

    pub async fn set_conflict_strategy(&self, strategy: ConflictStrategy) -> Result<()> {
        self.set_sync_metadata(CONFLICT_STRATEGY, strategy.as_str()).await
    }

    /// Persisted capability flags, if they were ever updated at runtime
    pub async fn get_capabilities(&self) -> Result<Option<OfflineCapabilities>> {
        match self.get_sync_metadata(OFFLINE_CAPABILITIES).await? {
            Some(value) => serde_json::from_str(&value)
                .map(Some)
                .map_err(|e| sqlx::Error::Protocol(format!("bad capabilities: {}", e))),
            None => Ok(None),
        }
    }

    pub async fn set_capabilities(&self, capabilities: &OfflineCapabilities) -> Result<()> {
        let value = serde_json::to_string(capabilities)
            .map_err(|e| sqlx::Error::Protocol(format!("JSON serialization error: {}", e)))?;
        self.set_sync_metadata(OFFLINE_CAPABILITIES, &value).await
    }
}
