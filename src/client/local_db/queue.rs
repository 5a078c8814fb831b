//! # Offline Queue Rows
//!
//! Durable storage for queued mutation intents. Rows are appended with an
//! autoincrement `seq` that defines FIFO order; in-place updates only touch
//! the retry counter, the state flag and the last error.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use claimsync::client::local_db::LocalDatabase;
//! use claimsync::shared::mutation::{EntityKind, MutationIntent, OperationKind};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = LocalDatabase::in_memory().await?;
//! let intent = MutationIntent::new(
//!     EntityKind::Claim,
//!     OperationKind::Create,
//!     json!({ "title": "Roof damage" }),
//!     None,
//!     5,
//! )?;
//! db.insert_intent(&intent).await?;
//! let queued = db.load_intents().await?;
//! assert_eq!(queued.len(), 1);
//! # Ok(())
//! # }
//! ```

use crate::client::local_db::{LocalDatabase, Result};
use crate::shared::mutation::{EntityKind, IntentState, MutationId, MutationIntent, OperationKind};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

/// A persisted intent with its queue position
#[derive(Debug, Clone)]
pub struct StoredIntent {
    pub seq: i64,
    pub intent: MutationIntent,
}

impl LocalDatabase {
    /// Append an intent to the queue, returning its sequence number
    pub async fn insert_intent(&self, intent: &MutationIntent) -> Result<i64> {
        let payload = serde_json::to_string(&intent.payload)
            .map_err(|e| sqlx::Error::Protocol(format!("JSON serialization error: {}", e)))?;

        let result = sqlx::query(
            "INSERT INTO offline_queue
                (id, entity, entity_id, operation, payload, base_version, created_at,
                 retry_count, max_retries, state, payload_bytes, last_error)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(intent.id.to_string())
        .bind(intent.entity.as_str())
        .bind(&intent.entity_id)
        .bind(intent.operation.as_str())
        .bind(payload)
        .bind(&intent.base_version)
        .bind(intent.created_at.to_rfc3339())
        .bind(intent.retry_count as i64)
        .bind(intent.max_retries as i64)
        .bind(intent.state.as_str())
        .bind(intent.payload_bytes as i64)
        .bind(&intent.last_error)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Load every queued intent in FIFO order
    pub async fn load_intents(&self) -> Result<Vec<StoredIntent>> {
        let rows = sqlx::query(
            "SELECT seq, id, entity, entity_id, operation, payload, base_version, created_at,
                    retry_count, max_retries, state, payload_bytes, last_error
             FROM offline_queue
             ORDER BY seq ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(stored_intent_from_row).collect()
    }

    /// Delete an intent. Returns whether a row was removed.
    pub async fn delete_intent(&self, id: &MutationId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM offline_queue WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete every intent. Returns the number of rows removed.
    pub async fn delete_all_intents(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM offline_queue")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Persist a new retry count and the error that caused it
    pub async fn record_intent_retry(
        &self,
        id: &MutationId,
        retry_count: u32,
        error_message: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE offline_queue SET
                retry_count = ?,
                last_attempt = ?,
                last_error = ?
             WHERE id = ?",
        )
        .bind(retry_count as i64)
        .bind(Utc::now().to_rfc3339())
        .bind(error_message)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Update the lifecycle flag of an intent
    pub async fn set_intent_state(
        &self,
        id: &MutationId,
        state: IntentState,
        error_message: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE offline_queue SET state = ?, last_error = COALESCE(?, last_error) WHERE id = ?",
        )
        .bind(state.as_str())
        .bind(error_message)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Reset a dead-lettered intent so it can run again
    pub async fn reset_intent(&self, id: &MutationId) -> Result<()> {
        sqlx::query(
            "UPDATE offline_queue SET state = 'pending', retry_count = 0, last_error = NULL
             WHERE id = ?",
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Replace an intent with its corrective copy, keeping its queue position
    pub async fn supersede_intent(&self, old_id: &MutationId, corrective: &MutationIntent) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE offline_queue SET
                id = ?,
                base_version = ?,
                retry_count = ?,
                state = ?,
                last_error = NULL
             WHERE id = ?",
        )
        .bind(corrective.id.to_string())
        .bind(&corrective.base_version)
        .bind(corrective.retry_count as i64)
        .bind(corrective.state.as_str())
        .bind(old_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn decode_error(message: String) -> sqlx::Error {
    sqlx::Error::Protocol(message)
}

fn stored_intent_from_row(row: &SqliteRow) -> Result<StoredIntent> {
    let id: String = row.try_get("id")?;
    let entity: String = row.try_get("entity")?;
    let operation: String = row.try_get("operation")?;
    let payload: String = row.try_get("payload")?;
    let created_at: String = row.try_get("created_at")?;
    let state: String = row.try_get("state")?;
    let retry_count: i64 = row.try_get("retry_count")?;
    let max_retries: i64 = row.try_get("max_retries")?;
    let payload_bytes: i64 = row.try_get("payload_bytes")?;

    let intent = MutationIntent {
        id: MutationId(
            Uuid::parse_str(&id).map_err(|e| decode_error(format!("bad mutation id {}: {}", id, e)))?,
        ),
        entity: EntityKind::parse(&entity)
            .ok_or_else(|| decode_error(format!("unknown entity {}", entity)))?,
        entity_id: row.try_get("entity_id")?,
        operation: OperationKind::parse(&operation)
            .ok_or_else(|| decode_error(format!("unknown operation {}", operation)))?,
        payload: serde_json::from_str(&payload)
            .map_err(|e| decode_error(format!("bad payload for {}: {}", id, e)))?,
        base_version: row.try_get("base_version")?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| decode_error(format!("bad timestamp {}: {}", created_at, e)))?
            .with_timezone(&Utc),
        retry_count: retry_count.max(0) as u32,
        max_retries: max_retries.max(0) as u32,
        state: IntentState::parse(&state)
            .ok_or_else(|| decode_error(format!("unknown state {}", state)))?,
        payload_bytes: payload_bytes.max(0) as u64,
        last_error: row.try_get("last_error")?,
    };

    Ok(StoredIntent {
        seq: row.try_get("seq")?,
        intent,
    })
}
