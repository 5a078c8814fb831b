//! Open conflict rows.
//!
//! The unique index on `(entity, entity_id)` enforces at most one open
//! conflict per record at the storage level as well.

use crate::client::local_db::{LocalDatabase, Result};
use crate::shared::conflict::{Conflict, ConflictId};
use crate::shared::mutation::{EntityKind, MutationId};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

impl LocalDatabase {
    /// Persist a newly opened conflict
    pub async fn insert_conflict(&self, conflict: &Conflict) -> Result<()> {
        let local = serde_json::to_string(&conflict.local_payload)
            .map_err(|e| sqlx::Error::Protocol(format!("JSON serialization error: {}", e)))?;
        let server = serde_json::to_string(&conflict.server_payload)
            .map_err(|e| sqlx::Error::Protocol(format!("JSON serialization error: {}", e)))?;

        sqlx::query(
            "INSERT INTO conflicts
                (id, mutation_id, entity, entity_id, local_payload, server_payload,
                 server_version, detected_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(conflict.id.to_string())
        .bind(conflict.mutation_id.to_string())
        .bind(conflict.entity.as_str())
        .bind(&conflict.entity_id)
        .bind(local)
        .bind(server)
        .bind(&conflict.server_version)
        .bind(conflict.detected_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Delete a resolved conflict. Returns whether a row was removed.
    pub async fn delete_conflict(&self, id: &ConflictId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM conflicts WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete every conflict attached to a mutation
    pub async fn delete_conflicts_for_mutation(&self, mutation_id: &MutationId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM conflicts WHERE mutation_id = ?")
            .bind(mutation_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete_all_conflicts(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM conflicts")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Load open conflicts, oldest first
    pub async fn load_conflicts(&self) -> Result<Vec<Conflict>> {
        let rows = sqlx::query(
            "SELECT id, mutation_id, entity, entity_id, local_payload, server_payload,
                    server_version, detected_at
             FROM conflicts
             ORDER BY detected_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(conflict_from_row).collect()
    }
}

fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| sqlx::Error::Protocol(format!("bad uuid {}: {}", value, e)))
}

fn conflict_from_row(row: &SqliteRow) -> Result<Conflict> {
    let id: String = row.try_get("id")?;
    let mutation_id: String = row.try_get("mutation_id")?;
    let entity: String = row.try_get("entity")?;
    let local: String = row.try_get("local_payload")?;
    let server: String = row.try_get("server_payload")?;
    let detected_at: String = row.try_get("detected_at")?;

    Ok(Conflict {
        id: ConflictId(parse_uuid(&id)?),
        mutation_id: MutationId(parse_uuid(&mutation_id)?),
        entity: EntityKind::parse(&entity)
            .ok_or_else(|| sqlx::Error::Protocol(format!("unknown entity {}", entity)))?,
        entity_id: row.try_get("entity_id")?,
        local_payload: serde_json::from_str(&local)
            .map_err(|e| sqlx::Error::Protocol(format!("bad local payload: {}", e)))?,
        server_payload: serde_json::from_str(&server)
            .map_err(|e| sqlx::Error::Protocol(format!("bad server payload: {}", e)))?,
        server_version: row.try_get("server_version")?,
        detected_at: DateTime::parse_from_rfc3339(&detected_at)
            .map_err(|e| sqlx::Error::Protocol(format!("bad timestamp {}: {}", detected_at, e)))?
            .with_timezone(&Utc),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::conflict::ServerSnapshot;
    use crate::shared::mutation::{MutationIntent, OperationKind};
    use serde_json::json;

    fn rejected_update(id: &str) -> MutationIntent {
        MutationIntent::new(
            EntityKind::Claim,
            OperationKind::Update,
            json!({ "id": id, "amount": 1200 }),
            Some("3".to_string()),
            5,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_conflict_roundtrip() {
        let db = LocalDatabase::in_memory().await.unwrap();
        let intent = rejected_update("C1");
        let conflict = Conflict::from_rejection(
            &intent,
            ServerSnapshot {
                version: Some("5".to_string()),
                body: json!({ "id": "C1", "amount": 900 }),
            },
        );

        db.insert_conflict(&conflict).await.unwrap();
        let loaded = db.load_conflicts().await.unwrap();
        assert_eq!(loaded, vec![conflict.clone()]);

        assert!(db.delete_conflict(&conflict.id).await.unwrap());
        assert!(!db.delete_conflict(&conflict.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_one_conflict_per_entity() {
        let db = LocalDatabase::in_memory().await.unwrap();
        let snapshot = ServerSnapshot {
            version: Some("5".to_string()),
            body: json!({ "id": "C1" }),
        };

        let first = Conflict::from_rejection(&rejected_update("C1"), snapshot.clone());
        let second = Conflict::from_rejection(&rejected_update("C1"), snapshot);

        db.insert_conflict(&first).await.unwrap();
        assert!(db.insert_conflict(&second).await.is_err());
    }
}
