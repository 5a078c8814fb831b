//! Mutation Intents
//!
//! A `MutationIntent` is the record of one user write made through the
//! dashboard: create, update or delete of a claim, document or user. Intents
//! are created client-side, carry their own idempotency key and are replayed
//! against the server by the sync engine.
//!
//! # Identity
//!
//! - `MutationId` identifies the write itself and is sent as the
//!   `Idempotency-Key` of the outbound request.
//! - `EntityKey` identifies the record the write targets. All ordering and
//!   conflict rules are expressed per `EntityKey`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::shared::error::{SyncError, SyncResult};

/// Client-generated identifier of a mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MutationId(pub Uuid);

impl MutationId {
    /// Generate a fresh id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MutationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Entity types that can be mutated offline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Claim,
    Document,
    User,
}

impl EntityKind {
    /// Name stored in the local database
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Claim => "claim",
            EntityKind::Document => "document",
            EntityKind::User => "user",
        }
    }

    /// REST collection segment (`/api/{collection}`)
    pub fn collection(&self) -> &'static str {
        match self {
            EntityKind::Claim => "claims",
            EntityKind::Document => "documents",
            EntityKind::User => "users",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "claim" => Some(EntityKind::Claim),
            "document" => Some(EntityKind::Document),
            "user" => Some(EntityKind::User),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Write operation carried by an intent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Create => "create",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "create" => Some(OperationKind::Create),
            "update" => Some(OperationKind::Update),
            "delete" => Some(OperationKind::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The record targeted by a mutation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityKey {
    pub entity: EntityKind,
    pub id: String,
}

impl EntityKey {
    pub fn new(entity: EntityKind, id: impl Into<String>) -> Self {
        Self {
            entity,
            id: id.into(),
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.entity, self.id)
    }
}

/// Lifecycle flag of a queued intent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentState {
    /// Waiting to be applied
    Pending,
    /// Rejected by a version conflict, waiting for a manual resolution
    Conflicted,
    /// Retry budget exhausted or permanently rejected
    DeadLettered,
}

impl IntentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentState::Pending => "pending",
            IntentState::Conflicted => "conflicted",
            IntentState::DeadLettered => "dead_lettered",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(IntentState::Pending),
            "conflicted" => Some(IntentState::Conflicted),
            "dead_lettered" => Some(IntentState::DeadLettered),
            _ => None,
        }
    }
}

/// A queued, not-yet-applied local write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationIntent {
    pub id: MutationId,
    pub entity: EntityKind,
    pub entity_id: String,
    pub operation: OperationKind,
    pub payload: serde_json::Value,
    pub base_version: Option<String>,
    pub created_at: DateTime<Utc>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub state: IntentState,
    pub payload_bytes: u64,
    pub last_error: Option<String>,
}

impl MutationIntent {
    /// Build an intent from a UI request.
    ///
    /// The target id is read from `payload["id"]`. A create without an id gets
    /// a client-generated UUID written back into the payload; update and delete
    /// must name their target.
    pub fn new(
        entity: EntityKind,
        operation: OperationKind,
        mut payload: serde_json::Value,
        base_version: Option<String>,
        max_retries: u32,
    ) -> SyncResult<Self> {
        let object = payload
            .as_object_mut()
            .ok_or_else(|| SyncError::invalid_payload("payload must be a JSON object"))?;

        let entity_id = match object.get("id") {
            Some(serde_json::Value::String(id)) if !id.is_empty() => id.clone(),
            Some(serde_json::Value::Number(id)) => id.to_string(),
            Some(_) => return Err(SyncError::invalid_payload("`id` must be a string or number")),
            None if operation == OperationKind::Create => {
                let id = Uuid::new_v4().to_string();
                object.insert("id".to_string(), serde_json::Value::String(id.clone()));
                id
            }
            None => {
                return Err(SyncError::invalid_payload(format!(
                    "{} requires `id` in the payload",
                    operation
                )))
            }
        };

        let payload_bytes = serde_json::to_vec(&payload)?.len() as u64;

        Ok(Self {
            id: MutationId::new(),
            entity,
            entity_id,
            operation,
            payload,
            base_version,
            created_at: Utc::now(),
            retry_count: 0,
            max_retries,
            state: IntentState::Pending,
            payload_bytes,
            last_error: None,
        })
    }

    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.entity, self.entity_id.clone())
    }

    /// Whether the intent can still be dispatched
    pub fn is_pending(&self) -> bool {
        self.state == IntentState::Pending
    }

    /// Corrective copy used when the local side wins a conflict.
    ///
    /// Same payload and target, fresh id, base version moved to the server's.
    /// The retry counter carries over so repeated conflicts stay bounded.
    pub fn corrective(&self, server_version: Option<String>) -> Self {
        Self {
            id: MutationId::new(),
            base_version: server_version,
            retry_count: self.retry_count + 1,
            state: IntentState::Pending,
            last_error: None,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn test_create_generates_entity_id() {
        let intent = MutationIntent::new(
            EntityKind::Claim,
            OperationKind::Create,
            json!({ "title": "Hail damage" }),
            None,
            5,
        )
        .unwrap();

        assert!(!intent.entity_id.is_empty());
        assert_eq!(intent.payload["id"], json!(intent.entity_id));
        assert_eq!(intent.state, IntentState::Pending);
        assert_eq!(intent.payload_bytes, serde_json::to_vec(&intent.payload).unwrap().len() as u64);
    }

    #[test]
    fn test_numeric_id_is_accepted() {
        let intent = MutationIntent::new(
            EntityKind::User,
            OperationKind::Delete,
            json!({ "id": 42 }),
            Some("7".to_string()),
            5,
        )
        .unwrap();

        assert_eq!(intent.key(), EntityKey::new(EntityKind::User, "42"));
    }

    #[test]
    fn test_update_without_id_is_rejected() {
        let result = MutationIntent::new(
            EntityKind::Claim,
            OperationKind::Update,
            json!({ "status": "approved" }),
            Some("3".to_string()),
            5,
        );
        assert_matches!(result, Err(SyncError::InvalidPayload { .. }));
    }

    #[test]
    fn test_non_object_payload_is_rejected() {
        let result = MutationIntent::new(EntityKind::Claim, OperationKind::Create, json!([1, 2]), None, 5);
        assert_matches!(result, Err(SyncError::InvalidPayload { .. }));
    }

    #[test]
    fn test_corrective_keeps_target_and_payload() {
        let intent = MutationIntent::new(
            EntityKind::Claim,
            OperationKind::Update,
            json!({ "id": "C1", "status": "approved" }),
            Some("3".to_string()),
            5,
        )
        .unwrap();

        let corrective = intent.corrective(Some("5".to_string()));
        assert_ne!(corrective.id, intent.id);
        assert_eq!(corrective.key(), intent.key());
        assert_eq!(corrective.payload, intent.payload);
        assert_eq!(corrective.base_version.as_deref(), Some("5"));
        assert_eq!(corrective.retry_count, 1);
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(serde_json::to_string(&EntityKind::Document).unwrap(), "\"document\"");
        assert_eq!(serde_json::to_string(&OperationKind::Update).unwrap(), "\"update\"");
        assert_eq!(EntityKind::parse("claim"), Some(EntityKind::Claim));
        assert_eq!(IntentState::parse("dead_lettered"), Some(IntentState::DeadLettered));
        assert_eq!(EntityKind::Claim.collection(), "claims");
    }
}
