//! Conflict Types
//!
//! A conflict is opened when the server rejects a mutation because its
//! version of the record moved past the mutation's `base_version`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::shared::mutation::{EntityKey, EntityKind, MutationId, MutationIntent};

/// Identifier of an open conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConflictId(pub Uuid);

impl ConflictId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConflictId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConflictId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Server-side state of a record at the time a write was rejected
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSnapshot {
    /// Current server version, if the server reported one
    pub version: Option<String>,
    /// Current server representation (`null` if the record is gone)
    pub body: serde_json::Value,
}

/// A divergence between a queued local write and the server's state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub id: ConflictId,
    /// The rejected intent. It stays queued until the conflict is resolved.
    pub mutation_id: MutationId,
    pub entity: EntityKind,
    pub entity_id: String,
    pub local_payload: serde_json::Value,
    pub server_payload: serde_json::Value,
    pub server_version: Option<String>,
    pub detected_at: DateTime<Utc>,
}

impl Conflict {
    /// Open a conflict for a rejected intent
    pub fn from_rejection(intent: &MutationIntent, snapshot: ServerSnapshot) -> Self {
        Self {
            id: ConflictId::new(),
            mutation_id: intent.id,
            entity: intent.entity,
            entity_id: intent.entity_id.clone(),
            local_payload: intent.payload.clone(),
            server_payload: snapshot.body,
            server_version: snapshot.version,
            detected_at: Utc::now(),
        }
    }

    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.entity, self.entity_id.clone())
    }
}

/// User decision for a manually resolved conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionChoice {
    /// Keep the local edit and resubmit it against the server's version
    Local,
    /// Keep the server state and drop the local edit
    Server,
}
