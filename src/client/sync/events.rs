//! Sync events broadcast to the UI.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::client::sync::network_monitor::NetworkStatus;
use crate::client::sync::sync_state::SyncProgress;
use crate::shared::conflict::{ConflictId, ResolutionChoice};
use crate::shared::mutation::{EntityKind, MutationId};

/// Something the UI may want to react to
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEventKind {
    /// The server confirmed an intent
    Applied {
        mutation_id: MutationId,
        entity: EntityKind,
        entity_id: String,
        version: Option<String>,
    },
    /// A transient failure; the intent waits `delay_ms` before the next attempt
    RetryScheduled {
        mutation_id: MutationId,
        retry_count: u32,
        delay_ms: u64,
        error: String,
    },
    /// The intent needs manual handling
    DeadLettered { mutation_id: MutationId, reason: String },
    ConflictDetected {
        conflict_id: ConflictId,
        mutation_id: MutationId,
    },
    ConflictResolved {
        conflict_id: ConflictId,
        choice: ResolutionChoice,
    },
    /// A local edit was replaced by a corrective copy
    Superseded { old_id: MutationId, new_id: MutationId },
    /// The server state won; the local edit is gone
    LocalEditDropped {
        mutation_id: MutationId,
        entity: EntityKind,
        entity_id: String,
    },
    ConnectivityChanged { status: NetworkStatus },
    PassFinished { progress: SyncProgress, interrupted: bool },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncEvent {
    #[serde(flatten)]
    pub kind: SyncEventKind,
    pub timestamp: DateTime<Utc>,
}

impl SyncEvent {
    pub fn new(kind: SyncEventKind) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = SyncEvent::new(SyncEventKind::DeadLettered {
            mutation_id: MutationId::new(),
            reason: "retries exhausted".to_string(),
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "dead_lettered");
        assert_eq!(json["reason"], "retries exhausted");
        assert!(json["timestamp"].is_string());
    }
}
