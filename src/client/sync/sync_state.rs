//! # Sync State Management
//!
//! The single sync state record. The engine owns the only writer; everything
//! else reads through a `watch::Receiver`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome-level status shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    #[default]
    Idle,
    Syncing,
    Success,
    /// At least one entity is blocked by a conflict or a dead letter
    Error,
}

/// What the drain loop is doing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    #[default]
    Idle,
    Draining,
    /// The last pass left at least one entity blocked
    Paused,
}

/// Counters for the current (or last) drain pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SyncProgress {
    /// Intents that were ready when the pass started, plus those that became
    /// ready during it
    pub total: usize,
    pub completed: usize,
    /// Intents dead-lettered during the pass
    pub failed: usize,
}

impl SyncProgress {
    /// Fraction of the pass that is settled, in `[0, 1]`
    pub fn fraction(&self) -> f32 {
        if self.total == 0 {
            return 1.0;
        }
        ((self.completed + self.failed) as f32 / self.total as f32).min(1.0)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SyncState {
    pub status: SyncStatus,
    pub engine: EngineState,
    pub progress: SyncProgress,
    /// End of the last drain pass that ran to completion
    pub last_sync_at: Option<DateTime<Utc>>,
}

impl SyncState {
    pub fn is_syncing(&self) -> bool {
        self.engine == EngineState::Draining
    }
}
