//! # Sync Status Reporter
//!
//! Read model for the dashboard's status indicator. Pulls from the queue,
//! the resolver, the engine's state channel and the network monitor; never
//! writes to any of them.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

use crate::client::offline::queue::ActionQueue;
use crate::client::sync::conflict_resolver::ConflictResolver;
use crate::client::sync::metrics::SyncMetrics;
use crate::client::sync::network_monitor::NetworkMonitor;
use crate::client::sync::sync_state::{EngineState, SyncProgress, SyncState, SyncStatus};

/// Point-in-time snapshot of queue and sync health
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncStatusReport {
    pub status: SyncStatus,
    pub engine: EngineState,
    pub progress: SyncProgress,
    pub is_online: bool,
    /// Intents still queued, whatever their state
    pub queue_depth: usize,
    pub in_flight: usize,
    pub dead_lettered: usize,
    pub open_conflicts: usize,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub used_bytes: u64,
    pub quota_bytes: u64,
    pub passes_completed: u64,
    pub status_message: String,
}

impl SyncStatusReport {
    /// Whether the indicator deserves the user's attention
    pub fn should_show(&self) -> bool {
        !self.is_online
            || self.queue_depth > 0
            || self.open_conflicts > 0
            || self.status == SyncStatus::Error
            || self.engine == EngineState::Draining
    }

    /// One-word status for compact layouts
    pub fn short_status(&self) -> &'static str {
        if self.open_conflicts > 0 {
            "Conflict"
        } else if self.dead_lettered > 0 {
            "Failed"
        } else if !self.is_online {
            "Offline"
        } else if self.engine == EngineState::Draining {
            "Syncing"
        } else if self.queue_depth > 0 {
            "Pending"
        } else {
            "Synced"
        }
    }

    /// "just now", "5m ago", "2h ago", "3d ago" or "never"
    pub fn formatted_time_since_sync(&self, now: DateTime<Utc>) -> String {
        let Some(last) = self.last_sync_at else {
            return "never".to_string();
        };

        let elapsed = now.signed_duration_since(last);
        if elapsed.num_seconds() < 60 {
            "just now".to_string()
        } else if elapsed.num_minutes() < 60 {
            format!("{}m ago", elapsed.num_minutes())
        } else if elapsed.num_hours() < 24 {
            format!("{}h ago", elapsed.num_hours())
        } else {
            format!("{}d ago", elapsed.num_days())
        }
    }

    /// Storage usage as a fraction of the quota
    pub fn storage_fraction(&self) -> f64 {
        if self.quota_bytes == 0 {
            return 1.0;
        }
        self.used_bytes as f64 / self.quota_bytes as f64
    }
}

/// Builds `SyncStatusReport`s on demand
#[derive(Debug, Clone)]
pub struct SyncStatusReporter {
    queue: Arc<ActionQueue>,
    resolver: Arc<ConflictResolver>,
    state: watch::Receiver<SyncState>,
    monitor: Arc<NetworkMonitor>,
    metrics: Arc<Mutex<SyncMetrics>>,
}

impl SyncStatusReporter {
    pub fn new(
        queue: Arc<ActionQueue>,
        resolver: Arc<ConflictResolver>,
        state: watch::Receiver<SyncState>,
        monitor: Arc<NetworkMonitor>,
        metrics: Arc<Mutex<SyncMetrics>>,
    ) -> Self {
        Self {
            queue,
            resolver,
            state,
            monitor,
            metrics,
        }
    }

    pub async fn report(&self) -> SyncStatusReport {
        let state = self.state.borrow().clone();
        let stats = self.queue.stats().await;
        let open_conflicts = self.resolver.count().await;
        let passes_completed = self.metrics.lock().await.passes_completed;
        let is_online = self.monitor.is_online();

        let status_message = status_message(&state, is_online, stats.depth, stats.dead_lettered, open_conflicts);

        SyncStatusReport {
            status: state.status,
            engine: state.engine,
            progress: state.progress,
            is_online,
            queue_depth: stats.depth,
            in_flight: stats.in_flight,
            dead_lettered: stats.dead_lettered,
            open_conflicts,
            last_sync_at: state.last_sync_at,
            used_bytes: stats.used_bytes,
            quota_bytes: stats.quota_bytes,
            passes_completed,
            status_message,
        }
    }
}

fn status_message(
    state: &SyncState,
    is_online: bool,
    depth: usize,
    dead_lettered: usize,
    open_conflicts: usize,
) -> String {
    if open_conflicts > 0 {
        return format!("{} conflict(s) need your decision", open_conflicts);
    }
    if dead_lettered > 0 {
        return format!("{} change(s) could not be synced", dead_lettered);
    }
    if !is_online {
        return match depth {
            0 => "Offline".to_string(),
            n => format!("Offline, {} change(s) waiting", n),
        };
    }
    if state.engine == EngineState::Draining {
        let settled = state.progress.completed + state.progress.failed;
        return format!("Syncing {} of {}", settled, state.progress.total);
    }
    match depth {
        0 => "All changes synced".to_string(),
        n => format!("{} change(s) pending", n),
    }
}
