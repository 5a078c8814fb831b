//! Common test utilities and helpers
//!
//! - `ScriptedApi`: a `RemoteApi` whose answers are scripted per entity id
//! - fast configurations (millisecond backoff, no jitter)
//! - manager fixtures over in-memory or file-backed databases

#![allow(dead_code)]

use async_trait::async_trait;
use claimsync::client::sync::{ApplyOutcome, NetworkStatus, RemoteApi, TransportError};
use claimsync::client::{Config, LocalDatabase, OfflineManager};
use claimsync::shared::config::{ConflictStrategy, SyncConfig};
use claimsync::shared::conflict::ServerSnapshot;
use claimsync::shared::mutation::MutationIntent;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

pub type Scripted = Result<ApplyOutcome, TransportError>;

/// One call received by [`ScriptedApi`]
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub intent: MutationIntent,
    /// Calls already running when this one started
    pub concurrent: usize,
}

/// Fake claims API.
///
/// Answers are popped from a per-entity-id script; an empty script answers
/// `Applied { version: None }`.
#[derive(Debug, Default)]
pub struct ScriptedApi {
    scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
    calls: Mutex<Vec<RecordedCall>>,
    running: Mutex<usize>,
    latency: Duration,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call sleeps for `latency` before answering
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    pub async fn script(&self, entity_id: &str, answers: impl IntoIterator<Item = Scripted>) {
        self.scripts
            .lock()
            .await
            .entry(entity_id.to_string())
            .or_default()
            .extend(answers);
    }

    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().await.clone()
    }

    pub async fn calls_for(&self, entity_id: &str) -> Vec<MutationIntent> {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|c| c.intent.entity_id == entity_id)
            .map(|c| c.intent.clone())
            .collect()
    }

    pub async fn max_concurrency(&self) -> usize {
        self.calls
            .lock()
            .await
            .iter()
            .map(|c| c.concurrent + 1)
            .max()
            .unwrap_or(0)
    }
}

#[async_trait]
impl RemoteApi for ScriptedApi {
    async fn apply(&self, intent: &MutationIntent) -> Result<ApplyOutcome, TransportError> {
        let concurrent = {
            let mut running = self.running.lock().await;
            let concurrent = *running;
            *running += 1;
            concurrent
        };
        self.calls.lock().await.push(RecordedCall {
            intent: intent.clone(),
            concurrent,
        });

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let answer = self
            .scripts
            .lock()
            .await
            .get_mut(&intent.entity_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Ok(ApplyOutcome::Applied { version: None }));

        *self.running.lock().await -= 1;
        answer
    }

    async fn health_check(&self) -> bool {
        true
    }
}

pub fn applied(version: &str) -> Scripted {
    Ok(ApplyOutcome::Applied {
        version: Some(version.to_string()),
    })
}

pub fn conflict(version: &str, body: Value) -> Scripted {
    Ok(ApplyOutcome::Conflict(ServerSnapshot {
        version: Some(version.to_string()),
        body,
    }))
}

pub fn network_error() -> Scripted {
    Err(TransportError::network("connection refused"))
}

pub fn http_error(status: u16) -> Scripted {
    Err(TransportError::from_status(status, format!("status {}", status)))
}

/// Millisecond backoff without jitter
pub fn fast_sync_config(max_retries: u32, strategy: ConflictStrategy) -> SyncConfig {
    SyncConfig::builder()
        .max_retries(max_retries)
        .base_delay(Duration::from_millis(5))
        .max_delay(Duration::from_millis(40))
        .jitter(0.0)
        .conflict_strategy(strategy)
        .build()
        .unwrap()
}

pub fn fast_config(max_retries: u32, strategy: ConflictStrategy) -> Config {
    Config::with_sync_config(fast_sync_config(max_retries, strategy)).unwrap()
}

/// Manager over an in-memory database, already online
pub async fn online_manager(config: Config, api: Arc<ScriptedApi>) -> OfflineManager {
    let db = LocalDatabase::in_memory().await.unwrap();
    let manager = OfflineManager::with_database(config, db, api).await.unwrap();
    go_online(&manager);
    manager
}

/// Manager over a database file, connectivity left offline
pub async fn file_manager(path: &Path, config: Config, api: Arc<ScriptedApi>) -> OfflineManager {
    let db = LocalDatabase::open(path).await.unwrap();
    OfflineManager::with_database(config, db, api).await.unwrap()
}

/// Publish online immediately, skipping the debounce window
pub fn go_online(manager: &OfflineManager) {
    manager.engine().monitor().force(NetworkStatus::Online);
}

pub fn go_offline(manager: &OfflineManager) {
    manager.engine().monitor().force(NetworkStatus::Offline);
}
