//! # Offline Mutation System
//!
//! Offline-first writes for the claims dashboard: every create, update or
//! delete becomes a durable mutation intent that the sync engine replays once
//! the server is reachable.
//!
//! ## Architecture
//!
//! The offline system consists of:
//! - **Action Queue**: Durable FIFO of intents with a per-record ready rule
//! - **Storage Quota**: Byte budget checked on every enqueue
//! - **Retry Logic**: Exponential backoff with capped jitter
//!
//! `OfflineManager` is the facade the UI talks to. It owns the queue and the
//! sync engine and exposes the user-facing operations (enqueue, conflict
//! resolution, dead-letter handling, capabilities).
//!
//! ## Usage
//!
//! ```rust,no_run
//! use claimsync::client::api_client::HttpRemoteApi;
//! use claimsync::client::config::Config;
//! use claimsync::client::offline::OfflineManager;
//! use claimsync::shared::mutation::{EntityKind, OperationKind};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::from_env()?;
//! let api = Arc::new(HttpRemoteApi::new(config.clone())?);
//! let manager = OfflineManager::open(config, api).await?;
//!
//! manager
//!     .enqueue_mutation(EntityKind::Claim, OperationKind::Create, json!({ "title": "Water damage" }), None)
//!     .await?;
//! manager.sync_now().await?;
//! # Ok(())
//! # }
//! ```

pub mod queue;
pub mod quota;
pub mod retry;

pub use queue::{ActionQueue, QueueStats, RetryDecision};
pub use quota::StorageQuota;
pub use retry::BackoffStrategy;

use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;

use crate::client::config::Config;
use crate::client::local_db::LocalDatabase;
use crate::client::sync::{
    ConflictResolver, NetworkMonitor, NetworkStatus, RemoteApi, SyncEngine, SyncEvent, SyncState,
    SyncStatusReport,
};
use crate::shared::config::{ConflictStrategy, OfflineCapabilities};
use crate::shared::conflict::{Conflict, ConflictId, ResolutionChoice};
use crate::shared::error::{SyncError, SyncResult};
use crate::shared::mutation::{EntityKind, MutationId, MutationIntent, OperationKind};

/// Main offline manager coordinating queue, engine and capabilities
#[derive(Debug)]
pub struct OfflineManager {
    config: Config,
    db: LocalDatabase,
    engine: Arc<SyncEngine>,
    capabilities: RwLock<OfflineCapabilities>,
    /// Background sync worker, if started
    worker: RwLock<Option<JoinHandle<()>>>,
}

impl OfflineManager {
    /// Open the queue database at `config.db_path()` and restore its state
    pub async fn open(config: Config, api: Arc<dyn RemoteApi>) -> SyncResult<Self> {
        let db = LocalDatabase::open(config.db_path()).await?;
        Self::with_database(config, db, api).await
    }

    /// Build on an already opened database.
    ///
    /// Restores queued intents, open conflicts, the conflict strategy and the
    /// capabilities, then reconciles them. The connectivity monitor starts
    /// offline until the first report.
    pub async fn with_database(config: Config, db: LocalDatabase, api: Arc<dyn RemoteApi>) -> SyncResult<Self> {
        let sync = config.sync().clone();

        let capabilities = match db.get_capabilities().await? {
            Some(stored) => stored,
            None => sync.capabilities.clone(),
        };

        let quota = Arc::new(StorageQuota::new(capabilities.storage_quota));
        let queue = Arc::new(ActionQueue::new(db.clone(), quota));
        queue.load().await?;

        let resolver = Arc::new(ConflictResolver::new(db.clone(), sync.conflict_strategy).await?);
        let monitor = Arc::new(NetworkMonitor::new(NetworkStatus::Offline, sync.debounce));

        let engine = Arc::new(SyncEngine::new(sync, db.clone(), queue, resolver, api, monitor));
        engine.recover().await?;

        Ok(Self {
            config,
            db,
            engine,
            capabilities: RwLock::new(capabilities),
            worker: RwLock::new(None),
        })
    }

    /// Record a local write and schedule it for sync.
    ///
    /// The intent is durable when this returns. Fails with
    /// `CapabilityDisabled`, `InvalidPayload` or `QuotaExceeded`; nothing is
    /// queued in those cases.
    pub async fn enqueue_mutation(
        &self,
        entity: EntityKind,
        operation: OperationKind,
        payload: serde_json::Value,
        base_version: Option<String>,
    ) -> SyncResult<MutationId> {
        self.check_capability(entity, operation).await?;

        let intent = MutationIntent::new(
            entity,
            operation,
            payload,
            base_version,
            self.config.sync().max_retries,
        )?;
        let id = self.engine.queue().enqueue(intent).await?;
        self.engine.trigger();
        Ok(id)
    }

    async fn check_capability(&self, entity: EntityKind, operation: OperationKind) -> SyncResult<()> {
        let capabilities = self.capabilities.read().await;
        match (entity, operation) {
            (EntityKind::Claim, OperationKind::Create) if !capabilities.can_create_claims => {
                Err(SyncError::capability_disabled("can_create_claims"))
            }
            (EntityKind::Document, _) if !capabilities.can_upload_documents => {
                Err(SyncError::capability_disabled("can_upload_documents"))
            }
            _ => Ok(()),
        }
    }

    pub fn get_sync_state(&self) -> SyncState {
        self.engine.state()
    }

    /// Open conflicts, oldest first
    pub async fn list_conflicts(&self) -> Vec<Conflict> {
        self.engine.resolver().list().await
    }

    pub async fn resolve_conflict(&self, conflict_id: &ConflictId, choice: ResolutionChoice) -> SyncResult<()> {
        self.engine.resolve_conflict(conflict_id, choice).await
    }

    pub async fn status_report(&self) -> SyncStatusReport {
        self.engine.reporter().report().await
    }

    /// Switch the process-wide conflict strategy. Already open conflicts stay
    /// open until resolved.
    pub async fn set_conflict_strategy(&self, strategy: ConflictStrategy) -> SyncResult<()> {
        self.engine.resolver().set_strategy(strategy).await
    }

    pub async fn conflict_strategy(&self) -> ConflictStrategy {
        self.engine.resolver().strategy().await
    }

    /// Current capabilities with `used_storage` filled in
    pub async fn capabilities(&self) -> OfflineCapabilities {
        let mut capabilities = self.capabilities.read().await.clone();
        capabilities.used_storage = self.engine.queue().quota().used();
        capabilities
    }

    /// Replace the capabilities and persist them. A new `storage_quota`
    /// applies to the next enqueue; queued intents are never evicted.
    pub async fn update_capabilities(&self, capabilities: OfflineCapabilities) -> SyncResult<()> {
        if capabilities.storage_quota == 0 {
            return Err(SyncError::Config {
                message: "storage_quota must be greater than zero".to_string(),
            });
        }

        let mut current = self.capabilities.write().await;
        self.db.set_capabilities(&capabilities).await?;
        self.engine.queue().quota().set_quota(capabilities.storage_quota);

        tracing::info!(
            can_create_claims = capabilities.can_create_claims,
            can_upload_documents = capabilities.can_upload_documents,
            storage_quota = capabilities.storage_quota,
            "Updated offline capabilities"
        );
        *current = capabilities;
        Ok(())
    }

    /// Give a dead-lettered intent a fresh retry budget.
    /// Returns `false` if the intent was not dead-lettered.
    pub async fn retry_dead_letter(&self, id: &MutationId) -> SyncResult<bool> {
        let reset = self.engine.queue().retry_dead_letter(id).await?;
        if reset {
            tracing::info!(mutation_id = %id, "Retrying dead-lettered mutation");
            self.engine.after_user_action().await;
        }
        Ok(reset)
    }

    /// Drop one queued intent and any conflict opened for it
    pub async fn discard(&self, id: &MutationId) -> SyncResult<MutationIntent> {
        let intent = self.engine.queue().discard(id).await?;
        self.engine.resolver().remove_for_mutation(id).await?;
        self.engine.after_user_action().await;
        Ok(intent)
    }

    /// Drop every queued intent and every open conflict
    pub async fn discard_all(&self) -> SyncResult<Vec<MutationIntent>> {
        let discarded = self.engine.queue().discard_all().await?;
        self.engine.resolver().remove_all().await?;
        self.engine.after_user_action().await;
        Ok(discarded)
    }

    pub async fn dead_letters(&self) -> Vec<MutationIntent> {
        self.engine.queue().dead_letters().await
    }

    pub async fn pending(&self) -> Vec<MutationIntent> {
        self.engine.queue().pending().await
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.engine.subscribe_events()
    }

    /// Feed a raw connectivity signal. Published after the debounce window.
    pub fn set_online(&self, online: bool) {
        self.engine.monitor().report(online);
    }

    pub fn is_online(&self) -> bool {
        self.engine.monitor().is_online()
    }

    /// Spawn the background sync worker. No-op if it is already running.
    pub async fn start(&self) {
        let mut worker = self.worker.write().await;
        if worker.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        *worker = Some(self.engine.start());
    }

    /// Stop the background sync worker. Queued intents stay queued and a
    /// pass in progress is interrupted before this returns.
    pub async fn stop(&self) {
        let handle = self.worker.write().await.take();
        if let Some(handle) = handle {
            self.engine.stop(handle).await;
        }
    }

    /// Drain now instead of waiting for the worker
    pub async fn sync_now(&self) -> SyncResult<()> {
        self.engine.drain().await
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::sync::{ApplyOutcome, TransportError};
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use serde_json::json;

    #[derive(Debug)]
    struct AcceptAll;

    #[async_trait]
    impl RemoteApi for AcceptAll {
        async fn apply(&self, _intent: &MutationIntent) -> Result<ApplyOutcome, TransportError> {
            Ok(ApplyOutcome::Applied { version: None })
        }

        async fn health_check(&self) -> bool {
            true
        }
    }

    async fn manager() -> OfflineManager {
        let db = LocalDatabase::in_memory().await.unwrap();
        OfflineManager::with_database(Config::new(), db, Arc::new(AcceptAll))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_enqueue_is_visible_as_pending() {
        let manager = manager().await;
        let id = manager
            .enqueue_mutation(EntityKind::Claim, OperationKind::Create, json!({ "title": "Hail" }), None)
            .await
            .unwrap();

        let pending = manager.pending().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id);
        assert!(manager.capabilities().await.used_storage > 0);
    }

    #[tokio::test]
    async fn test_disabled_capabilities_reject_mutations() {
        let manager = manager().await;
        manager
            .update_capabilities(OfflineCapabilities {
                can_create_claims: false,
                can_upload_documents: false,
                ..OfflineCapabilities::default()
            })
            .await
            .unwrap();

        let claim = manager
            .enqueue_mutation(EntityKind::Claim, OperationKind::Create, json!({}), None)
            .await;
        assert_matches!(claim, Err(SyncError::CapabilityDisabled { .. }));

        let document = manager
            .enqueue_mutation(EntityKind::Document, OperationKind::Update, json!({ "id": "D1" }), None)
            .await;
        assert_matches!(document, Err(SyncError::CapabilityDisabled { .. }));

        // Updating an existing claim is still allowed.
        manager
            .enqueue_mutation(EntityKind::Claim, OperationKind::Update, json!({ "id": "C1" }), Some("1".into()))
            .await
            .unwrap();
        assert_eq!(manager.pending().await.len(), 1);
    }

    #[tokio::test]
    async fn test_quota_update_applies_to_next_enqueue() {
        let manager = manager().await;
        manager
            .update_capabilities(OfflineCapabilities {
                storage_quota: 16,
                ..OfflineCapabilities::default()
            })
            .await
            .unwrap();

        let result = manager
            .enqueue_mutation(
                EntityKind::Document,
                OperationKind::Create,
                json!({ "name": "photo.jpg", "content": "x".repeat(64) }),
                None,
            )
            .await;
        assert_matches!(result, Err(SyncError::QuotaExceeded { .. }));
        assert!(manager.pending().await.is_empty());
    }

    #[tokio::test]
    async fn test_capabilities_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.db");

        {
            let db = LocalDatabase::open(&path).await.unwrap();
            let manager = OfflineManager::with_database(Config::new(), db, Arc::new(AcceptAll))
                .await
                .unwrap();
            manager
                .update_capabilities(OfflineCapabilities {
                    can_view_data: false,
                    storage_quota: 4096,
                    ..OfflineCapabilities::default()
                })
                .await
                .unwrap();
        }

        let db = LocalDatabase::open(&path).await.unwrap();
        let manager = OfflineManager::with_database(Config::new(), db, Arc::new(AcceptAll))
            .await
            .unwrap();
        let capabilities = manager.capabilities().await;
        assert!(!capabilities.can_view_data);
        assert_eq!(capabilities.storage_quota, 4096);
    }

    #[tokio::test]
    async fn test_discard_releases_storage() {
        let manager = manager().await;
        let id = manager
            .enqueue_mutation(EntityKind::Claim, OperationKind::Create, json!({ "title": "Flood" }), None)
            .await
            .unwrap();

        let discarded = manager.discard(&id).await.unwrap();
        assert_eq!(discarded.id, id);
        assert_eq!(manager.capabilities().await.used_storage, 0);
        assert_matches!(manager.discard(&id).await, Err(SyncError::MutationNotFound(_)));
    }

    #[tokio::test]
    async fn test_sync_now_is_noop_while_offline() {
        let manager = manager().await;
        manager
            .enqueue_mutation(EntityKind::Claim, OperationKind::Create, json!({ "title": "Fire" }), None)
            .await
            .unwrap();

        tokio_test::assert_ok!(manager.sync_now().await);
        assert!(!manager.is_online());
        assert_eq!(manager.pending().await.len(), 1);
    }
}
