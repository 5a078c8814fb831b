//! # Conflict Resolution System
//!
//! Decides what happens to a queued write the server rejected because its
//! version of the record moved on.
//!
//! ## Features
//!
//! - **Strategies**: `local_wins`, `server_wins` or `manual`, switchable at
//!   runtime and persisted across restarts
//! - **Exclusivity**: At most one open conflict per record
//! - **Exactly-once Resolution**: A conflict is claimed before its outcome is
//!   applied, so a second resolve of the same id fails
//!
//! ## Usage
//!
//! ```rust,no_run
//! use claimsync::client::local_db::LocalDatabase;
//! use claimsync::client::sync::conflict_resolver::{ConflictResolver, Resolution};
//! use claimsync::shared::config::ConflictStrategy;
//! use claimsync::shared::conflict::ServerSnapshot;
//! # use claimsync::shared::mutation::MutationIntent;
//!
//! # async fn example(intent: MutationIntent) -> Result<(), Box<dyn std::error::Error>> {
//! let db = LocalDatabase::in_memory().await?;
//! let resolver = ConflictResolver::new(db, ConflictStrategy::Manual).await?;
//!
//! let snapshot = ServerSnapshot { version: Some("5".into()), body: serde_json::json!({}) };
//! match resolver.handle(&intent, snapshot).await? {
//!     Resolution::Deferred(conflict) => println!("waiting on user for {}", conflict.id),
//!     Resolution::Resubmit(corrective) => println!("resubmitting as {}", corrective.id),
//!     Resolution::Discard => println!("local edit dropped"),
//! }
//! # Ok(())
//! # }
//! ```

use crate::client::local_db::LocalDatabase;
use crate::shared::config::ConflictStrategy;
use crate::shared::conflict::{Conflict, ConflictId, ServerSnapshot};
use crate::shared::error::{SyncError, SyncResult};
use crate::shared::mutation::{EntityKey, MutationId, MutationIntent};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

/// What the engine must do with a rejected intent
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Replace the intent with this corrective copy
    Resubmit(MutationIntent),
    /// Drop the intent; the server state stands
    Discard,
    /// Keep the intent parked until the user resolves this conflict
    Deferred(Conflict),
}

/// Conflict resolution manager
#[derive(Debug)]
pub struct ConflictResolver {
    db: LocalDatabase,
    /// Process-wide policy
    strategy: RwLock<ConflictStrategy>,
    /// Open conflicts
    conflicts: RwLock<HashMap<ConflictId, Conflict>>,
    /// Conflicts being resolved right now. They still block their key.
    claimed: RwLock<HashMap<ConflictId, Conflict>>,
}

impl ConflictResolver {
    /// Load the persisted strategy (falling back to `default_strategy`) and
    /// the open conflicts
    pub async fn new(db: LocalDatabase, default_strategy: ConflictStrategy) -> SyncResult<Self> {
        let strategy = db.get_conflict_strategy().await?.unwrap_or(default_strategy);
        let conflicts = db
            .load_conflicts()
            .await?
            .into_iter()
            .map(|c| (c.id, c))
            .collect::<HashMap<_, _>>();

        if !conflicts.is_empty() {
            tracing::info!(open = conflicts.len(), strategy = strategy.as_str(), "Restored open conflicts");
        }

        Ok(Self {
            db,
            strategy: RwLock::new(strategy),
            conflicts: RwLock::new(conflicts),
            claimed: RwLock::new(HashMap::new()),
        })
    }

    pub async fn strategy(&self) -> ConflictStrategy {
        *self.strategy.read().await
    }

    /// Switch the policy. Already open conflicts stay open.
    pub async fn set_strategy(&self, strategy: ConflictStrategy) -> SyncResult<()> {
        let mut current = self.strategy.write().await;
        self.db.set_conflict_strategy(strategy).await?;
        *current = strategy;
        tracing::info!(strategy = strategy.as_str(), "Conflict strategy changed");
        Ok(())
    }

    /// Apply the current policy to a rejected intent
    pub async fn handle(&self, intent: &MutationIntent, snapshot: ServerSnapshot) -> SyncResult<Resolution> {
        let strategy = self.strategy().await;
        tracing::info!(
            mutation_id = %intent.id,
            entity = %intent.entity,
            entity_id = %intent.entity_id,
            base_version = ?intent.base_version,
            server_version = ?snapshot.version,
            strategy = strategy.as_str(),
            "Version conflict"
        );

        match strategy {
            ConflictStrategy::LocalWins => Ok(Resolution::Resubmit(intent.corrective(snapshot.version))),
            ConflictStrategy::ServerWins => Ok(Resolution::Discard),
            ConflictStrategy::Manual => {
                let conflict = Conflict::from_rejection(intent, snapshot);
                self.open(conflict.clone()).await?;
                Ok(Resolution::Deferred(conflict))
            }
        }
    }

    async fn open(&self, conflict: Conflict) -> SyncResult<()> {
        let mut conflicts = self.conflicts.write().await;
        let key = conflict.key();
        let already_open = conflicts.values().any(|c| c.key() == key)
            || self.claimed.read().await.values().any(|c| c.key() == key);
        if already_open {
            return Err(SyncError::ConflictAlreadyOpen(key.to_string()));
        }

        self.db.insert_conflict(&conflict).await?;
        conflicts.insert(conflict.id, conflict);
        Ok(())
    }

    /// Take exclusive ownership of an open conflict for resolution.
    ///
    /// Follow with [`complete`](Self::complete) once the outcome has been
    /// applied, or [`abandon`](Self::abandon) if applying it failed.
    pub async fn claim(&self, id: &ConflictId) -> SyncResult<Conflict> {
        let mut conflicts = self.conflicts.write().await;
        let conflict = conflicts
            .remove(id)
            .ok_or_else(|| SyncError::ConflictNotFound(id.to_string()))?;
        self.claimed.write().await.insert(conflict.id, conflict.clone());
        Ok(conflict)
    }

    /// Delete a claimed conflict for good
    pub async fn complete(&self, conflict: &Conflict) -> SyncResult<()> {
        self.db.delete_conflict(&conflict.id).await?;
        self.claimed.write().await.remove(&conflict.id);
        tracing::info!(conflict_id = %conflict.id, entity_id = %conflict.entity_id, "Conflict resolved");
        Ok(())
    }

    /// Return a claimed conflict to the open set
    pub async fn abandon(&self, conflict: Conflict) {
        let mut conflicts = self.conflicts.write().await;
        self.claimed.write().await.remove(&conflict.id);
        conflicts.insert(conflict.id, conflict);
    }

    /// Drop the conflicts attached to an intent the user discarded
    pub async fn remove_for_mutation(&self, mutation_id: &MutationId) -> SyncResult<usize> {
        let mut conflicts = self.conflicts.write().await;
        self.db.delete_conflicts_for_mutation(mutation_id).await?;
        let before = conflicts.len();
        conflicts.retain(|_, c| c.mutation_id != *mutation_id);
        Ok(before - conflicts.len())
    }

    pub async fn remove_all(&self) -> SyncResult<usize> {
        let mut conflicts = self.conflicts.write().await;
        self.db.delete_all_conflicts().await?;
        let removed = conflicts.len();
        conflicts.clear();
        Ok(removed)
    }

    /// Drop conflicts whose intent is no longer queued. Returns how many.
    pub async fn drop_orphans(&self, queued: &HashSet<MutationId>) -> SyncResult<usize> {
        let mut conflicts = self.conflicts.write().await;
        let orphans: Vec<ConflictId> = conflicts
            .values()
            .filter(|c| !queued.contains(&c.mutation_id))
            .map(|c| c.id)
            .collect();

        for id in &orphans {
            self.db.delete_conflict(id).await?;
            conflicts.remove(id);
            tracing::warn!(conflict_id = %id, "Dropped conflict without a queued mutation");
        }
        Ok(orphans.len())
    }

    pub async fn has_conflict_for(&self, mutation_id: &MutationId) -> bool {
        let open = self.conflicts.read().await.values().any(|c| c.mutation_id == *mutation_id);
        open || self.claimed.read().await.values().any(|c| c.mutation_id == *mutation_id)
    }

    /// Keys that must not run while their conflict is open
    pub async fn blocked_keys(&self) -> HashSet<EntityKey> {
        let mut keys: HashSet<EntityKey> = self.conflicts.read().await.values().map(Conflict::key).collect();
        keys.extend(self.claimed.read().await.values().map(Conflict::key));
        keys
    }

    pub async fn get(&self, id: &ConflictId) -> Option<Conflict> {
        self.conflicts.read().await.get(id).cloned()
    }

    /// Open conflicts, oldest first
    pub async fn list(&self) -> Vec<Conflict> {
        let mut conflicts: Vec<Conflict> = self.conflicts.read().await.values().cloned().collect();
        conflicts.sort_by_key(|c| c.detected_at);
        conflicts
    }

    pub async fn count(&self) -> usize {
        self.conflicts.read().await.len()
    }
}
