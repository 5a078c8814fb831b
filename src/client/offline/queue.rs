//! # Persistent Action Queue
//!
//! Queues mutation intents until the server has confirmed them. Every change
//! is written to SQLite before the in-memory mirror is touched, so the queue
//! survives restarts and crashes.
//!
//! ## Features
//!
//! - **Persistent Queue**: Intents survive app restarts
//! - **Per-entity FIFO**: An intent never runs while an earlier intent for the
//!   same record is still queued
//! - **Backoff Tracking**: Failed intents wait out their delay in place
//! - **Quota**: Enqueue is admitted against the storage quota
//!
//! ## Usage
//!
//! ```rust,no_run
//! use claimsync::client::local_db::LocalDatabase;
//! use claimsync::client::offline::queue::ActionQueue;
//! use claimsync::client::offline::quota::StorageQuota;
//! use claimsync::shared::mutation::{EntityKind, MutationIntent, OperationKind};
//! use std::collections::HashSet;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = LocalDatabase::in_memory().await?;
//! let queue = ActionQueue::new(db, Arc::new(StorageQuota::new(50 * 1024 * 1024)));
//! queue.load().await?;
//!
//! let intent = MutationIntent::new(
//!     EntityKind::Claim,
//!     OperationKind::Create,
//!     serde_json::json!({ "title": "Water damage" }),
//!     None,
//!     5,
//! )?;
//! queue.enqueue(intent).await?;
//!
//! let ready = queue.take_ready(&HashSet::new(), 5, tokio::time::Instant::now()).await;
//! for intent in ready {
//!     // Apply remotely...
//!     queue.remove(&intent.id).await?;
//! }
//! # Ok(())
//! # }
//! ```

use crate::client::local_db::LocalDatabase;
use crate::client::offline::quota::StorageQuota;
use crate::shared::error::{SyncError, SyncResult};
use crate::shared::mutation::{EntityKey, IntentState, MutationId, MutationIntent};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Operation queue for offline mutations
#[derive(Debug)]
pub struct ActionQueue {
    /// Durable storage
    db: LocalDatabase,
    /// Queued intents in FIFO order
    entries: RwLock<VecDeque<QueueEntry>>,
    /// Byte budget shared with the facade
    quota: Arc<StorageQuota>,
}

/// Queued intent with its runtime bookkeeping
#[derive(Debug, Clone)]
struct QueueEntry {
    intent: MutationIntent,
    /// Handed to the engine and not yet settled
    in_flight: bool,
    /// Earliest time of the next attempt. Not persisted; a restart retries
    /// immediately.
    not_before: Option<Instant>,
}

impl QueueEntry {
    fn new(intent: MutationIntent) -> Self {
        Self {
            intent,
            in_flight: false,
            not_before: None,
        }
    }

    fn is_backing_off(&self, now: Instant) -> bool {
        self.not_before.is_some_and(|at| at > now)
    }
}

/// Result of recording a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDecision {
    /// Attempts that have failed so far
    pub retry_count: u32,
    /// `retry_count >= max_retries`; the intent must be dead-lettered
    pub exhausted: bool,
}

/// Queue statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// All queued intents, whatever their state
    pub depth: usize,
    pub pending: usize,
    pub in_flight: usize,
    pub backing_off: usize,
    pub conflicted: usize,
    pub dead_lettered: usize,
    pub used_bytes: u64,
    pub quota_bytes: u64,
}

impl ActionQueue {
    /// Create an empty queue. Call [`load`](Self::load) to restore persisted rows.
    pub fn new(db: LocalDatabase, quota: Arc<StorageQuota>) -> Self {
        Self {
            db,
            entries: RwLock::new(VecDeque::new()),
            quota,
        }
    }

    /// Rebuild the mirror from the database and recompute quota usage
    pub async fn load(&self) -> SyncResult<usize> {
        let stored = self.db.load_intents().await?;
        let used: u64 = stored.iter().map(|s| s.intent.payload_bytes).sum();

        let mut entries = self.entries.write().await;
        *entries = stored.into_iter().map(|s| QueueEntry::new(s.intent)).collect();
        self.quota.restore(used);

        tracing::info!(queued = entries.len(), used_bytes = used, "Restored offline queue");
        Ok(entries.len())
    }

    /// Admit an intent against the quota and append it durably.
    ///
    /// The mirror lock is held across the INSERT so the mirror order always
    /// matches the database `seq` order.
    pub async fn enqueue(&self, intent: MutationIntent) -> SyncResult<MutationId> {
        let bytes = intent.payload_bytes;
        if !self.quota.reserve(bytes) {
            return Err(SyncError::quota_exceeded(bytes, self.quota.available()));
        }

        let mut entries = self.entries.write().await;
        if let Err(e) = self.db.insert_intent(&intent).await {
            self.quota.release(bytes);
            return Err(e.into());
        }

        let id = intent.id;
        tracing::debug!(
            mutation_id = %id,
            entity = %intent.entity,
            entity_id = %intent.entity_id,
            operation = %intent.operation,
            bytes,
            "Queued mutation"
        );
        entries.push_back(QueueEntry::new(intent));
        Ok(id)
    }

    /// Intents eligible to run now, at most one per entity, in FIFO order.
    ///
    /// An intent is eligible when it is pending, not in flight, not waiting
    /// on backoff, its key is not in `blocked`, and no earlier intent for the
    /// same key is still queued.
    pub async fn peek_ready(&self, blocked: &HashSet<EntityKey>, now: Instant) -> Vec<MutationIntent> {
        let entries = self.entries.read().await;
        Self::ready_positions(&entries, blocked, now, usize::MAX)
            .into_iter()
            .map(|i| entries[i].intent.clone())
            .collect()
    }

    /// Like [`peek_ready`](Self::peek_ready), but marks up to `limit` intents in flight
    pub async fn take_ready(
        &self,
        blocked: &HashSet<EntityKey>,
        limit: usize,
        now: Instant,
    ) -> Vec<MutationIntent> {
        let mut entries = self.entries.write().await;
        let positions = Self::ready_positions(&entries, blocked, now, limit);
        positions
            .into_iter()
            .map(|i| {
                let entry = &mut entries[i];
                entry.in_flight = true;
                entry.not_before = None;
                entry.intent.clone()
            })
            .collect()
    }

    fn ready_positions(
        entries: &VecDeque<QueueEntry>,
        blocked: &HashSet<EntityKey>,
        now: Instant,
        limit: usize,
    ) -> Vec<usize> {
        let mut seen = HashSet::new();
        let mut ready = Vec::new();

        for (i, entry) in entries.iter().enumerate() {
            if ready.len() >= limit {
                break;
            }
            let key = entry.intent.key();
            // Only the head of each key may run.
            if !seen.insert(key.clone()) {
                continue;
            }
            if entry.intent.is_pending()
                && !entry.in_flight
                && !entry.is_backing_off(now)
                && !blocked.contains(&key)
            {
                ready.push(i);
            }
        }

        ready
    }

    /// Delete an applied or discarded intent and release its bytes
    pub async fn remove(&self, id: &MutationId) -> SyncResult<Option<MutationIntent>> {
        let mut entries = self.entries.write().await;
        self.db.delete_intent(id).await?;

        let Some(pos) = entries.iter().position(|e| e.intent.id == *id) else {
            return Ok(None);
        };
        let removed = entries.remove(pos).map(|e| e.intent);
        if let Some(intent) = &removed {
            self.quota.release(intent.payload_bytes);
        }
        Ok(removed)
    }

    /// Record a failed attempt
    pub async fn mark_retry(&self, id: &MutationId, error: &str) -> SyncResult<RetryDecision> {
        let mut entries = self.entries.write().await;
        let entry = Self::find_mut(&mut entries, id)?;

        let retry_count = entry.intent.retry_count.saturating_add(1);
        self.db.record_intent_retry(id, retry_count, Some(error)).await?;

        entry.intent.retry_count = retry_count;
        entry.intent.last_error = Some(error.to_string());
        Ok(RetryDecision {
            retry_count,
            exhausted: retry_count >= entry.intent.max_retries,
        })
    }

    /// Release an in-flight intent and hold it back until `until`
    pub async fn defer(&self, id: &MutationId, until: Instant) -> SyncResult<()> {
        let mut entries = self.entries.write().await;
        let entry = Self::find_mut(&mut entries, id)?;
        entry.in_flight = false;
        entry.not_before = Some(until);
        Ok(())
    }

    /// Release an in-flight intent untouched. Missing ids are ignored.
    pub async fn release_in_flight(&self, id: &MutationId) {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.iter_mut().find(|e| e.intent.id == *id) {
            entry.in_flight = false;
        }
    }

    /// Release every in-flight intent (connectivity loss)
    pub async fn release_all_in_flight(&self) -> usize {
        let mut entries = self.entries.write().await;
        let mut released = 0;
        for entry in entries.iter_mut().filter(|e| e.in_flight) {
            entry.in_flight = false;
            released += 1;
        }
        released
    }

    pub async fn mark_dead(&self, id: &MutationId, reason: &str) -> SyncResult<()> {
        self.set_state(id, IntentState::DeadLettered, Some(reason)).await
    }

    pub async fn mark_conflicted(&self, id: &MutationId) -> SyncResult<()> {
        self.set_state(id, IntentState::Conflicted, None).await
    }

    /// Return a conflicted intent to the pending state
    pub async fn mark_pending(&self, id: &MutationId) -> SyncResult<()> {
        self.set_state(id, IntentState::Pending, None).await
    }

    async fn set_state(&self, id: &MutationId, state: IntentState, reason: Option<&str>) -> SyncResult<()> {
        let mut entries = self.entries.write().await;
        let entry = Self::find_mut(&mut entries, id)?;
        self.db.set_intent_state(id, state, reason).await?;

        entry.intent.state = state;
        entry.in_flight = false;
        entry.not_before = None;
        if let Some(reason) = reason {
            entry.intent.last_error = Some(reason.to_string());
        }
        Ok(())
    }

    /// Replace an intent by its corrective copy at the same queue position
    pub async fn supersede(&self, old_id: &MutationId, corrective: MutationIntent) -> SyncResult<MutationId> {
        let mut entries = self.entries.write().await;
        let entry = Self::find_mut(&mut entries, old_id)?;
        if !self.db.supersede_intent(old_id, &corrective).await? {
            return Err(SyncError::MutationNotFound(old_id.to_string()));
        }

        let new_id = corrective.id;
        tracing::debug!(old_id = %old_id, new_id = %new_id, "Superseded mutation");
        *entry = QueueEntry::new(corrective);
        Ok(new_id)
    }

    /// Reset a dead-lettered intent so the next pass runs it again.
    /// Returns `false` if the intent was not dead-lettered.
    pub async fn retry_dead_letter(&self, id: &MutationId) -> SyncResult<bool> {
        let mut entries = self.entries.write().await;
        let entry = Self::find_mut(&mut entries, id)?;
        if entry.intent.state != IntentState::DeadLettered {
            return Ok(false);
        }

        self.db.reset_intent(id).await?;
        entry.intent.state = IntentState::Pending;
        entry.intent.retry_count = 0;
        entry.intent.last_error = None;
        entry.not_before = None;
        Ok(true)
    }

    /// Drop an intent on explicit user request. An intent whose remote call
    /// is still running cannot be discarded; its key stays reserved until the
    /// call settles.
    pub async fn discard(&self, id: &MutationId) -> SyncResult<MutationIntent> {
        let mut entries = self.entries.write().await;
        let pos = entries
            .iter()
            .position(|e| e.intent.id == *id)
            .ok_or_else(|| SyncError::MutationNotFound(id.to_string()))?;
        if entries[pos].in_flight {
            return Err(SyncError::MutationInFlight(id.to_string()));
        }

        self.db.delete_intent(id).await?;
        let intent = entries
            .remove(pos)
            .map(|e| e.intent)
            .ok_or_else(|| SyncError::MutationNotFound(id.to_string()))?;
        self.quota.release(intent.payload_bytes);
        tracing::info!(mutation_id = %id, entity = %intent.entity, entity_id = %intent.entity_id, "Discarded mutation");
        Ok(intent)
    }

    /// Drop every queued intent. Returns the discarded intents.
    ///
    /// Refused while any intent is in flight; nothing is dropped in that case.
    pub async fn discard_all(&self) -> SyncResult<Vec<MutationIntent>> {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.iter().find(|e| e.in_flight) {
            return Err(SyncError::MutationInFlight(entry.intent.id.to_string()));
        }
        self.db.delete_all_intents().await?;

        let discarded: Vec<MutationIntent> = entries.drain(..).map(|e| e.intent).collect();
        // Reservations held by enqueues waiting on the lock stay counted.
        self.quota.release(discarded.iter().map(|i| i.payload_bytes).sum());
        tracing::info!(count = discarded.len(), "Discarded all queued mutations");
        Ok(discarded)
    }

    fn find_mut<'a>(entries: &'a mut VecDeque<QueueEntry>, id: &MutationId) -> SyncResult<&'a mut QueueEntry> {
        entries
            .iter_mut()
            .find(|e| e.intent.id == *id)
            .ok_or_else(|| SyncError::MutationNotFound(id.to_string()))
    }

    pub async fn get(&self, id: &MutationId) -> Option<MutationIntent> {
        let entries = self.entries.read().await;
        entries.iter().find(|e| e.intent.id == *id).map(|e| e.intent.clone())
    }

    /// Every queued intent in FIFO order
    pub async fn list(&self) -> Vec<MutationIntent> {
        self.entries.read().await.iter().map(|e| e.intent.clone()).collect()
    }

    pub async fn pending(&self) -> Vec<MutationIntent> {
        self.list_in_state(IntentState::Pending).await
    }

    pub async fn dead_letters(&self) -> Vec<MutationIntent> {
        self.list_in_state(IntentState::DeadLettered).await
    }

    pub async fn conflicted(&self) -> Vec<MutationIntent> {
        self.list_in_state(IntentState::Conflicted).await
    }

    async fn list_in_state(&self, state: IntentState) -> Vec<MutationIntent> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .filter(|e| e.intent.state == state)
            .map(|e| e.intent.clone())
            .collect()
    }

    /// Whether any intent still waits to be applied
    pub async fn has_pending(&self) -> bool {
        self.entries.read().await.iter().any(|e| e.intent.is_pending())
    }

    /// Earliest backoff deadline among pending intents that are waiting
    pub async fn next_backoff_deadline(&self, now: Instant) -> Option<Instant> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .filter(|e| e.intent.is_pending() && !e.in_flight)
            .filter_map(|e| e.not_before.filter(|at| *at > now))
            .min()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Get queue statistics
    pub async fn stats(&self) -> QueueStats {
        let entries = self.entries.read().await;
        let now = Instant::now();
        let mut stats = QueueStats {
            depth: entries.len(),
            used_bytes: self.quota.used(),
            quota_bytes: self.quota.quota(),
            ..QueueStats::default()
        };

        for entry in entries.iter() {
            match entry.intent.state {
                IntentState::Pending => stats.pending += 1,
                IntentState::Conflicted => stats.conflicted += 1,
                IntentState::DeadLettered => stats.dead_lettered += 1,
            }
            if entry.in_flight {
                stats.in_flight += 1;
            }
            if entry.is_backing_off(now) {
                stats.backing_off += 1;
            }
        }

        stats
    }

    pub fn quota(&self) -> &Arc<StorageQuota> {
        &self.quota
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::mutation::{EntityKind, OperationKind};
    use assert_matches::assert_matches;
    use serde_json::json;
    use std::time::Duration;

    async fn new_queue(quota: u64) -> ActionQueue {
        let db = LocalDatabase::in_memory().await.unwrap();
        let queue = ActionQueue::new(db, Arc::new(StorageQuota::new(quota)));
        queue.load().await.unwrap();
        queue
    }

    fn update(id: &str, field: &str) -> MutationIntent {
        MutationIntent::new(
            EntityKind::Claim,
            OperationKind::Update,
            json!({ "id": id, "field": field }),
            Some("1".to_string()),
            3,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_one_ready_intent_per_key() {
        let queue = new_queue(1 << 20).await;
        let a1 = update("A", "first");
        let a2 = update("A", "second");
        let b1 = update("B", "first");
        queue.enqueue(a1.clone()).await.unwrap();
        queue.enqueue(a2.clone()).await.unwrap();
        queue.enqueue(b1.clone()).await.unwrap();

        let ready = queue.take_ready(&HashSet::new(), 10, Instant::now()).await;
        let ids: Vec<_> = ready.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![a1.id, b1.id]);

        // A's head is in flight, so A2 must wait.
        assert!(queue.peek_ready(&HashSet::new(), Instant::now()).await.is_empty());

        queue.remove(&a1.id).await.unwrap();
        let ready = queue.peek_ready(&HashSet::new(), Instant::now()).await;
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].id, a2.id);
    }

    #[tokio::test]
    async fn test_take_ready_respects_limit_and_blocked() {
        let queue = new_queue(1 << 20).await;
        let a = update("A", "x");
        let b = update("B", "x");
        let c = update("C", "x");
        for intent in [&a, &b, &c] {
            queue.enqueue(intent.clone()).await.unwrap();
        }

        let blocked: HashSet<_> = [a.key()].into_iter().collect();
        let ready = queue.take_ready(&blocked, 1, Instant::now()).await;
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].id, b.id);
        assert_eq!(queue.stats().await.in_flight, 1);
    }

    #[tokio::test]
    async fn test_quota_rejection_leaves_queue_unchanged() {
        let intent = update("A", "x");
        let queue = new_queue(intent.payload_bytes + 5).await;

        queue.enqueue(intent).await.unwrap();
        let result = queue.enqueue(update("B", "y")).await;

        assert_matches!(result, Err(SyncError::QuotaExceeded { .. }));
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test]
    async fn test_remove_releases_quota() {
        let queue = new_queue(1 << 20).await;
        let intent = update("A", "x");
        queue.enqueue(intent.clone()).await.unwrap();
        assert_eq!(queue.quota().used(), intent.payload_bytes);

        queue.remove(&intent.id).await.unwrap();
        assert_eq!(queue.quota().used(), 0);
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_mark_retry_until_exhausted() {
        let queue = new_queue(1 << 20).await;
        let intent = update("A", "x");
        queue.enqueue(intent.clone()).await.unwrap();

        let first = queue.mark_retry(&intent.id, "timeout").await.unwrap();
        assert_eq!(first, RetryDecision { retry_count: 1, exhausted: false });
        queue.mark_retry(&intent.id, "timeout").await.unwrap();
        let third = queue.mark_retry(&intent.id, "timeout").await.unwrap();
        assert!(third.exhausted);
    }

    #[tokio::test]
    async fn test_deferred_intent_waits_for_deadline() {
        let queue = new_queue(1 << 20).await;
        let intent = update("A", "x");
        queue.enqueue(intent.clone()).await.unwrap();

        let now = Instant::now();
        queue.take_ready(&HashSet::new(), 1, now).await;
        queue.defer(&intent.id, now + Duration::from_secs(4)).await.unwrap();

        assert!(queue.peek_ready(&HashSet::new(), now).await.is_empty());
        assert_eq!(
            queue.next_backoff_deadline(now).await,
            Some(now + Duration::from_secs(4))
        );
        let later = now + Duration::from_secs(5);
        assert_eq!(queue.peek_ready(&HashSet::new(), later).await.len(), 1);
    }

    #[tokio::test]
    async fn test_dead_letter_blocks_key_until_retried() {
        let queue = new_queue(1 << 20).await;
        let a1 = update("A", "first");
        let a2 = update("A", "second");
        let b1 = update("B", "first");
        for intent in [&a1, &a2, &b1] {
            queue.enqueue(intent.clone()).await.unwrap();
        }

        queue.mark_dead(&a1.id, "retries exhausted").await.unwrap();
        let ready = queue.peek_ready(&HashSet::new(), Instant::now()).await;
        assert_eq!(ready.iter().map(|i| i.id).collect::<Vec<_>>(), vec![b1.id]);
        assert_eq!(queue.dead_letters().await.len(), 1);

        assert!(queue.retry_dead_letter(&a1.id).await.unwrap());
        assert!(!queue.retry_dead_letter(&a1.id).await.unwrap());
        let ready = queue.peek_ready(&HashSet::new(), Instant::now()).await;
        assert_eq!(ready[0].id, a1.id);
        assert_eq!(ready[0].retry_count, 0);
    }

    #[tokio::test]
    async fn test_supersede_keeps_head_position() {
        let queue = new_queue(1 << 20).await;
        let a1 = update("A", "first");
        let a2 = update("A", "second");
        queue.enqueue(a1.clone()).await.unwrap();
        queue.enqueue(a2.clone()).await.unwrap();

        let corrective = a1.corrective(Some("9".to_string()));
        queue.supersede(&a1.id, corrective.clone()).await.unwrap();

        let list = queue.list().await;
        assert_eq!(list[0].id, corrective.id);
        assert_eq!(list[1].id, a2.id);
        assert!(queue.get(&a1.id).await.is_none());
    }

    #[tokio::test]
    async fn test_load_restores_order_and_quota() {
        let db = LocalDatabase::in_memory().await.unwrap();
        let quota = Arc::new(StorageQuota::new(1 << 20));
        let queue = ActionQueue::new(db.clone(), quota.clone());
        let a = update("A", "x");
        let b = update("B", "y");
        queue.enqueue(a.clone()).await.unwrap();
        queue.enqueue(b.clone()).await.unwrap();

        let restored = ActionQueue::new(db, Arc::new(StorageQuota::new(1 << 20)));
        assert_eq!(restored.load().await.unwrap(), 2);
        let ids: Vec<_> = restored.list().await.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![a.id, b.id]);
        assert_eq!(restored.quota().used(), a.payload_bytes + b.payload_bytes);
    }

    #[tokio::test]
    async fn test_discard_and_discard_all() {
        let queue = new_queue(1 << 20).await;
        let a = update("A", "x");
        let b = update("B", "y");
        queue.enqueue(a.clone()).await.unwrap();
        queue.enqueue(b.clone()).await.unwrap();

        queue.discard(&a.id).await.unwrap();
        assert_matches!(queue.discard(&a.id).await, Err(SyncError::MutationNotFound(_)));

        let dropped = queue.discard_all().await.unwrap();
        assert_eq!(dropped.len(), 1);
        assert!(queue.is_empty().await);
        assert_eq!(queue.quota().used(), 0);
    }

    #[tokio::test]
    async fn test_in_flight_intent_cannot_be_discarded() {
        let queue = new_queue(1 << 20).await;
        let a1 = update("A", "first");
        let a2 = update("A", "second");
        queue.enqueue(a1.clone()).await.unwrap();
        queue.enqueue(a2.clone()).await.unwrap();

        let sent = queue.take_ready(&HashSet::new(), 10, Instant::now()).await;
        assert_eq!(sent[0].id, a1.id);

        assert_matches!(queue.discard(&a1.id).await, Err(SyncError::MutationInFlight(id)) if id == a1.id.to_string());
        assert_matches!(queue.discard_all().await, Err(SyncError::MutationInFlight(_)));
        assert_eq!(queue.len().await, 2);

        // A1 still holds the key, so A2 is not dispatchable.
        assert!(queue.peek_ready(&HashSet::new(), Instant::now()).await.is_empty());

        queue.release_in_flight(&a1.id).await;
        let dropped = queue.discard(&a1.id).await.unwrap();
        assert_eq!(dropped.id, a1.id);
        let ready = queue.peek_ready(&HashSet::new(), Instant::now()).await;
        assert_eq!(ready[0].id, a2.id);
    }

    #[tokio::test]
    async fn test_discard_all_keeps_outstanding_reservations() {
        let queue = new_queue(1 << 20).await;
        queue.enqueue(update("A", "x")).await.unwrap();
        queue.enqueue(update("B", "y")).await.unwrap();

        // An enqueue that reserved its bytes but has not inserted yet.
        assert!(queue.quota().reserve(100));

        let dropped = queue.discard_all().await.unwrap();
        assert_eq!(dropped.len(), 2);
        assert_eq!(queue.quota().used(), 100);
    }
}
