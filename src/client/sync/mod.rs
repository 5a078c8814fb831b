//! # Sync Engine
//!
//! Replays queued mutation intents against the server once connectivity
//! returns, retries transient failures with backoff, and routes version
//! conflicts to the conflict resolver.
//!
//! ## Architecture
//!
//! The engine coordinates:
//! - **Action Queue**: Durable FIFO of intents (`offline::queue`)
//! - **Conflict Resolver**: Policy for rejected writes
//! - **Network Monitor**: Debounced connectivity signal
//! - **Sync State**: Single state record, written only here
//! - **Metrics**: Drain-pass counters
//!
//! ## Drain Pass
//!
//! Only one pass runs at a time; triggers that arrive during a pass are
//! coalesced into it. Within a pass, intents for different records run
//! concurrently up to `max_concurrent_ops`, intents for the same record run
//! strictly in order. A connectivity loss cancels in-flight calls and leaves
//! their intents queued untouched. [`SyncEngine::stop`] interrupts a running
//! pass the same way before the worker exits.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use claimsync::client::sync::SyncEngine;
//! # use std::sync::Arc;
//!
//! # async fn example(engine: Arc<SyncEngine>) -> Result<(), Box<dyn std::error::Error>> {
//! engine.recover().await?;
//! let worker = engine.start();
//!
//! let mut state = engine.subscribe_state();
//! state.changed().await?;
//! println!("sync status: {:?}", state.borrow().status);
//!
//! engine.stop(worker).await;
//! # Ok(())
//! # }
//! ```

pub mod conflict_resolver;
pub mod events;
pub mod metrics;
pub mod network_monitor;
pub mod reporter;
pub mod sync_state;
pub mod transport;

pub use conflict_resolver::{ConflictResolver, Resolution};
pub use events::{SyncEvent, SyncEventKind};
pub use metrics::SyncMetrics;
pub use network_monitor::{ConnectivityProbe, NetworkMonitor, NetworkStatus};
pub use reporter::{SyncStatusReport, SyncStatusReporter};
pub use sync_state::{EngineState, SyncProgress, SyncState, SyncStatus};
pub use transport::{ApplyOutcome, RemoteApi, RetryClass, TransportError};

use crate::client::local_db::LocalDatabase;
use crate::client::offline::queue::ActionQueue;
use crate::client::offline::retry::BackoffStrategy;
use crate::shared::config::SyncConfig;
use crate::shared::conflict::{Conflict, ConflictId, ResolutionChoice, ServerSnapshot};
use crate::shared::error::{SyncError, SyncResult};
use crate::shared::mutation::{MutationId, MutationIntent};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex, Notify};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;

const EVENT_CAPACITY: usize = 256;

type ApplyResult = (MutationIntent, Result<ApplyOutcome, TransportError>);

/// What `recover` repaired after a restart
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Conflicted intents with no stored conflict, returned to pending
    pub reset_intents: usize,
    /// Stored conflicts whose intent no longer exists
    pub orphan_conflicts: usize,
}

/// Bookkeeping for one drain pass
#[derive(Debug, Default)]
struct PassTally {
    progress: SyncProgress,
    /// Intents counted into `progress.total`
    seen: HashSet<MutationId>,
    bytes_applied: u64,
}

impl PassTally {
    fn dispatched(&mut self, id: MutationId) {
        if self.seen.insert(id) {
            self.progress.total += 1;
        }
    }
}

/// Main sync coordinator
#[derive(Debug)]
pub struct SyncEngine {
    config: SyncConfig,
    db: LocalDatabase,
    queue: Arc<ActionQueue>,
    resolver: Arc<ConflictResolver>,
    api: Arc<dyn RemoteApi>,
    monitor: Arc<NetworkMonitor>,
    backoff: BackoffStrategy,
    /// Sole writer of the sync state
    state: watch::Sender<SyncState>,
    events: broadcast::Sender<SyncEvent>,
    metrics: Arc<Mutex<SyncMetrics>>,
    /// Held for the duration of a drain pass
    pass_lock: Mutex<()>,
    /// Set by every trigger; a pass loop reruns while it is set
    rerun: AtomicBool,
    /// Wakes the background worker
    worker_wake: Notify,
    /// Wakes a running pass that is waiting on backoff or in-flight calls
    pass_wake: Notify,
    /// Raised by `stop` until the worker has exited
    shutdown: watch::Sender<bool>,
}

impl SyncEngine {
    pub fn new(
        config: SyncConfig,
        db: LocalDatabase,
        queue: Arc<ActionQueue>,
        resolver: Arc<ConflictResolver>,
        api: Arc<dyn RemoteApi>,
        monitor: Arc<NetworkMonitor>,
    ) -> Self {
        let (state, _) = watch::channel(SyncState::default());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (shutdown, _) = watch::channel(false);

        Self {
            backoff: BackoffStrategy::from_config(&config),
            config,
            db,
            queue,
            resolver,
            api,
            monitor,
            state,
            events,
            metrics: Arc::new(Mutex::new(SyncMetrics::new())),
            pass_lock: Mutex::new(()),
            rerun: AtomicBool::new(false),
            worker_wake: Notify::new(),
            pass_wake: Notify::new(),
            shutdown,
        }
    }

    /// Reconcile queue and conflict store after a restart.
    ///
    /// Conflicted intents without a stored conflict go back to pending, and
    /// stored conflicts whose intent is gone are dropped.
    pub async fn recover(&self) -> SyncResult<RecoveryReport> {
        let queued: HashSet<MutationId> = self.queue.list().await.iter().map(|i| i.id).collect();
        let orphan_conflicts = self.resolver.drop_orphans(&queued).await?;

        let mut reset_intents = 0;
        for intent in self.queue.conflicted().await {
            if !self.resolver.has_conflict_for(&intent.id).await {
                self.queue.mark_pending(&intent.id).await?;
                reset_intents += 1;
            }
        }

        let last_sync_at = self.db.get_last_sync_time().await?;
        self.state.send_modify(|state| state.last_sync_at = last_sync_at);
        self.refresh_blocked_status().await;

        let report = RecoveryReport {
            reset_intents,
            orphan_conflicts,
        };
        tracing::info!(?report, "Recovered sync state");
        Ok(report)
    }

    /// Spawn the background worker.
    ///
    /// It drains on connectivity transitions to online, on
    /// [`trigger`](Self::trigger), and on every `sync_interval` tick while
    /// online. The first tick fires immediately.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move { engine.run_worker().await })
    }

    /// Stop a worker returned by [`start`](Self::start) and wait for it.
    ///
    /// A pass in progress is interrupted: its calls are cancelled, its
    /// intents are released and the engine returns to idle. Later calls to
    /// `drain` or `start` run normally.
    pub async fn stop(&self, worker: JoinHandle<()>) {
        self.shutdown.send_replace(true);
        if let Err(e) = worker.await {
            tracing::error!(error = %e, "Sync worker panicked");
        }
        self.shutdown.send_replace(false);
    }

    fn is_stopping(&self) -> bool {
        *self.shutdown.borrow()
    }

    async fn run_worker(self: Arc<Self>) {
        let mut status_rx = self.monitor.subscribe();
        let mut shutdown_rx = self.shutdown.subscribe();
        let mut ticker = tokio::time::interval(self.config.sync_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tracing::info!(interval = ?self.config.sync_interval, "Sync worker started");

        loop {
            if *shutdown_rx.borrow_and_update() {
                break;
            }

            tokio::select! {
                _ = wait_shutdown(&mut shutdown_rx) => break,
                changed = status_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let status = *status_rx.borrow_and_update();
                    self.emit(SyncEventKind::ConnectivityChanged { status });
                    if !status.is_online() || !self.queue.has_pending().await {
                        continue;
                    }
                }
                _ = self.worker_wake.notified() => {}
                _ = ticker.tick() => {
                    if !self.monitor.is_online() {
                        continue;
                    }
                }
            }

            if let Err(e) = self.drain().await {
                tracing::error!(error = %e, "Drain pass failed");
            }
        }

        tracing::info!("Sync worker stopped");
    }

    /// Request a drain. Coalesced into the running pass if there is one.
    pub fn trigger(&self) {
        self.rerun.store(true, Ordering::SeqCst);
        self.worker_wake.notify_one();
        self.pass_wake.notify_one();
    }

    /// Run drain passes until no trigger is outstanding.
    ///
    /// Returns immediately if another caller is already draining; that pass
    /// picks up this request.
    pub async fn drain(&self) -> SyncResult<()> {
        self.rerun.store(true, Ordering::SeqCst);

        loop {
            let Ok(guard) = self.pass_lock.try_lock() else {
                return Ok(());
            };

            let mut result = Ok(());
            while self.rerun.swap(false, Ordering::SeqCst) {
                result = self.run_pass().await;
                if result.is_err() {
                    break;
                }
            }
            drop(guard);

            // A trigger may have landed between the last swap and the unlock.
            if result.is_err() || !self.rerun.load(Ordering::SeqCst) {
                return result;
            }
        }
    }

    async fn has_work(&self) -> bool {
        let now = Instant::now();
        let blocked = self.resolver.blocked_keys().await;
        !self.queue.peek_ready(&blocked, now).await.is_empty()
            || self.queue.next_backoff_deadline(now).await.is_some()
    }

    async fn run_pass(&self) -> SyncResult<()> {
        if self.is_stopping() || !self.monitor.is_online() || !self.has_work().await {
            return Ok(());
        }

        self.metrics.lock().await.record_pass_start();
        self.state.send_modify(|state| {
            state.status = SyncStatus::Syncing;
            state.engine = EngineState::Draining;
            state.progress = SyncProgress::default();
        });
        tracing::debug!("Drain pass started");

        let mut tally = PassTally::default();
        let mut tasks: JoinSet<ApplyResult> = JoinSet::new();
        let result = self.pass_loop(&mut tasks, &mut tally).await;

        let interrupted = !matches!(result, Ok(true));
        if interrupted {
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }
        let released = self.queue.release_all_in_flight().await;
        if released > 0 {
            tracing::info!(released, "Released in-flight mutations");
        }

        self.finish_pass(tally, interrupted).await?;
        result.map(|_| ())
    }

    /// Returns `Ok(true)` when the pass ran to completion and `Ok(false)`
    /// when connectivity dropped or the engine is stopping
    async fn pass_loop(&self, tasks: &mut JoinSet<ApplyResult>, tally: &mut PassTally) -> SyncResult<bool> {
        let mut online_rx = self.monitor.subscribe();
        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            if !online_rx.borrow_and_update().is_online() || *shutdown_rx.borrow_and_update() {
                return Ok(false);
            }

            let capacity = self.config.max_concurrent_ops.saturating_sub(tasks.len());
            if capacity > 0 {
                let blocked = self.resolver.blocked_keys().await;
                let ready = self.queue.take_ready(&blocked, capacity, Instant::now()).await;
                if !ready.is_empty() {
                    for intent in ready {
                        tally.dispatched(intent.id);
                        tracing::debug!(
                            mutation_id = %intent.id,
                            entity = %intent.entity,
                            entity_id = %intent.entity_id,
                            operation = %intent.operation,
                            retry_count = intent.retry_count,
                            "Dispatching mutation"
                        );
                        let api = Arc::clone(&self.api);
                        tasks.spawn(async move {
                            let outcome = api.apply(&intent).await;
                            (intent, outcome)
                        });
                    }
                    self.publish_progress(tally.progress);
                }
            }

            if tasks.is_empty() {
                let Some(deadline) = self.queue.next_backoff_deadline(Instant::now()).await else {
                    return Ok(true);
                };
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => {}
                    _ = wait_offline(&mut online_rx) => return Ok(false),
                    _ = wait_shutdown(&mut shutdown_rx) => return Ok(false),
                    _ = self.pass_wake.notified() => {}
                }
                continue;
            }

            tokio::select! {
                joined = tasks.join_next() => match joined {
                    Some(Ok((intent, outcome))) => {
                        self.settle(intent, outcome, tally).await?;
                        self.publish_progress(tally.progress);
                    }
                    Some(Err(e)) => {
                        // The intent stays in flight until the pass releases it.
                        tracing::error!(error = %e, "Dispatch task failed");
                    }
                    None => {}
                },
                _ = wait_offline(&mut online_rx) => return Ok(false),
                _ = wait_shutdown(&mut shutdown_rx) => return Ok(false),
                _ = self.pass_wake.notified() => {}
            }
        }
    }

    async fn finish_pass(&self, tally: PassTally, interrupted: bool) -> SyncResult<()> {
        let paused = self.is_paused().await;
        let now = chrono::Utc::now();

        {
            let mut metrics = self.metrics.lock().await;
            if interrupted {
                metrics.record_pass_interrupted(tally.bytes_applied);
            } else {
                metrics.record_pass_complete(tally.bytes_applied);
            }
        }

        self.state.send_modify(|state| {
            state.progress = tally.progress;
            if interrupted {
                state.status = SyncStatus::Idle;
                state.engine = EngineState::Idle;
            } else {
                state.status = if paused { SyncStatus::Error } else { SyncStatus::Success };
                state.engine = if paused { EngineState::Paused } else { EngineState::Idle };
                state.last_sync_at = Some(now);
            }
        });

        tracing::info!(
            total = tally.progress.total,
            completed = tally.progress.completed,
            failed = tally.progress.failed,
            interrupted,
            paused,
            "Drain pass finished"
        );
        self.emit(SyncEventKind::PassFinished {
            progress: tally.progress,
            interrupted,
        });

        if !interrupted {
            self.db.set_last_sync_time(now).await?;
        }
        Ok(())
    }

    /// Apply the outcome of one remote call to the queue
    async fn settle(
        &self,
        intent: MutationIntent,
        outcome: Result<ApplyOutcome, TransportError>,
        tally: &mut PassTally,
    ) -> SyncResult<()> {
        let id = intent.id;
        let result = match outcome {
            Ok(ApplyOutcome::Applied { version }) => self.applied(intent, version, tally).await,
            Ok(ApplyOutcome::Conflict(snapshot)) => self.conflicted(intent, snapshot, tally).await,
            Err(err) if err.is_retryable() => self.retry_later(intent, err, tally).await,
            Err(err) => {
                let reason = match err.status {
                    Some(status) => format!("rejected by server ({}): {}", status, err.message),
                    None => format!("rejected: {}", err.message),
                };
                self.dead_letter(&intent, &reason, tally).await
            }
        };

        match result {
            // The intent left the queue while the call was in flight.
            Err(SyncError::MutationNotFound(_)) => {
                tracing::debug!(mutation_id = %id, "Mutation left the queue during dispatch");
                Ok(())
            }
            other => other,
        }
    }

    async fn applied(&self, intent: MutationIntent, version: Option<String>, tally: &mut PassTally) -> SyncResult<()> {
        self.queue.remove(&intent.id).await?;
        tally.progress.completed += 1;
        tally.bytes_applied += intent.payload_bytes;

        tracing::info!(
            mutation_id = %intent.id,
            entity = %intent.entity,
            entity_id = %intent.entity_id,
            version = ?version,
            "Mutation applied"
        );
        self.emit(SyncEventKind::Applied {
            mutation_id: intent.id,
            entity: intent.entity,
            entity_id: intent.entity_id,
            version,
        });
        Ok(())
    }

    async fn retry_later(&self, intent: MutationIntent, err: TransportError, tally: &mut PassTally) -> SyncResult<()> {
        let decision = self.queue.mark_retry(&intent.id, &err.message).await?;
        if decision.exhausted {
            let reason = format!("retries exhausted after {} attempts: {}", decision.retry_count, err.message);
            return self.dead_letter(&intent, &reason, tally).await;
        }

        let delay = self.backoff.delay(decision.retry_count.saturating_sub(1));
        self.queue.defer(&intent.id, Instant::now() + delay).await?;

        tracing::warn!(
            mutation_id = %intent.id,
            entity = %intent.entity,
            entity_id = %intent.entity_id,
            retry_count = decision.retry_count,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Mutation failed, retry scheduled"
        );
        self.emit(SyncEventKind::RetryScheduled {
            mutation_id: intent.id,
            retry_count: decision.retry_count,
            delay_ms: delay.as_millis() as u64,
            error: err.message,
        });
        Ok(())
    }

    async fn conflicted(&self, intent: MutationIntent, snapshot: ServerSnapshot, tally: &mut PassTally) -> SyncResult<()> {
        match self.resolver.handle(&intent, snapshot).await {
            Ok(Resolution::Resubmit(corrective)) => {
                if corrective.retry_count >= corrective.max_retries {
                    let reason = format!("conflict persisted after {} resubmissions", corrective.retry_count);
                    return self.dead_letter(&intent, &reason, tally).await;
                }
                tally.seen.insert(corrective.id);
                let new_id = self.queue.supersede(&intent.id, corrective).await?;
                self.emit(SyncEventKind::Superseded {
                    old_id: intent.id,
                    new_id,
                });
                Ok(())
            }
            Ok(Resolution::Discard) => {
                self.queue.remove(&intent.id).await?;
                tally.progress.completed += 1;
                self.emit(SyncEventKind::LocalEditDropped {
                    mutation_id: intent.id,
                    entity: intent.entity,
                    entity_id: intent.entity_id,
                });
                Ok(())
            }
            Ok(Resolution::Deferred(conflict)) => {
                self.queue.mark_conflicted(&intent.id).await?;
                self.emit(SyncEventKind::ConflictDetected {
                    conflict_id: conflict.id,
                    mutation_id: intent.id,
                });
                Ok(())
            }
            Err(SyncError::ConflictAlreadyOpen(key)) => {
                tracing::warn!(mutation_id = %intent.id, key = %key, "Conflict already open, holding mutation");
                self.queue.release_in_flight(&intent.id).await;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn dead_letter(&self, intent: &MutationIntent, reason: &str, tally: &mut PassTally) -> SyncResult<()> {
        self.queue.mark_dead(&intent.id, reason).await?;
        tally.progress.failed += 1;

        tracing::error!(
            mutation_id = %intent.id,
            entity = %intent.entity,
            entity_id = %intent.entity_id,
            reason,
            "Mutation dead-lettered"
        );
        self.emit(SyncEventKind::DeadLettered {
            mutation_id: intent.id,
            reason: reason.to_string(),
        });
        Ok(())
    }

    /// Settle an open conflict by user choice
    pub async fn resolve_conflict(&self, conflict_id: &ConflictId, choice: ResolutionChoice) -> SyncResult<()> {
        let conflict = self.resolver.claim(conflict_id).await?;

        if let Err(e) = self.apply_resolution(&conflict, choice).await {
            self.resolver.abandon(conflict).await;
            return Err(e);
        }

        self.resolver.complete(&conflict).await?;
        self.emit(SyncEventKind::ConflictResolved {
            conflict_id: conflict.id,
            choice,
        });
        self.after_user_action().await;
        Ok(())
    }

    async fn apply_resolution(&self, conflict: &Conflict, choice: ResolutionChoice) -> SyncResult<()> {
        match choice {
            ResolutionChoice::Local => {
                let Some(intent) = self.queue.get(&conflict.mutation_id).await else {
                    tracing::warn!(conflict_id = %conflict.id, "Conflicted mutation no longer queued");
                    return Ok(());
                };
                let corrective = intent.corrective(conflict.server_version.clone());
                let new_id = self.queue.supersede(&intent.id, corrective).await?;
                self.emit(SyncEventKind::Superseded {
                    old_id: intent.id,
                    new_id,
                });
            }
            ResolutionChoice::Server => {
                if let Some(intent) = self.queue.remove(&conflict.mutation_id).await? {
                    self.emit(SyncEventKind::LocalEditDropped {
                        mutation_id: intent.id,
                        entity: intent.entity,
                        entity_id: intent.entity_id,
                    });
                }
            }
        }
        Ok(())
    }

    /// Refresh the paused state and request a drain after the user unblocked
    /// something (conflict resolved, dead letter retried or discarded)
    pub async fn after_user_action(&self) {
        self.refresh_blocked_status().await;
        self.trigger();
    }

    async fn is_paused(&self) -> bool {
        !self.resolver.blocked_keys().await.is_empty() || !self.queue.dead_letters().await.is_empty()
    }

    /// Outside a pass, keep `Paused`/`Error` in line with what is blocked
    async fn refresh_blocked_status(&self) {
        let paused = self.is_paused().await;
        self.state.send_if_modified(|state| {
            if state.engine == EngineState::Draining {
                return false;
            }
            match (paused, state.engine) {
                (true, EngineState::Idle) => {
                    state.engine = EngineState::Paused;
                    state.status = SyncStatus::Error;
                    true
                }
                (false, EngineState::Paused) => {
                    state.engine = EngineState::Idle;
                    state.status = SyncStatus::Idle;
                    true
                }
                _ => false,
            }
        });
    }

    fn publish_progress(&self, progress: SyncProgress) {
        self.state.send_if_modified(|state| {
            if state.progress == progress {
                false
            } else {
                state.progress = progress;
                true
            }
        });
    }

    fn emit(&self, kind: SyncEventKind) {
        // No subscribers is fine.
        let _ = self.events.send(SyncEvent::new(kind));
    }

    pub fn state(&self) -> SyncState {
        self.state.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub async fn metrics(&self) -> SyncMetrics {
        self.metrics.lock().await.clone()
    }

    pub fn reporter(&self) -> SyncStatusReporter {
        SyncStatusReporter::new(
            Arc::clone(&self.queue),
            Arc::clone(&self.resolver),
            self.state.subscribe(),
            Arc::clone(&self.monitor),
            Arc::clone(&self.metrics),
        )
    }

    pub fn queue(&self) -> &Arc<ActionQueue> {
        &self.queue
    }

    pub fn resolver(&self) -> &Arc<ConflictResolver> {
        &self.resolver
    }

    pub fn monitor(&self) -> &Arc<NetworkMonitor> {
        &self.monitor
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }
}

/// Resolves once the monitor reports offline
async fn wait_offline(rx: &mut watch::Receiver<NetworkStatus>) {
    loop {
        if !rx.borrow_and_update().is_online() {
            return;
        }
        if rx.changed().await.is_err() {
            // Monitor gone: never resolve.
            std::future::pending::<()>().await;
        }
    }
}

async fn wait_shutdown(rx: &mut watch::Receiver<bool>) {
    let closed = rx.wait_for(|stopping| *stopping).await.is_err();
    if closed {
        std::future::pending::<()>().await;
    }
}
