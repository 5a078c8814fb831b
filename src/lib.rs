//! claimsync - offline mutation queue for the claims dashboard
//!
//! Writes made while the dashboard is offline are recorded as durable
//! mutation intents and replayed against the claims API once connectivity
//! returns.
//!
//! # Module Structure
//!
//! - **`shared`** - Types without I/O
//!   - Mutation intents, conflicts, configuration
//!   - Error types
//!
//! - **`client`** - The offline runtime
//!   - SQLite-backed action queue with a storage quota
//!   - Sync engine with per-record ordering, retries and backoff
//!   - Conflict resolver (local wins, server wins, manual)
//!   - Connectivity monitor and status reporting
//!   - reqwest client for the claims REST API
//!
//! # Guarantees
//!
//! - Intents for the same record are applied in the order they were made and
//!   never concurrently.
//! - Every intent carries a client-generated id sent as `Idempotency-Key`, so
//!   a replay after a crash can be deduplicated by the server.
//! - Queued payload bytes never exceed the storage quota; an enqueue that
//!   would exceed it is rejected, never dropped silently.
//! - An intent leaves the queue only when the server confirms it, the user
//!   discards it, or a conflict resolution replaces or drops it.
//!
//! # Usage
//!
//! ```rust,no_run
//! use claimsync::client::{Config, HttpRemoteApi, OfflineManager};
//! use claimsync::shared::conflict::ResolutionChoice;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::from_env()?;
//! let api = Arc::new(HttpRemoteApi::new(config.clone())?);
//! let manager = OfflineManager::open(config, api).await?;
//! manager.start().await;
//!
//! for conflict in manager.list_conflicts().await {
//!     manager.resolve_conflict(&conflict.id, ResolutionChoice::Server).await?;
//! }
//! # Ok(())
//! # }
//! ```

/// Shared types and data structures
pub mod shared;

/// Offline queue and sync runtime
pub mod client;
