//! Shared Module
//!
//! Plain data types used by the queue, the engine and the UI. Everything here
//! is serializable and free of I/O.

/// Shared error types
pub mod error;

/// Sync configuration
pub mod config;

/// Mutation intents and their identities
pub mod mutation;

/// Conflict records and resolution choices
pub mod conflict;

/// Re-export commonly used types for convenience
pub use config::{ConfigError, ConflictStrategy, OfflineCapabilities, SyncConfig, SyncConfigBuilder};
pub use conflict::{Conflict, ConflictId, ResolutionChoice, ServerSnapshot};
pub use error::{SyncError, SyncResult};
pub use mutation::{EntityKey, EntityKind, IntentState, MutationId, MutationIntent, OperationKind};
