//! Shared Error Types
//!
//! Errors returned by the offline queue, the sync engine and the conflict
//! resolver. Every variant maps onto one user-visible outcome, so the UI can
//! tell a full disk from a dead-lettered edit.
//!
//! # Error Categories
//!
//! - `QuotaExceeded` - enqueue rejected, the user must free space
//! - `TransientNetworkFailure` - retried with backoff up to `max_retries`
//! - `VersionConflict` - routed to the conflict resolver
//! - `DeadLettered` - terminal, needs an explicit retry or discard
//! - `Storage` / `Serialization` - local persistence failures
//!
//! # Usage
//!
//! ```rust
//! use claimsync::shared::error::SyncError;
//!
//! let error = SyncError::quota_exceeded(4096, 1024);
//! assert!(error.to_string().contains("4096"));
//! ```

use thiserror::Error;

use crate::shared::config::ConfigError;

/// Result type alias for sync operations
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors raised by the offline synchronization subsystem
#[derive(Debug, Error, Clone)]
pub enum SyncError {
    /// Enqueue would push queued payload bytes over the storage quota
    #[error("Storage quota exceeded: {requested} bytes requested, {available} bytes available")]
    QuotaExceeded {
        /// Size of the rejected payload
        requested: u64,
        /// Remaining quota at the time of the request
        available: u64,
    },

    /// The requested mutation is disabled by the offline capabilities
    #[error("Offline capability disabled: {capability}")]
    CapabilityDisabled {
        /// Name of the disabled capability
        capability: String,
    },

    /// The payload cannot be turned into an intent
    #[error("Invalid payload: {message}")]
    InvalidPayload {
        /// Human-readable error message
        message: String,
    },

    /// Network error, timeout or 5xx response
    #[error("Transient network failure: {message}")]
    TransientNetworkFailure {
        /// Human-readable error message
        message: String,
    },

    /// The server rejected the write because its version moved on
    #[error("Version conflict on {entity}/{entity_id}")]
    VersionConflict {
        /// Entity type
        entity: String,
        /// Entity id
        entity_id: String,
    },

    /// The intent exhausted its retries and needs manual handling
    #[error("Mutation {mutation_id} is dead-lettered")]
    DeadLettered {
        /// Id of the dead-lettered intent
        mutation_id: String,
    },

    /// The server rejected the write permanently (4xx other than conflicts)
    #[error("Rejected by server ({status}): {message}")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// Server-provided message
        message: String,
    },

    /// No queued intent with this id
    #[error("Mutation not found: {0}")]
    MutationNotFound(String),

    /// The intent's remote call has not settled yet
    #[error("Mutation {0} is in flight")]
    MutationInFlight(String),

    /// No open conflict with this id
    #[error("Conflict not found: {0}")]
    ConflictNotFound(String),

    /// A conflict is already open for the same entity
    #[error("A conflict is already open for {0}")]
    ConflictAlreadyOpen(String),

    /// Local database failure
    #[error("Storage error: {message}")]
    Storage {
        /// Human-readable error message
        message: String,
    },

    /// JSON serialization or deserialization error
    #[error("Serialization error: {message}")]
    Serialization {
        /// Human-readable error message
        message: String,
    },

    /// Invalid configuration
    #[error("Configuration error: {message}")]
    Config {
        /// Human-readable error message
        message: String,
    },
}

impl SyncError {
    /// Create a quota error
    pub fn quota_exceeded(requested: u64, available: u64) -> Self {
        Self::QuotaExceeded {
            requested,
            available,
        }
    }

    pub fn capability_disabled(capability: impl Into<String>) -> Self {
        Self::CapabilityDisabled {
            capability: capability.into(),
        }
    }

    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::InvalidPayload {
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::TransientNetworkFailure {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Whether the UI should offer a retry
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransientNetworkFailure { .. } | Self::Storage { .. } | Self::MutationInFlight(_)
        )
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(format!("JSON error: {}", err))
    }
}

impl From<sqlx::Error> for SyncError {
    fn from(err: sqlx::Error) -> Self {
        Self::storage(err.to_string())
    }
}

impl From<ConfigError> for SyncError {
    fn from(err: ConfigError) -> Self {
        Self::Config {
            message: err.to_string(),
        }
    }
}
