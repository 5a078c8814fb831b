//! Remote API seam.
//!
//! The engine only knows this trait. `HttpRemoteApi` implements it over
//! reqwest; tests implement it with scripted responses.

use async_trait::async_trait;
use thiserror::Error;

use crate::shared::conflict::ServerSnapshot;
use crate::shared::error::SyncError;
use crate::shared::mutation::MutationIntent;

/// Result of applying one intent remotely
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    /// The server accepted the write
    Applied {
        /// New server version, if reported
        version: Option<String>,
    },
    /// The server's version moved past the intent's `base_version`
    Conflict(ServerSnapshot),
}

/// Whether a failed call is worth repeating
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Network error, timeout, 408, 429 or 5xx
    Retryable,
    /// Any other 4xx: repeating the same request cannot succeed
    Permanent,
}

/// A remote call that produced neither success nor a conflict
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
    /// HTTP status, `None` when no response arrived
    pub status: Option<u16>,
    pub retry_class: RetryClass,
}

impl TransportError {
    /// Connection failure or timeout
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
            retry_class: RetryClass::Retryable,
        }
    }

    /// Unexpected HTTP status
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: Some(status),
            retry_class: classify_status(status),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.retry_class == RetryClass::Retryable
    }
}

impl From<TransportError> for SyncError {
    fn from(err: TransportError) -> Self {
        match (err.retry_class, err.status) {
            (RetryClass::Permanent, Some(status)) => SyncError::Rejected {
                status,
                message: err.message,
            },
            _ => SyncError::transient(err.message),
        }
    }
}

/// Retry classification for a non-success, non-conflict status
pub fn classify_status(status: u16) -> RetryClass {
    match status {
        408 | 429 => RetryClass::Retryable,
        500..=599 => RetryClass::Retryable,
        _ => RetryClass::Permanent,
    }
}

/// The server-side API the engine replays intents against
#[async_trait]
pub trait RemoteApi: Send + Sync + 'static {
    /// Apply one intent. Must send `intent.id` as the idempotency key.
    async fn apply(&self, intent: &MutationIntent) -> Result<ApplyOutcome, TransportError>;

    /// Whether the server is reachable
    async fn health_check(&self) -> bool;
}

impl std::fmt::Debug for dyn RemoteApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RemoteApi")
    }
}
