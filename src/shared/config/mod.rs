//! Sync configuration module
//!
//! Provides the configuration types for the offline queue and sync engine,
//! a builder that validates them, and TOML loading.
//!
//! ```toml
//! server_url = "https://claims.example.org"
//! max_retries = 5
//! base_delay_ms = 1000
//! max_delay_ms = 300000
//! conflict_strategy = "manual"
//!
//! [capabilities]
//! storage_quota = 52428800
//! can_upload_documents = true
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Default server URL
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:3000";

/// Default storage budget for queued payloads (50 MiB)
pub const DEFAULT_STORAGE_QUOTA: u64 = 50 * 1024 * 1024;

/// Shortest debounce accepted for connectivity flapping
pub const MIN_DEBOUNCE: Duration = Duration::from_secs(2);

/// How version conflicts are settled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    /// Re-submit the local payload against the server's current version
    LocalWins,
    /// Drop the local mutation
    ServerWins,
    /// Keep a conflict record and wait for the user
    #[default]
    Manual,
}

impl ConflictStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictStrategy::LocalWins => "local_wins",
            ConflictStrategy::ServerWins => "server_wins",
            ConflictStrategy::Manual => "manual",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "local_wins" | "local" => Some(ConflictStrategy::LocalWins),
            "server_wins" | "server" => Some(ConflictStrategy::ServerWins),
            "manual" => Some(ConflictStrategy::Manual),
            _ => None,
        }
    }
}

/// What the dashboard may do while offline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OfflineCapabilities {
    pub can_create_claims: bool,
    pub can_upload_documents: bool,
    pub can_view_data: bool,
    /// Byte budget for queued payloads
    pub storage_quota: u64,
    /// Bytes currently held by queued payloads (reported, not configured)
    #[serde(skip_deserializing)]
    pub used_storage: u64,
}

/// Everything is enabled offline. Document uploads are queued like any other
/// intent and are bounded by `storage_quota`, so they are not switched off by
/// default; a host that cannot hold document payloads turns the flag off
/// through `OfflineManager::update_capabilities`.
impl Default for OfflineCapabilities {
    fn default() -> Self {
        Self {
            can_create_claims: true,
            can_upload_documents: true,
            can_view_data: true,
            storage_quota: DEFAULT_STORAGE_QUOTA,
            used_storage: 0,
        }
    }
}

/// Sync engine configuration
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// Server URL
    pub server_url: String,
    /// Retry budget for each mutation
    pub max_retries: u32,
    /// First backoff delay
    pub base_delay: Duration,
    /// Backoff ceiling
    pub max_delay: Duration,
    /// Jitter factor (0.0 to 1.0)
    pub jitter: f64,
    /// Maximum concurrent remote calls (different entities only)
    pub max_concurrent_ops: usize,
    /// Connectivity debounce window
    pub debounce: Duration,
    /// Periodic drain interval while online
    pub sync_interval: Duration,
    /// HTTP request timeout
    pub request_timeout: Duration,
    /// Conflict resolution strategy
    pub conflict_strategy: ConflictStrategy,
    /// Offline capabilities
    pub capabilities: OfflineCapabilities,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            max_retries: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(300),
            jitter: 0.1,
            max_concurrent_ops: 5,
            debounce: MIN_DEBOUNCE,
            sync_interval: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
            conflict_strategy: ConflictStrategy::Manual,
            capabilities: OfflineCapabilities::default(),
        }
    }
}

impl SyncConfig {
    /// Create a new SyncConfigBuilder
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.server_url.starts_with("http://") || self.server_url.starts_with("https://")) {
            return Err(ConfigError::InvalidUrl(self.server_url.clone()));
        }
        if self.max_retries == 0 {
            return Err(ConfigError::invalid("max_retries", "must be at least 1"));
        }
        if self.base_delay.is_zero() || self.base_delay > self.max_delay {
            return Err(ConfigError::invalid(
                "base_delay",
                "must be non-zero and no larger than max_delay",
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(ConfigError::invalid("jitter", "must be between 0.0 and 1.0"));
        }
        if self.max_concurrent_ops == 0 {
            return Err(ConfigError::invalid("max_concurrent_ops", "must be at least 1"));
        }
        if self.debounce < MIN_DEBOUNCE {
            return Err(ConfigError::invalid("debounce", "must be at least 2 seconds"));
        }
        if self.sync_interval.is_zero() || self.request_timeout.is_zero() {
            return Err(ConfigError::invalid(
                "sync_interval",
                "intervals and timeouts must be non-zero",
            ));
        }
        Ok(())
    }

    /// Parse a TOML document, falling back to defaults for missing keys
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let file: SyncConfigFile =
            toml::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))?;
        file.into_builder().build()
    }

    /// Load a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.as_ref().display(), e)))?;
        Self::from_toml_str(&source)
    }
}

/// On-disk shape of the configuration (durations in milliseconds)
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SyncConfigFile {
    server_url: Option<String>,
    max_retries: Option<u32>,
    base_delay_ms: Option<u64>,
    max_delay_ms: Option<u64>,
    jitter: Option<f64>,
    max_concurrent_ops: Option<usize>,
    debounce_ms: Option<u64>,
    sync_interval_ms: Option<u64>,
    request_timeout_ms: Option<u64>,
    conflict_strategy: Option<ConflictStrategy>,
    capabilities: Option<OfflineCapabilities>,
}

impl SyncConfigFile {
    fn into_builder(self) -> SyncConfigBuilder {
        let mut builder = SyncConfig::builder();
        if let Some(url) = self.server_url {
            builder = builder.server_url(url);
        }
        if let Some(n) = self.max_retries {
            builder = builder.max_retries(n);
        }
        if let Some(ms) = self.base_delay_ms {
            builder = builder.base_delay(Duration::from_millis(ms));
        }
        if let Some(ms) = self.max_delay_ms {
            builder = builder.max_delay(Duration::from_millis(ms));
        }
        if let Some(jitter) = self.jitter {
            builder = builder.jitter(jitter);
        }
        if let Some(n) = self.max_concurrent_ops {
            builder = builder.max_concurrent_ops(n);
        }
        if let Some(ms) = self.debounce_ms {
            builder = builder.debounce(Duration::from_millis(ms));
        }
        if let Some(ms) = self.sync_interval_ms {
            builder = builder.sync_interval(Duration::from_millis(ms));
        }
        if let Some(ms) = self.request_timeout_ms {
            builder = builder.request_timeout(Duration::from_millis(ms));
        }
        if let Some(strategy) = self.conflict_strategy {
            builder = builder.conflict_strategy(strategy);
        }
        if let Some(capabilities) = self.capabilities {
            builder = builder.capabilities(capabilities);
        }
        builder
    }
}

/// Builder for SyncConfig
#[derive(Debug, Default)]
pub struct SyncConfigBuilder {
    config: SyncConfig,
}

impl SyncConfigBuilder {
    /// Set the server URL
    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.config.server_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.config.max_retries = max_retries;
        self
    }

    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.config.base_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.config.max_delay = delay;
        self
    }

    pub fn jitter(mut self, jitter: f64) -> Self {
        self.config.jitter = jitter;
        self
    }

    pub fn max_concurrent_ops(mut self, n: usize) -> Self {
        self.config.max_concurrent_ops = n;
        self
    }

    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.config.debounce = debounce;
        self
    }

    pub fn sync_interval(mut self, interval: Duration) -> Self {
        self.config.sync_interval = interval;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn conflict_strategy(mut self, strategy: ConflictStrategy) -> Self {
        self.config.conflict_strategy = strategy;
        self
    }

    pub fn capabilities(mut self, capabilities: OfflineCapabilities) -> Self {
        self.config.capabilities = capabilities;
        self
    }

    pub fn storage_quota(mut self, bytes: u64) -> Self {
        self.config.capabilities.storage_quota = bytes;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<SyncConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("invalid value for {field}: {message}")]
    InvalidValue {
        field: &'static str,
        message: String,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(String),
    #[error("failed to read configuration: {0}")]
    Io(String),
}

impl ConfigError {
    fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            message: message.into(),
        }
    }
}
