use std::path::PathBuf;

use crate::client::local_db::LocalDatabase;
use crate::shared::config::{ConfigError, SyncConfig};

/// Environment variable overriding the API base URL
pub const ENV_API_URL: &str = "CLAIMSYNC_API_URL";
/// Environment variable naming a TOML config file
pub const ENV_CONFIG: &str = "CLAIMSYNC_CONFIG";
/// Environment variable overriding the directory of the queue database
pub const ENV_DATA_DIR: &str = "CLAIMSYNC_DATA_DIR";
/// Environment variable carrying a bearer token
pub const ENV_TOKEN: &str = "CLAIMSYNC_TOKEN";

/// Client configuration wrapper.
#[derive(Debug, Clone, Default)]
pub struct Config {
    sync: SyncConfig,
    token: Option<String>,
    data_dir: Option<PathBuf>,
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sync_config(sync: SyncConfig) -> Result<Self, ConfigError> {
        sync.validate()?;
        Ok(Self {
            sync,
            ..Self::default()
        })
    }

    /// Build from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup.
    ///
    /// The config file named by `CLAIMSYNC_CONFIG` is read first; the other
    /// variables override it.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut sync = match lookup(ENV_CONFIG) {
            Some(path) => SyncConfig::from_file(path)?,
            None => SyncConfig::default(),
        };

        if let Some(url) = lookup(ENV_API_URL) {
            sync.server_url = url.trim_end_matches('/').to_string();
        }
        sync.validate()?;

        Ok(Self {
            sync,
            token: lookup(ENV_TOKEN).filter(|t| !t.is_empty()),
            data_dir: lookup(ENV_DATA_DIR).map(PathBuf::from),
        })
    }

    /// Set the bearer token
    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token;
    }

    /// Get the bearer token
    pub fn get_token(&self) -> Option<&String> {
        self.token.as_ref()
    }

    /// Clear the token (logout)
    pub fn clear_token(&mut self) {
        self.token = None;
    }

    /// Get the full URL for an API endpoint
    pub fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.server_url(), path)
    }

    pub fn server_url(&self) -> &str {
        &self.sync.server_url
    }

    pub fn sync(&self) -> &SyncConfig {
        &self.sync
    }

    /// Location of the queue database
    pub fn db_path(&self) -> PathBuf {
        match &self.data_dir {
            Some(dir) => dir.join("queue.db"),
            None => LocalDatabase::default_path(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_config_new() {
        let config = Config::new();
        assert_eq!(config.server_url(), "http://127.0.0.1:3000");
        assert!(config.get_token().is_none());
        assert!(config.db_path().ends_with("claimsync/queue.db"));
    }

    #[test]
    fn test_set_and_clear_token() {
        let mut config = Config::new();
        config.set_token(Some("test_token".to_string()));
        assert_eq!(config.get_token(), Some(&"test_token".to_string()));
        config.clear_token();
        assert!(config.get_token().is_none());
    }

    #[test]
    fn test_api_url() {
        let config = Config::new();
        assert_eq!(config.api_url("/api/claims"), "http://127.0.0.1:3000/api/claims");
    }

    #[test]
    fn test_environment_overrides() {
        let config = Config::from_lookup(lookup(&[
            (ENV_API_URL, "https://claims.example.com/"),
            (ENV_DATA_DIR, "/tmp/claimsync-test"),
            (ENV_TOKEN, "abc"),
        ]))
        .unwrap();

        assert_eq!(config.server_url(), "https://claims.example.com");
        assert_eq!(config.db_path(), PathBuf::from("/tmp/claimsync-test/queue.db"));
        assert_eq!(config.get_token().map(String::as_str), Some("abc"));
    }

    #[test]
    fn test_config_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("claimsync.toml");
        std::fs::write(&path, "max_retries = 7\nconflict_strategy = \"server_wins\"\n").unwrap();

        let config = Config::from_lookup(lookup(&[(ENV_CONFIG, path.to_str().unwrap())])).unwrap();
        assert_eq!(config.sync().max_retries, 7);
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        let result = Config::from_lookup(lookup(&[(ENV_API_URL, "ftp://claims")]));
        let err = tokio_test::assert_err!(result);
        assert!(matches!(err, ConfigError::InvalidUrl(_)));
    }
}
