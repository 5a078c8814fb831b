//! Client Module
//!
//! Everything that runs next to the dashboard: the durable mutation queue,
//! the sync engine and the HTTP client for the claims API.
//!
//! # Module Structure
//!
//! ```text
//! client/
//! ├── mod.rs        - Module exports
//! ├── main.rs       - Headless sync agent (binary)
//! ├── config.rs     - Environment overrides, token, database location
//! ├── api_client.rs - reqwest implementation of `RemoteApi`
//! ├── local_db/     - SQLite persistence (queue, conflicts, metadata)
//! ├── offline/      - Action queue, storage quota, backoff, `OfflineManager`
//! └── sync/         - Sync engine, conflict resolver, connectivity, reporting
//! ```

pub mod api_client;
pub mod config;
pub mod local_db;
pub mod offline;
pub mod sync;

// Re-export commonly used types
pub use api_client::HttpRemoteApi;
pub use config::Config;
pub use local_db::LocalDatabase;
pub use offline::OfflineManager;
pub use sync::{SyncEngine, SyncState, SyncStatus};
