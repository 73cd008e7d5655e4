//! Durable key-value storage for session state
//!
//! Holds the two entries that must survive a restart:
//! - `token`: the bearer credential issued at login
//! - `user`: the JSON-serialized identity
//!
//! Backends:
//! - [`FileStore`]: a JSON file in the config directory (default)
//! - [`KeyringStore`]: the OS credential store
//! - [`MemoryStore`]: process-local, for tests

mod file;
mod keychain;
mod memory;

use std::sync::Arc;

use crate::config::StorageConfig;
use crate::error::{Error, Result};

pub use file::FileStore;
pub use keychain::KeyringStore;
pub use memory::MemoryStore;

/// Storage key for the bearer credential
pub const TOKEN_KEY: &str = "token";

/// Storage key for the serialized identity
pub const USER_KEY: &str = "user";

/// Persistent string key-value store.
///
/// Calls are blocking and expected to be short.
pub trait DurableStore: Send + Sync {
    /// Read an entry, `None` if absent
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write an entry, replacing any previous value
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Delete an entry. Deleting a missing entry is not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

/// Open the backend named in the storage configuration
pub fn open(config: &StorageConfig) -> Result<Arc<dyn DurableStore>> {
    match config.backend.as_str() {
        "file" => {
            let path = config
                .session_path()
                .map_err(|e| Error::ConfigError(e.to_string()))?;
            Ok(Arc::new(FileStore::new(path)))
        }
        "keyring" => Ok(Arc::new(KeyringStore::new())),
        "memory" => Ok(Arc::new(MemoryStore::new())),
        other => Err(Error::ConfigError(format!(
            "Unknown storage backend '{}'",
            other
        ))),
    }
}
