//! OS keyring backend
//!
//! Stores each session entry in the operating system's credential store
//! (macOS Keychain, Windows Credential Manager, Linux Secret Service).

use keyring::Entry;

use super::DurableStore;
use crate::error::{Error, Result};

/// Service name used for keyring storage
const KEYRING_SERVICE: &str = "eventhub";

/// Keyring-backed store. Each key becomes the keyring "user" of one entry.
#[derive(Debug, Clone)]
pub struct KeyringStore {
    service: String,
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyringStore {
    pub fn new() -> Self {
        Self::with_service(KEYRING_SERVICE)
    }

    /// Use a custom service name, e.g. to isolate tests
    pub fn with_service(service: &str) -> Self {
        Self {
            service: service.to_string(),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry> {
        Entry::new(&self.service, key)
            .map_err(|e| Error::Storage(format!("Failed to create keyring entry: {}", e)))
    }
}

impl DurableStore for KeyringStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(Error::Storage(format!(
                "Failed to read '{}' from keyring: {}",
                key, e
            ))),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entry(key)?.set_password(value).map_err(|e| {
            Error::Storage(format!("Failed to store '{}' in keyring: {}", key, e))
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        match self.entry(key)?.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(Error::Storage(format!(
                "Failed to delete '{}' from keyring: {}",
                key, e
            ))),
        }
    }
}
