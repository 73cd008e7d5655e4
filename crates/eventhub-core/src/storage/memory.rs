use std::collections::HashMap;
use std::sync::Mutex;

use super::DurableStore;
use crate::error::{Error, Result};

/// In-memory store.
///
/// Nothing survives the process; use it for tests or throwaway sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with entries
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: Mutex::new(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> Error {
    Error::Storage("memory store lock poisoned".to_string())
}

impl DurableStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().map_err(|_| poisoned())?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().map_err(|_| poisoned())?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().map_err(|_| poisoned())?;
        entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{TOKEN_KEY, USER_KEY};

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert!(store.is_empty());

        store.set(TOKEN_KEY, "tok1").unwrap();
        assert_eq!(store.get(TOKEN_KEY).unwrap().as_deref(), Some("tok1"));

        store.set(TOKEN_KEY, "tok2").unwrap();
        assert_eq!(store.get(TOKEN_KEY).unwrap().as_deref(), Some("tok2"));
        assert_eq!(store.len(), 1);

        store.remove(TOKEN_KEY).unwrap();
        assert!(store.get(TOKEN_KEY).unwrap().is_none());
    }

    #[test]
    fn test_memory_store_remove_missing_is_ok() {
        let store = MemoryStore::new();
        assert!(store.remove(USER_KEY).is_ok());
    }

    #[test]
    fn test_memory_store_seeded() {
        let store = MemoryStore::with_entries([(TOKEN_KEY, "abc"), (USER_KEY, "{\"id\":1}")]);
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(USER_KEY).unwrap().as_deref(), Some("{\"id\":1}"));
    }
}
