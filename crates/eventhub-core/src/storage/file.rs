//! JSON file backend
//!
//! All entries live in one JSON object. Every write rewrites the whole file
//! through a temporary sibling and a rename, so a crash never leaves a
//! half-written session behind. The file is created readable by its owner
//! only. A file that cannot be parsed reads as empty and is replaced by the
//! next write.

use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use super::DurableStore;
use crate::error::{Error, Result};

/// File-backed store
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Entries on disk, and whether the file was corrupt
    fn read_all(&self) -> Result<(BTreeMap<String, String>, bool)> {
        match fs::read(&self.path) {
            Ok(contents) if contents.iter().all(u8::is_ascii_whitespace) => {
                Ok((BTreeMap::new(), false))
            }
            Ok(contents) => match serde_json::from_slice(&contents) {
                Ok(entries) => Ok((entries, false)),
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "Ignoring corrupt session file");
                    Ok((BTreeMap::new(), true))
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => Ok((BTreeMap::new(), false)),
            Err(e) => Err(Error::Storage(format!(
                "Failed to read session file {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if entries.is_empty() {
            return match fs::remove_file(&self.path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            };
        }

        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        // Created with owner-only permissions
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&serde_json::to_vec_pretty(entries)?)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| Error::Io(e.error))?;

        debug!(path = %self.path.display(), entries = entries.len(), "Session file written");
        Ok(())
    }

    fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut BTreeMap<String, String>) -> bool,
    {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| Error::Storage("file store lock poisoned".to_string()))?;

        let (mut entries, corrupt) = self.read_all()?;
        if f(&mut entries) || corrupt {
            self.write_all(&entries)?;
        }
        Ok(())
    }
}

impl DurableStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read_all()?.0.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.update(|entries| {
            entries.insert(key.to_string(), value.to_string());
            true
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.update(|entries| entries.remove(key).is_some())
    }
}
