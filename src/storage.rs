//! Key-value persistence behind the watch-state store.
//!
//! The store only ever needs whole-value reads and writes of a handful of
//! keys, so the backend is a small trait that tests can swap for memory.

use crate::error::{AppError, Result};
use log::{debug, warn};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Key holding the serialized watchlist.
pub const WATCHLIST_KEY: &str = "watchlist";

/// Key holding the serialized continue-watching list.
pub const CONTINUE_WATCHING_KEY: &str = "continue_watching";

/// Durable string storage scoped to one user and one machine.
pub trait KeyValueStore: Send + Sync {
    /// Read a value. Missing keys and unreadable backends both yield `None`.
    fn get(&self, key: &str) -> Option<String>;

    /// Replace a value in full.
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Stores each key as `<key>.json` inside a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(content) => Some(content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!("Could not read {}: {}", path.display(), e);
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)?;

        // Write to a sibling file first so a crash never leaves half a collection.
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;

        debug!("Wrote {} bytes to {}", value.len(), path.display());
        Ok(())
    }
}

/// In-process store, used for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
    reject_writes: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose every write fails, as when a storage quota is exhausted.
    pub fn failing_writes() -> Self {
        Self {
            values: Mutex::new(HashMap::new()),
            reject_writes: true,
        }
    }

    /// Seed a raw value, bypassing write failures.
    pub fn with_value(self, key: &str, value: &str) -> Self {
        if let Ok(mut values) = self.values.lock() {
            values.insert(key.to_string(), value.to_string());
        }
        self
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        if self.reject_writes {
            return Err(AppError::Storage(format!("quota exceeded writing '{}'", key)));
        }

        let mut values = self
            .values
            .lock()
            .map_err(|_| AppError::Storage("memory store lock poisoned".to_string()))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        std::env::temp_dir().join(format!("cineflow-{}-{}-{}", name, std::process::id(), nanos))
    }

    #[test]
    fn test_memory_store_get_set() {
        let store = MemoryStore::new();
        assert!(store.get(WATCHLIST_KEY).is_none());

        store.set(WATCHLIST_KEY, "[]").unwrap();
        assert_eq!(store.get(WATCHLIST_KEY).as_deref(), Some("[]"));
    }

    #[test]
    fn test_failing_store_rejects_writes() {
        let store = MemoryStore::failing_writes().with_value(WATCHLIST_KEY, "[1]");
        assert!(matches!(store.set(WATCHLIST_KEY, "[]"), Err(AppError::Storage(_))));
        assert_eq!(store.get(WATCHLIST_KEY).as_deref(), Some("[1]"));
    }

    #[test]
    fn test_file_store_missing_key() {
        let store = FileStore::new(temp_dir("missing"));
        assert!(store.get(CONTINUE_WATCHING_KEY).is_none());
    }

    #[test]
    fn test_file_store_creates_directory_and_persists() {
        let dir = temp_dir("persist");
        let store = FileStore::new(&dir);

        store.set(CONTINUE_WATCHING_KEY, "[{\"id\":1}]").unwrap();
        assert!(dir.join("continue_watching.json").exists());
        assert!(!dir.join("continue_watching.json.tmp").exists());

        let reopened = FileStore::new(&dir);
        assert_eq!(
            reopened.get(CONTINUE_WATCHING_KEY).as_deref(),
            Some("[{\"id\":1}]")
        );

        let _ = fs::remove_dir_all(dir);
    }
}
