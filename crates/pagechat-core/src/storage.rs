//! Key-value persistence scoped to one install.
//!
//! [`FileStore`] keeps every key in a single JSON object on disk; removing the
//! file is the same as uninstalling. [`MemoryStore`] backs tests and stands in
//! when there is no data directory.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::Value;

use crate::config::Config;
use crate::error::StorageError;
use crate::state::Transcript;

/// Key holding the serialized transcript
pub const TRANSCRIPT_KEY: &str = "chatMessages";

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;
    fn set(&self, key: &str, value: Value) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for std::sync::Arc<S> {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        (**self).remove(key)
    }
}

/// Load the stored transcript. `Ok(None)` when nothing was ever saved.
pub fn load_transcript(store: &dyn KeyValueStore) -> Result<Option<Transcript>, StorageError> {
    match store.get(TRANSCRIPT_KEY)? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

pub fn save_transcript(store: &dyn KeyValueStore, transcript: &Transcript) -> Result<(), StorageError> {
    store.set(TRANSCRIPT_KEY, serde_json::to_value(transcript)?)
}

/// JSON-file backed store
pub struct FileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: Mutex::new(()) }
    }

    /// Store at the default location under the platform data directory
    pub fn open_default() -> Result<Self, StorageError> {
        Config::storage_path()
            .map(Self::new)
            .ok_or(StorageError::NoDataDir)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, Value>, StorageError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }

        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    fn write_all(&self, entries: &BTreeMap<String, Value>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write to a sibling file and rename so a crash never leaves half a file.
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, serde_json::to_string_pretty(entries)?)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let _guard = self.guard();
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        let _guard = self.guard();
        let mut entries = self.read_all()?;
        entries.insert(key.to_string(), value);
        self.write_all(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let _guard = self.guard();
        let mut entries = self.read_all()?;
        if entries.remove(key).is_some() {
            self.write_all(&entries)?;
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Value>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        self.entries().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ChatMessage;
    use tempfile::TempDir;

    #[test]
    fn test_file_store_missing_file_reads_none() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path().join("nested").join("storage.json"));
        assert_eq!(store.get(TRANSCRIPT_KEY).unwrap(), None);
    }

    #[test]
    fn test_file_store_keeps_other_keys() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path().join("storage.json"));

        store.set("installedAt", serde_json::json!(1700000000)).unwrap();
        store.set("other", serde_json::json!("x")).unwrap();
        store.remove("other").unwrap();

        assert_eq!(store.get("installedAt").unwrap(), Some(serde_json::json!(1700000000)));
        assert_eq!(store.get("other").unwrap(), None);
    }

    #[test]
    fn test_transcript_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("storage.json");
        let transcript = Transcript::greeting()
            .with(ChatMessage::user("What does this page say?"))
            .with(ChatMessage::error("Backend returned status 500: boom"))
            .with(ChatMessage::assistant("It says hello."));

        save_transcript(&FileStore::new(&path), &transcript).unwrap();

        let reopened = FileStore::new(&path);
        assert_eq!(load_transcript(&reopened).unwrap(), Some(transcript));
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("storage.json");
        fs::write(&path, "{not json").unwrap();

        let store = FileStore::new(&path);
        assert!(matches!(store.get(TRANSCRIPT_KEY), Err(StorageError::Serde(_))));
    }

    #[test]
    fn test_wrong_shape_transcript_is_an_error() {
        let store = MemoryStore::new();
        store.set(TRANSCRIPT_KEY, serde_json::json!({ "role": "user" })).unwrap();
        assert!(load_transcript(&store).is_err());
    }
}
