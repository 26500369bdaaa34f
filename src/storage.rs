//! Durable key-value storage.
//!
//! Every persisted concern (AI config, settings, battle cache, scores,
//! autosave, emoji cache) lives under its own key in one store. Reads are
//! forgiving: a missing or malformed value reads as absent.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{error, warn};

use crate::error::StorageError;

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&self, key: &str, value: Value) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Read-modify-write of one key, atomic with respect to every other
    /// call on the same store.
    fn update(
        &self,
        key: &str,
        apply: &mut dyn FnMut(Option<Value>) -> Result<Value, StorageError>,
    ) -> Result<(), StorageError>;
}

/// Reads `key` and decodes it, treating decode failures as absent.
pub fn load<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Option<T> {
    let raw = store.get(key)?;
    match serde_json::from_value(raw) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(key, error = %err, "ignoring malformed stored value");
            None
        }
    }
}

/// Encodes and writes `value`. Failures are logged and reported as `false`.
pub fn save<T: Serialize>(store: &dyn KeyValueStore, key: &str, value: &T) -> bool {
    let result = serde_json::to_value(value)
        .map_err(StorageError::from)
        .and_then(|v| store.set(key, v));
    match result {
        Ok(()) => true,
        Err(err) => {
            error!(key, error = %err, "failed to persist value");
            false
        }
    }
}

/// Decodes the value under `key` (default when absent or malformed), lets
/// `change` edit it and writes it back while the store is locked.
pub fn modify<T, F>(store: &dyn KeyValueStore, key: &str, change: F) -> bool
where
    T: Serialize + DeserializeOwned + Default,
    F: FnOnce(&mut T),
{
    let mut change = Some(change);
    let result = store.update(key, &mut |current| {
        let mut value: T = match current.map(serde_json::from_value) {
            Some(Ok(value)) => value,
            Some(Err(err)) => {
                warn!(key, error = %err, "replacing malformed stored value");
                T::default()
            }
            None => T::default(),
        };
        if let Some(change) = change.take() {
            change(&mut value);
        }
        Ok(serde_json::to_value(&value)?)
    });
    match result {
        Ok(()) => true,
        Err(err) => {
            error!(key, error = %err, "failed to update value");
            false
        }
    }
}

/// Removes `key`, logging instead of failing.
pub fn discard(store: &dyn KeyValueStore, key: &str) {
    if let Err(err) = store.remove(key) {
        error!(key, error = %err, "failed to remove stored value");
    }
}

/// In-memory store. Used by tests and by sessions that should not touch disk.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Value>>,
    reject_writes: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose writes always fail, as a full disk or quota would.
    pub fn rejecting_writes() -> Self {
        Self {
            entries: Mutex::default(),
            reject_writes: true,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn check_writable(&self) -> Result<(), StorageError> {
        if self.reject_writes {
            return Err(StorageError::Io(std::io::Error::other(
                "store quota exceeded",
            )));
        }
        Ok(())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        self.check_writable()?;
        self.entries.lock().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.check_writable()?;
        self.entries.lock().remove(key);
        Ok(())
    }

    fn update(
        &self,
        key: &str,
        apply: &mut dyn FnMut(Option<Value>) -> Result<Value, StorageError>,
    ) -> Result<(), StorageError> {
        self.check_writable()?;
        let mut entries = self.entries.lock();
        let next = apply(entries.get(key).cloned())?;
        entries.insert(key.to_string(), next);
        Ok(())
    }
}

/// A single JSON document on disk holding every key.
///
/// The whole document is rewritten on each mutation, and the in-memory view
/// only changes once that write has succeeded. Separate processes sharing
/// the file are not coordinated; the last write wins.
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, Value>>,
}

impl JsonFileStore {
    /// Opens `path`, starting empty if the file is missing or unreadable.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read_to_string(&path) {
            Ok(s) => serde_json::from_str(&s).unwrap_or_else(|err| {
                warn!(path = %path.display(), error = %err, "state file is not valid JSON, starting fresh");
                BTreeMap::new()
            }),
            Err(_) => BTreeMap::new(),
        };
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &BTreeMap<String, Value>) -> Result<(), StorageError> {
        let serialized = serde_json::to_string_pretty(entries)?;
        fs::write(&self.path, serialized)?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        let mut entries = self.entries.lock();
        let mut next = entries.clone();
        next.insert(key.to_string(), value);
        self.flush(&next)?;
        *entries = next;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock();
        if !entries.contains_key(key) {
            return Ok(());
        }
        let mut next = entries.clone();
        next.remove(key);
        self.flush(&next)?;
        *entries = next;
        Ok(())
    }

    fn update(
        &self,
        key: &str,
        apply: &mut dyn FnMut(Option<Value>) -> Result<Value, StorageError>,
    ) -> Result<(), StorageError> {
        let mut entries = self.entries.lock();
        let mut next = entries.clone();
        next.insert(key.to_string(), apply(entries.get(key).cloned())?);
        self.flush(&next)?;
        *entries = next;
        Ok(())
    }
}
