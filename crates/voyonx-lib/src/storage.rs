//! String-keyed persisted slots.
//!
//! This module provides a single trait `StorageBackend` and two concrete
//! implementations:
//!
//! - `FileStorage`: stores a single JSON file containing a map of string keys
//!   to string values, located in a per-user configuration directory and
//!   read/written synchronously.
//! - `MemoryStorage`: a process-local map, for tests and throwaway sessions.
//!
//! Structured values go through the free `save_json_backend` /
//! `load_json_backend` helpers so the trait stays object-safe.

use serde::{Serialize, de::DeserializeOwned};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("JSON error: {0}")]
    Json(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Simple generic storage backend trait.
///
/// Keys and values are UTF-8 strings.
pub trait StorageBackend: Send + Sync {
    /// Store a string value for a key.
    fn set_string(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Read a string value for a key. Returns Ok(None) when key is missing.
    fn get_string(&self, key: &str) -> StorageResult<Option<String>>;
}

pub fn save_json_backend<T: Serialize>(
    backend: &dyn StorageBackend,
    key: &str,
    value: &T,
) -> StorageResult<()> {
    let s = serde_json::to_string(value).map_err(|e| StorageError::Json(e.to_string()))?;
    backend.set_string(key, &s)
}

pub fn load_json_backend<T: DeserializeOwned>(
    backend: &dyn StorageBackend,
    key: &str,
) -> StorageResult<Option<T>> {
    match backend.get_string(key)? {
        Some(s) => serde_json::from_str::<T>(&s)
            .map(Some)
            .map_err(|e| StorageError::Json(e.to_string())),
        None => Ok(None),
    }
}

/// File-based storage: a single JSON file holding a map of key -> string value.
///
/// The file is read into memory on open; every mutation flushes it back.
pub struct FileStorage {
    path: PathBuf,
    inner: Mutex<HashMap<String, String>>,
}

impl FileStorage {
    /// Per-user default location:
    /// - On Windows: %APPDATA%/Voyonx/storage.json
    /// - Else: $HOME/.config/voyonx/storage.json
    pub fn default_storage_path() -> PathBuf {
        if cfg!(windows)
            && let Ok(appdata) = std::env::var("APPDATA")
        {
            return Path::new(&appdata).join("Voyonx").join("storage.json");
        }

        if let Ok(home) = std::env::var("HOME") {
            return Path::new(&home)
                .join(".config")
                .join("voyonx")
                .join("storage.json");
        }

        Path::new(".").join("voyonx-storage.json")
    }

    /// Open (or create) the storage file at `path`, or the default location.
    ///
    /// A file that does not parse as a JSON string map is reported as
    /// `StorageError::Json` and left untouched on disk.
    pub fn new_with_path(path: Option<PathBuf>) -> StorageResult<Self> {
        let path = path.unwrap_or_else(Self::default_storage_path);

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| {
                StorageError::Io(format!("Failed to create storage parent directory: {}", e))
            })?;
        }

        let mut map = HashMap::new();
        if path.exists() {
            let s = fs::read_to_string(&path)
                .map_err(|e| StorageError::Io(format!("Failed to read storage file: {}", e)))?;
            if !s.trim().is_empty() {
                map = serde_json::from_str::<HashMap<String, String>>(&s).map_err(|e| {
                    StorageError::Json(format!("Failed to parse storage JSON: {}", e))
                })?;
            }
        }

        tracing::debug!("Storage opened at {}", path.display());
        Ok(Self {
            path,
            inner: Mutex::new(map),
        })
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn flush_locked(&self, locked: &HashMap<String, String>) -> StorageResult<()> {
        let s =
            serde_json::to_string_pretty(locked).map_err(|e| StorageError::Json(e.to_string()))?;
        fs::write(&self.path, s).map_err(|e| StorageError::Io(format!("write failed: {}", e)))
    }
}

impl StorageBackend for FileStorage {
    fn set_string(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut guard = self.lock();
        guard.insert(key.to_string(), value.to_string());
        self.flush_locked(&guard)
    }

    fn get_string(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.lock().get(key).cloned())
    }
}

/// Process-local storage
#[derive(Default)]
pub struct MemoryStorage {
    inner: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StorageBackend for MemoryStorage {
    fn set_string(&self, key: &str, value: &str) -> StorageResult<()> {
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get_string(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.lock().get(key).cloned())
    }
}

/// Backend at `path`, or at the per-user default location.
pub fn default_storage_backend(path: Option<PathBuf>) -> StorageResult<Box<dyn StorageBackend>> {
    Ok(Box::new(FileStorage::new_with_path(path)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_storage_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("storage.json");

        {
            let storage = FileStorage::new_with_path(Some(path.clone())).unwrap();
            storage.set_string("a", "1").unwrap();
            storage.set_string("b", "2").unwrap();
            storage.set_string("a", "3").unwrap();
        }

        let reopened = FileStorage::new_with_path(Some(path)).unwrap();
        assert_eq!(reopened.get_string("a").unwrap().as_deref(), Some("3"));
        assert_eq!(reopened.get_string("b").unwrap().as_deref(), Some("2"));
        assert_eq!(reopened.get_string("c").unwrap(), None);
    }

    #[test]
    fn test_file_storage_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        fs::write(&path, "{not json").unwrap();

        let result = FileStorage::new_with_path(Some(path.clone()));
        assert!(matches!(result, Err(StorageError::Json(_))));
        // The broken file is not overwritten
        assert_eq!(fs::read_to_string(path).unwrap(), "{not json");
    }

    #[test]
    fn test_empty_file_is_empty_map() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        fs::write(&path, "  \n").unwrap();

        let storage = FileStorage::new_with_path(Some(path)).unwrap();
        assert_eq!(storage.get_string("anything").unwrap(), None);
    }

    #[test]
    fn test_json_helpers() {
        let storage = MemoryStorage::new();
        save_json_backend(&storage, "ids", &vec!["x", "y"]).unwrap();
        let ids: Option<Vec<String>> = load_json_backend(&storage, "ids").unwrap();
        assert_eq!(ids, Some(vec!["x".to_string(), "y".to_string()]));

        let missing: Option<Vec<String>> = load_json_backend(&storage, "nope").unwrap();
        assert_eq!(missing, None);

        storage.set_string("bad", "[1,").unwrap();
        let bad: StorageResult<Option<Vec<String>>> = load_json_backend(&storage, "bad");
        assert!(matches!(bad, Err(StorageError::Json(_))));
    }
}
