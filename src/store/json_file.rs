//! JSON file store.
//!
//! The whole document is held in memory and rewritten to disk as
//! pretty-printed JSON on every save. A save writes `<file>.tmp` and renames
//! it over the document, so an interrupted save leaves the previous version. Saves are serialized: each save
//! snapshots the document after taking the save lock, so a later save
//! always writes a document at least as new as an earlier one.

use super::{assoc_path, get_path, KeyPath, StateStore, StoreError};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::io;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

/// Options for opening a [`JsonFileStore`].
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Backing file.
    pub path: PathBuf,

    /// Name used in log messages (e.g. `cache`, `settings`).
    pub name: String,

    /// Create an empty document when the file does not exist.
    pub create_if_missing: bool,
}

impl StoreOptions {
    /// Options for a store that must already exist.
    pub fn new(path: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            create_if_missing: false,
        }
    }

    /// Sets whether a missing file is created.
    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }
}

/// A [`StateStore`] persisted to a single JSON file.
#[derive(Debug)]
pub struct JsonFileStore {
    name: String,
    path: PathBuf,
    db: RwLock<Value>,
    save_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Opens the store, reading the existing file.
    ///
    /// When the file is missing and `create_if_missing` is set, an empty
    /// document is written first (including parent directories).
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` if the file cannot be read or created,
    /// `StoreError::Json` if it is not valid JSON, and
    /// `StoreError::NotAnObject` if it holds something other than an object.
    pub async fn open(options: StoreOptions) -> Result<Self, StoreError> {
        let store = Self {
            name: options.name,
            path: options.path,
            db: RwLock::new(Value::Object(Map::new())),
            save_lock: Mutex::new(()),
        };

        match tokio::fs::read_to_string(&store.path).await {
            Ok(content) => {
                let document: Value = serde_json::from_str(&content)?;
                if !document.is_object() {
                    return Err(StoreError::NotAnObject { path: store.path });
                }
                *store.db.write().await = document;
                debug!(store = %store.name, path = %store.path.display(), "store loaded");
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound && options.create_if_missing => {
                info!(store = %store.name, path = %store.path.display(), "creating new store");
                store.save().await?;
            }
            Err(e) => {
                return Err(StoreError::Io {
                    path: store.path,
                    source: e,
                })
            }
        }

        Ok(store)
    }

    /// The backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The store's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sibling file that receives a save before it replaces the document.
    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl StateStore for JsonFileStore {
    async fn get(&self, path: &KeyPath) -> Option<Value> {
        get_path(&*self.db.read().await, path).cloned()
    }

    async fn set(&self, path: &KeyPath, value: Value) {
        assoc_path(&mut *self.db.write().await, path, value);
    }

    async fn save(&self) -> Result<(), StoreError> {
        let _guard = self.save_lock.lock().await;
        let content = serde_json::to_string_pretty(&*self.db.read().await)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Io {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }

        // Write to a temporary file first, then replace the document in one step
        let temp_path = self.temp_path();
        tokio::fs::write(&temp_path, content)
            .await
            .map_err(|e| StoreError::Io {
                path: temp_path.clone(),
                source: e,
            })?;
        tokio::fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| StoreError::Io {
                path: self.path.clone(),
                source: e,
            })
    }
}
