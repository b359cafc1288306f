//! In-memory store.

use super::{assoc_path, get_path, KeyPath, StateStore, StoreError};
use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

/// A [`StateStore`] that never touches disk.
///
/// `save` always succeeds. Used for clients built without a cache file and
/// throughout the test suite.
#[derive(Debug)]
pub struct MemoryStore {
    db: RwLock<Value>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::with_document(Value::Object(Map::new()))
    }

    /// Creates a store seeded with `document`.
    pub fn with_document(document: Value) -> Self {
        Self {
            db: RwLock::new(document),
        }
    }

    /// Returns a copy of the whole document.
    pub async fn snapshot(&self) -> Value {
        self.db.read().await.clone()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get(&self, path: &KeyPath) -> Option<Value> {
        get_path(&*self.db.read().await, path).cloned()
    }

    async fn set(&self, path: &KeyPath, value: Value) {
        assoc_path(&mut *self.db.write().await, path, value);
    }

    async fn save(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
