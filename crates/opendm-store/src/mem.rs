//! In-process KV store used by tests.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::kv::{KvStore, StoreError};

/// Map-backed [`KvStore`]. Can be switched into a "connection lost" mode to
/// exercise degraded paths.
#[derive(Default)]
pub struct MemStore {
    entries: RwLock<HashMap<String, String>>,
    down: RwLock<bool>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with `ConnectionLost`.
    pub fn set_down(&self, down: bool) {
        *self.down.write() = down;
    }

    /// Number of stored keys, for test assertions.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn check_up(&self) -> Result<(), StoreError> {
        if *self.down.read() {
            return Err(StoreError::ConnectionLost("store marked down".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl KvStore for MemStore {
    async fn get(&self, key: &str) -> Result<String, StoreError> {
        self.check_up()?;
        self.entries
            .read()
            .get(key)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn list(&self, prefix: &str) -> Result<HashMap<String, String>, StoreError> {
        self.check_up()?;
        Ok(self
            .entries
            .read()
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn put(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.check_up()?;
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.check_up()?;
        self.entries.write().remove(key);
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<(), StoreError> {
        self.check_up()?;
        self.entries.write().retain(|k, _| !k.starts_with(prefix));
        Ok(())
    }
}
