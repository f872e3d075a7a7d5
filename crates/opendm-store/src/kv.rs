//! The KV facade: typed access to an ordered key-value store.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced by the store layer.
///
/// `ConnectionLost` is distinct from the other kinds so callers can degrade
/// instead of retrying a higher-level operation against a dead store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("key not found")]
    NotFound,

    #[error("kv connection lost: {0}")]
    ConnectionLost(String),

    #[error("missing {0} field")]
    MissingField(&'static str),

    #[error("decode failed: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("kv backend error: {0}")]
    Backend(String),
}

/// Narrow interface over the backing key-value store. Values are opaque
/// strings; callers serialize as JSON. The facade owns no caching.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read one key. `NotFound` when absent.
    async fn get(&self, key: &str) -> Result<String, StoreError>;

    /// Read every key under a prefix. An empty map when nothing matches.
    async fn list(&self, prefix: &str) -> Result<HashMap<String, String>, StoreError>;

    /// Write one key, last-writer-wins.
    async fn put(&self, key: &str, value: String) -> Result<(), StoreError>;

    /// Delete one key. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Delete every key under a prefix.
    async fn delete_prefix(&self, prefix: &str) -> Result<(), StoreError>;
}
