//! Connection registry: at most one live southbound adapter per device name.

use std::collections::HashMap;
use std::sync::Arc;

use opendm_agent::{Adapter, AdapterTable, AgentError};
use opendm_core::DeviceRecord;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Process-wide map `device name → adapter`. The mutex is held across the
/// whole lookup-connect-insert critical section, which is what enforces the
/// single-adapter-per-device invariant; `connect` is the only blocking step
/// and the map is consulted only at operation boundaries.
pub struct ConnectionRegistry {
    adapters: Mutex<HashMap<String, Arc<dyn Adapter>>>,
    table: AdapterTable,
}

impl ConnectionRegistry {
    pub fn new(table: AdapterTable) -> Self {
        Self {
            adapters: Mutex::new(HashMap::new()),
            table,
        }
    }

    /// Return the device's adapter, lazily creating and connecting one on
    /// first use. A failed connect inserts nothing.
    pub async fn acquire(&self, rec: &DeviceRecord) -> Result<Arc<dyn Adapter>, AgentError> {
        let mut adapters = self.adapters.lock().await;
        if let Some(adapter) = adapters.get(&rec.name) {
            return Ok(adapter.clone());
        }

        let adapter = self.table.create(rec)?;
        adapter.connect().await?;
        adapters.insert(rec.name.clone(), adapter.clone());
        info!(device = %rec.name, uri = %rec.uri, "southbound session established");
        Ok(adapter)
    }

    /// Drop the entry. The adapter is not closed here; the call site that
    /// detected termination owns the disconnect.
    pub async fn release(&self, name: &str) {
        if name.is_empty() {
            return;
        }
        self.adapters.lock().await.remove(name);
        debug!(device = %name, "southbound session released");
    }

    /// Whether a device currently holds a live adapter.
    pub async fn contains(&self, name: &str) -> bool {
        self.adapters.lock().await.contains_key(name)
    }

    /// Drop every entry; process teardown only.
    pub async fn shutdown(&self) {
        let mut adapters = self.adapters.lock().await;
        let count = adapters.len();
        adapters.clear();
        info!(count, "connection registry cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opendm_agent::{AdapterFactory, MockAdapter, MockAdapterFactory};

    fn record(name: &str) -> DeviceRecord {
        DeviceRecord {
            name: name.into(),
            uri: "127.0.0.1:1".into(),
            ..Default::default()
        }
    }

    fn registry_over(mock: Arc<MockAdapter>) -> ConnectionRegistry {
        let factory: Arc<dyn AdapterFactory> = Arc::new(MockAdapterFactory::new(mock));
        ConnectionRegistry::new(AdapterTable::new(factory))
    }

    #[tokio::test]
    async fn concurrent_acquires_connect_once() {
        let mock = Arc::new(MockAdapter::new("u-1"));
        let registry = Arc::new(registry_over(mock.clone()));
        let rec = record("olt-1");

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            let rec = rec.clone();
            tasks.push(tokio::spawn(async move { registry.acquire(&rec).await }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(mock.connect_count(), 1);
        assert!(registry.contains("olt-1").await);
    }

    #[tokio::test]
    async fn failed_connect_inserts_nothing() {
        let mock = Arc::new(MockAdapter::new("u-1").failing_connect());
        let registry = registry_over(mock.clone());
        let rec = record("olt-1");

        assert!(registry.acquire(&rec).await.is_err());
        assert!(!registry.contains("olt-1").await);

        // Next acquire dials again rather than reusing a dead entry.
        assert!(registry.acquire(&rec).await.is_err());
        assert_eq!(mock.connect_count(), 2);
    }

    #[tokio::test]
    async fn release_then_acquire_reconnects() {
        let mock = Arc::new(MockAdapter::new("u-1"));
        let registry = registry_over(mock.clone());
        let rec = record("olt-1");

        registry.acquire(&rec).await.unwrap();
        registry.release("olt-1").await;
        assert!(!registry.contains("olt-1").await);

        registry.acquire(&rec).await.unwrap();
        assert_eq!(mock.connect_count(), 2);
    }

    #[tokio::test]
    async fn shutdown_drops_all_entries() {
        let mock = Arc::new(MockAdapter::new("u-1"));
        let registry = registry_over(mock);
        registry.acquire(&record("olt-1")).await.unwrap();
        registry.acquire(&record("olt-2")).await.unwrap();

        registry.shutdown().await;
        assert!(!registry.contains("olt-1").await);
        assert!(!registry.contains("olt-2").await);
    }
}
