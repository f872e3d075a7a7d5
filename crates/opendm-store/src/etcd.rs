//! Production KV backend over etcd v3.

use std::time::Duration;

use async_trait::async_trait;
use etcd_client::{Client, ConnectOptions, DeleteOptions, GetOptions};
use tracing::{debug, info, warn};

use crate::kv::{KvStore, StoreError};

/// [`KvStore`] backed by an etcd cluster. The client multiplexes one gRPC
/// channel and is cheap to clone per call; every operation runs under the
/// configured per-call timeout.
pub struct EtcdStore {
    client: Client,
    timeout: Duration,
}

impl EtcdStore {
    /// Connect to the store. Fails when the endpoint is unreachable within
    /// the timeout; startup treats that as fatal.
    pub async fn connect(endpoint: &str, timeout: Duration) -> Result<Self, StoreError> {
        let options = ConnectOptions::new()
            .with_timeout(timeout)
            .with_connect_timeout(timeout);
        let client = Client::connect([endpoint], Some(options))
            .await
            .map_err(|e| StoreError::ConnectionLost(e.to_string()))?;
        info!(endpoint, "connected to kv store");
        Ok(Self { client, timeout })
    }

    /// Block until the store answers a status probe, retrying on a fixed
    /// cadence up to `max_retries` attempts.
    pub async fn wait_until_reachable(
        &self,
        max_retries: u32,
        retry_interval: Duration,
    ) -> Result<(), StoreError> {
        let mut attempt = 0;
        loop {
            let mut client = self.client.clone();
            match tokio::time::timeout(self.timeout, client.status()).await {
                Ok(Ok(_)) => {
                    info!("kv store reachable");
                    return Ok(());
                }
                Ok(Err(e)) => warn!(error = %e, attempt, "kv store status probe failed"),
                Err(_) => warn!(attempt, "kv store status probe timed out"),
            }
            attempt += 1;
            if attempt >= max_retries {
                return Err(StoreError::ConnectionLost(
                    "kv store unreachable".to_string(),
                ));
            }
            tokio::time::sleep(retry_interval).await;
        }
    }

    async fn run<T, F>(&self, fut: F) -> Result<T, StoreError>
    where
        F: std::future::Future<Output = Result<T, etcd_client::Error>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(map_error(e)),
            Err(_) => Err(StoreError::ConnectionLost(
                "kv operation timed out".to_string(),
            )),
        }
    }
}

fn map_error(err: etcd_client::Error) -> StoreError {
    if matches!(&err, etcd_client::Error::TransportError(_) | etcd_client::Error::IoError(_)) {
        return StoreError::ConnectionLost(err.to_string());
    }
    let text = err.to_string();
    let lowered = text.to_ascii_lowercase();
    if lowered.contains("unavailable") || lowered.contains("deadline") {
        StoreError::ConnectionLost(text)
    } else {
        StoreError::Backend(text)
    }
}

fn utf8(bytes: &[u8]) -> Result<String, StoreError> {
    String::from_utf8(bytes.to_vec())
        .map_err(|e| StoreError::Backend(format!("non-utf8 kv payload: {e}")))
}

#[async_trait]
impl KvStore for EtcdStore {
    async fn get(&self, key: &str) -> Result<String, StoreError> {
        debug!(key, "kv get");
        let mut client = self.client.clone();
        let resp = self.run(client.get(key, None)).await?;
        match resp.kvs().first() {
            Some(kv) => utf8(kv.value()),
            None => Err(StoreError::NotFound),
        }
    }

    async fn list(
        &self,
        prefix: &str,
    ) -> Result<std::collections::HashMap<String, String>, StoreError> {
        debug!(prefix, "kv list");
        let mut client = self.client.clone();
        let resp = self
            .run(client.get(prefix, Some(GetOptions::new().with_prefix())))
            .await?;
        let mut entries = std::collections::HashMap::with_capacity(resp.kvs().len());
        for kv in resp.kvs() {
            entries.insert(utf8(kv.key())?, utf8(kv.value())?);
        }
        Ok(entries)
    }

    async fn put(&self, key: &str, value: String) -> Result<(), StoreError> {
        debug!(key, "kv put");
        let mut client = self.client.clone();
        self.run(client.put(key, value, None)).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        debug!(key, "kv delete");
        let mut client = self.client.clone();
        self.run(client.delete(key, None)).await?;
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<(), StoreError> {
        debug!(prefix, "kv delete prefix");
        let mut client = self.client.clone();
        self.run(client.delete(prefix, Some(DeleteOptions::new().with_prefix())))
            .await?;
        Ok(())
    }
}
