//! Cache-fronted repository for `DeviceRecord` rows.

use std::collections::HashMap;
use std::sync::Arc;

use opendm_core::wire::Hardware;
use opendm_core::DeviceRecord;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::keys;
use crate::kv::{KvStore, StoreError};

/// Owns `DeviceRecord` persistence: the primary name-keyed row, the
/// uuid→name lookup row, and a write-through cache over both. Reads go
/// cache-first; writes are last-writer-wins per key.
pub struct DeviceRepository {
    kv: Arc<dyn KvStore>,
    name_to_rec: RwLock<HashMap<String, DeviceRecord>>,
    uuid_to_name: RwLock<HashMap<String, String>>,
}

impl DeviceRepository {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            kv,
            name_to_rec: RwLock::new(HashMap::new()),
            uuid_to_name: RwLock::new(HashMap::new()),
        }
    }

    /// Look up a device by its caller-assigned name.
    pub async fn get_by_name(&self, name: &str) -> Result<DeviceRecord, StoreError> {
        if name.is_empty() {
            return Err(StoreError::MissingField("name"));
        }
        if let Some(rec) = self.name_to_rec.read().get(name) {
            return Ok(rec.clone());
        }

        let entry = self.kv.get(&keys::device_name_key(name)).await?;
        let rec: DeviceRecord = serde_json::from_str(&entry)?;
        self.name_to_rec.write().insert(name.to_string(), rec.clone());
        Ok(rec)
    }

    /// Look up a device by the uuid it reported, via the secondary index.
    pub async fn get_by_uuid(&self, uuid: &str) -> Result<DeviceRecord, StoreError> {
        if uuid.is_empty() {
            return Err(StoreError::MissingField("uuid"));
        }

        let cached = self.uuid_to_name.read().get(uuid).cloned();
        let name = match cached {
            Some(name) => name,
            None => self.kv.get(&keys::device_uuid_key(uuid)).await?,
        };
        self.uuid_to_name
            .write()
            .insert(uuid.to_string(), name.clone());

        self.get_by_name(&name).await
    }

    /// Every persisted device. Rows that fail to decode are skipped with a
    /// log record; a partial listing beats none.
    pub async fn get_all(&self) -> Result<Vec<DeviceRecord>, StoreError> {
        let rows = self.kv.list(&keys::device_name_prefix()).await?;
        let mut records = Vec::with_capacity(rows.len());
        for (key, entry) in rows {
            match serde_json::from_str::<DeviceRecord>(&entry) {
                Ok(rec) => records.push(rec),
                Err(e) => warn!(key, error = %e, "skipping undecodable device row"),
            }
        }
        Ok(records)
    }

    /// Persist the primary row and refresh the name cache.
    pub async fn put_by_name(&self, rec: &DeviceRecord) -> Result<(), StoreError> {
        if rec.name.is_empty() {
            return Err(StoreError::MissingField("name"));
        }
        let entry = serde_json::to_string(rec)?;
        self.kv.put(&keys::device_name_key(&rec.name), entry).await?;
        self.name_to_rec
            .write()
            .insert(rec.name.clone(), rec.clone());
        debug!(device = %rec.name, "stored device record");
        Ok(())
    }

    /// Persist the uuid→name lookup row and refresh the uuid cache.
    pub async fn put_uuid_lookup(&self, rec: &DeviceRecord) -> Result<(), StoreError> {
        if rec.uuid.is_empty() || rec.name.is_empty() {
            return Err(StoreError::MissingField("uuid"));
        }
        self.kv
            .put(&keys::device_uuid_key(&rec.uuid), rec.name.clone())
            .await?;
        self.uuid_to_name
            .write()
            .insert(rec.uuid.clone(), rec.name.clone());
        Ok(())
    }

    /// Remove both rows and their cache entries; each side is deleted
    /// whenever its key field is present.
    pub async fn delete(&self, rec: &DeviceRecord) -> Result<(), StoreError> {
        if !rec.name.is_empty() {
            self.kv.delete(&keys::device_name_key(&rec.name)).await?;
            self.name_to_rec.write().remove(&rec.name);
        }
        if !rec.uuid.is_empty() {
            self.kv.delete(&keys::device_uuid_key(&rec.uuid)).await?;
            self.uuid_to_name.write().remove(&rec.uuid);
        }
        debug!(device = %rec.name, uuid = %rec.uuid, "deleted device record");
        Ok(())
    }

    /// Fold a reported hardware view into the record and persist it.
    pub async fn save_hardware_snapshot(
        &self,
        rec: &mut DeviceRecord,
        hw: &Hardware,
    ) -> Result<(), StoreError> {
        rec.apply_hardware_snapshot(hw);
        self.put_by_name(rec).await
    }

    /// Evict cache entries without touching persisted rows.
    pub fn clear_cache_entry(&self, name: &str, uuid: &str) {
        if !name.is_empty() {
            self.name_to_rec.write().remove(name);
        }
        if !uuid.is_empty() {
            self.uuid_to_name.write().remove(uuid);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::MemStore;

    fn repo() -> (Arc<MemStore>, DeviceRepository) {
        let store = Arc::new(MemStore::new());
        let repo = DeviceRepository::new(store.clone());
        (store, repo)
    }

    fn record(name: &str, uuid: &str) -> DeviceRecord {
        DeviceRecord {
            name: name.into(),
            uuid: uuid.into(),
            uri: "10.0.0.1:50051".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn name_and_uuid_lookups_agree() {
        let (_, repo) = repo();
        let rec = record("olt-1", "u-1");
        repo.put_by_name(&rec).await.unwrap();
        repo.put_uuid_lookup(&rec).await.unwrap();

        assert_eq!(repo.get_by_name("olt-1").await.unwrap(), rec);
        assert_eq!(repo.get_by_uuid("u-1").await.unwrap(), rec);
    }

    #[tokio::test]
    async fn lookup_survives_cache_eviction() {
        let (_, repo) = repo();
        let rec = record("olt-1", "u-1");
        repo.put_by_name(&rec).await.unwrap();
        repo.put_uuid_lookup(&rec).await.unwrap();

        repo.clear_cache_entry("olt-1", "u-1");
        assert_eq!(repo.get_by_uuid("u-1").await.unwrap(), rec);
    }

    #[tokio::test]
    async fn delete_removes_both_rows() {
        let (store, repo) = repo();
        let rec = record("olt-1", "u-1");
        repo.put_by_name(&rec).await.unwrap();
        repo.put_uuid_lookup(&rec).await.unwrap();

        repo.delete(&rec).await.unwrap();
        assert!(matches!(
            repo.get_by_name("olt-1").await,
            Err(StoreError::NotFound)
        ));
        assert!(matches!(
            repo.get_by_uuid("u-1").await,
            Err(StoreError::NotFound)
        ));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn delete_handles_a_record_without_uuid() {
        let (store, repo) = repo();
        let rec = record("olt-1", "");
        repo.put_by_name(&rec).await.unwrap();

        repo.delete(&rec).await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn put_twice_is_idempotent() {
        let (store, repo) = repo();
        let rec = record("olt-1", "u-1");
        repo.put_by_name(&rec).await.unwrap();
        repo.put_by_name(&rec).await.unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(repo.get_by_name("olt-1").await.unwrap(), rec);
    }

    #[tokio::test]
    async fn get_all_skips_undecodable_rows() {
        let (store, repo) = repo();
        repo.put_by_name(&record("olt-1", "u-1")).await.unwrap();
        store
            .put(&keys::device_name_key("broken"), "not json".into())
            .await
            .unwrap();

        let all = repo.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "olt-1");
    }

    #[tokio::test]
    async fn empty_identifiers_are_rejected() {
        let (_, repo) = repo();
        assert!(matches!(
            repo.get_by_name("").await,
            Err(StoreError::MissingField("name"))
        ));
        assert!(matches!(
            repo.get_by_uuid("").await,
            Err(StoreError::MissingField("uuid"))
        ));
        assert!(matches!(
            repo.put_by_name(&DeviceRecord::default()).await,
            Err(StoreError::MissingField("name"))
        ));
        assert!(matches!(
            repo.put_uuid_lookup(&record("olt-1", "")).await,
            Err(StoreError::MissingField("uuid"))
        ));
    }
}
