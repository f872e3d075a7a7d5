//! Repository for `HwCompRecord` rows, scoped by device uuid.

use std::collections::HashMap;
use std::sync::Arc;

use opendm_core::wire::Component;
use opendm_core::HwCompRecord;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::keys;
use crate::kv::{KvStore, StoreError};

/// Owns `HwCompRecord` persistence: one row per component under its device,
/// a per-device name→uuid index blob, and a two-level cache
/// `devUuid → (compUuid → record)`.
pub struct ComponentRepository {
    kv: Arc<dyn KvStore>,
    cache: RwLock<HashMap<String, HashMap<String, HwCompRecord>>>,
}

impl ComponentRepository {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            kv,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Persist one component row and refresh its cache slot.
    pub async fn put_by_uuid(
        &self,
        dev_uuid: &str,
        rec: &HwCompRecord,
    ) -> Result<(), StoreError> {
        if dev_uuid.is_empty() || rec.uuid.is_empty() {
            return Err(StoreError::MissingField("uuid"));
        }
        let entry = serde_json::to_string(rec)?;
        self.kv
            .put(&keys::component_uuid_key(dev_uuid, &rec.uuid), entry)
            .await?;
        self.cache
            .write()
            .entry(dev_uuid.to_string())
            .or_default()
            .insert(rec.uuid.clone(), rec.clone());
        Ok(())
    }

    /// Persist the per-device name→uuid index as a single blob.
    pub async fn put_name_index(
        &self,
        dev_uuid: &str,
        names: &HashMap<String, String>,
    ) -> Result<(), StoreError> {
        if dev_uuid.is_empty() || names.is_empty() {
            return Err(StoreError::MissingField("uuid"));
        }
        let entry = serde_json::to_string(names)?;
        self.kv
            .put(&keys::component_name_index_key(dev_uuid), entry)
            .await?;
        debug!(device_uuid = %dev_uuid, entries = names.len(), "stored component name index");
        Ok(())
    }

    /// Read the per-device name→uuid index.
    pub async fn name_index(&self, dev_uuid: &str) -> Result<HashMap<String, String>, StoreError> {
        if dev_uuid.is_empty() {
            return Err(StoreError::MissingField("uuid"));
        }
        let entry = self.kv.get(&keys::component_name_index_key(dev_uuid)).await?;
        Ok(serde_json::from_str(&entry)?)
    }

    /// Look up one component by uuid, cache first.
    pub async fn get_by_uuid(
        &self,
        dev_uuid: &str,
        comp_uuid: &str,
    ) -> Result<HwCompRecord, StoreError> {
        if dev_uuid.is_empty() || comp_uuid.is_empty() {
            return Err(StoreError::MissingField("uuid"));
        }
        if let Some(rec) = self
            .cache
            .read()
            .get(dev_uuid)
            .and_then(|bucket| bucket.get(comp_uuid))
        {
            return Ok(rec.clone());
        }

        let entry = self
            .kv
            .get(&keys::component_uuid_key(dev_uuid, comp_uuid))
            .await?;
        let rec: HwCompRecord = serde_json::from_str(&entry)?;
        self.cache
            .write()
            .entry(dev_uuid.to_string())
            .or_default()
            .insert(comp_uuid.to_string(), rec.clone());
        Ok(rec)
    }

    /// Look up one component by name via the per-device index.
    pub async fn get_by_name(
        &self,
        dev_uuid: &str,
        name: &str,
    ) -> Result<HwCompRecord, StoreError> {
        if dev_uuid.is_empty() || name.is_empty() {
            return Err(StoreError::MissingField("name"));
        }
        let names = self.name_index(dev_uuid).await?;
        match names.get(name) {
            Some(comp_uuid) => self.get_by_uuid(dev_uuid, comp_uuid).await,
            None => Err(StoreError::NotFound),
        }
    }

    /// Remove every component row of a device and evict its cache bucket.
    pub async fn delete_all(&self, dev_uuid: &str) -> Result<(), StoreError> {
        if dev_uuid.is_empty() {
            return Err(StoreError::MissingField("uuid"));
        }
        self.kv
            .delete_prefix(&keys::component_prefix(dev_uuid))
            .await?;
        self.cache.write().remove(dev_uuid);
        debug!(device_uuid = %dev_uuid, "deleted all component rows");
        Ok(())
    }

    /// Walk an inventory subtree depth-first, materializing one record per
    /// node and accumulating `(name → uuid)` into `names`. Revisiting a uuid
    /// overwrites; the inventory is trusted to be a tree. The caller persists
    /// the accumulated index via [`Self::put_name_index`] afterwards.
    pub async fn ingest_inventory_tree(
        &self,
        dev_uuid: &str,
        children: &[Component],
        names: &mut HashMap<String, String>,
    ) -> Result<(), StoreError> {
        let mut stack: Vec<&Component> = children.iter().rev().collect();
        while let Some(node) = stack.pop() {
            if node.name.is_empty() || node.uuid.is_empty() {
                warn!(device_uuid = %dev_uuid, "skipping inventory node without name or uuid");
                continue;
            }
            let rec = HwCompRecord::from_component(node);
            self.put_by_uuid(dev_uuid, &rec).await?;
            names.insert(rec.name.clone(), rec.uuid.clone());
            stack.extend(node.children.iter().rev());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::MemStore;

    fn repo() -> (Arc<MemStore>, ComponentRepository) {
        let store = Arc::new(MemStore::new());
        let repo = ComponentRepository::new(store.clone());
        (store, repo)
    }

    fn tree() -> Vec<Component> {
        vec![
            Component {
                name: "slot-1".into(),
                uuid: "c-1".into(),
                children: vec![Component {
                    name: "port-1".into(),
                    uuid: "c-11".into(),
                    ..Default::default()
                }],
                ..Default::default()
            },
            Component {
                name: "slot-2".into(),
                uuid: "c-2".into(),
                ..Default::default()
            },
        ]
    }

    #[tokio::test]
    async fn ingestion_persists_every_reachable_component() {
        let (_, repo) = repo();
        let mut names = HashMap::new();
        repo.ingest_inventory_tree("u-1", &tree(), &mut names)
            .await
            .unwrap();
        repo.put_name_index("u-1", &names).await.unwrap();

        for (name, uuid) in [("slot-1", "c-1"), ("slot-2", "c-2"), ("port-1", "c-11")] {
            let by_uuid = repo.get_by_uuid("u-1", uuid).await.unwrap();
            let by_name = repo.get_by_name("u-1", name).await.unwrap();
            assert_eq!(by_uuid, by_name);
            assert_eq!(names.get(name).unwrap(), uuid);
        }
    }

    #[tokio::test]
    async fn get_by_name_reports_missing_names() {
        let (_, repo) = repo();
        let mut names = HashMap::new();
        repo.ingest_inventory_tree("u-1", &tree(), &mut names)
            .await
            .unwrap();
        repo.put_name_index("u-1", &names).await.unwrap();

        assert!(matches!(
            repo.get_by_name("u-1", "slot-9").await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn delete_all_leaves_no_rows_under_the_device() {
        let (store, repo) = repo();
        let mut names = HashMap::new();
        repo.ingest_inventory_tree("u-1", &tree(), &mut names)
            .await
            .unwrap();
        repo.put_name_index("u-1", &names).await.unwrap();
        assert_eq!(store.len(), 4);

        repo.delete_all("u-1").await.unwrap();
        assert!(store.is_empty());
        assert!(matches!(
            repo.get_by_uuid("u-1", "c-1").await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn cache_miss_falls_back_to_kv() {
        let (store, repo) = repo();
        let rec = HwCompRecord {
            name: "psu".into(),
            uuid: "c-9".into(),
            ..Default::default()
        };
        repo.put_by_uuid("u-1", &rec).await.unwrap();

        // A second repository over the same store has a cold cache.
        let other = ComponentRepository::new(store);
        assert_eq!(other.get_by_uuid("u-1", "c-9").await.unwrap(), rec);
    }

    #[tokio::test]
    async fn nodes_without_identity_are_skipped() {
        let (_, repo) = repo();
        let mut names = HashMap::new();
        let nodes = vec![Component {
            name: String::new(),
            uuid: "c-1".into(),
            ..Default::default()
        }];
        repo.ingest_inventory_tree("u-1", &nodes, &mut names)
            .await
            .unwrap();
        assert!(names.is_empty());
    }
}
