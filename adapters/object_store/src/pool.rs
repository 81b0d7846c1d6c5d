//! Distributed Object Pool (§4.1): replicates local files to peer storage
//! nodes, promotes them to the content-addressed store asynchronously, and
//! reclaims local replicas once a promotion is durable.

use async_trait::async_trait;
use chrono::Utc;
use pipeline_core::errors::{CoordinationError, ObjectStoreError};
use pipeline_core::traits::{CoordinationStore, ObjectStore, StorageNodeRegistry};
use pipeline_core::types::{Document, PromotionState};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tracing::{info, warn};

const RETRY_QUEUE_KEY: &str = "ipfs_retry_queue";
const MAX_PROMOTION_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileEntry {
    file_id: String,
    size_bytes: u64,
    created_at: chrono::DateTime<Utc>,
    replicas: Vec<String>,
    promotion_state: PromotionState,
    cid: Option<String>,
    metadata: serde_json::Value,
    promotion_attempts: u32,
}

/// A peer capable of accepting a replica or serving a fetch, grounded on the
/// original `_replicate_file`/fetch-by-endpoint behaviour but generalised
/// behind the `StorageNodeRegistry` contract's node endpoints.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn push(&self, endpoint: &str, file_id: &str, bytes: &[u8]) -> Result<(), ObjectStoreError>;
    async fn pull(&self, endpoint: &str, file_id: &str) -> Result<Vec<u8>, ObjectStoreError>;
}

/// A `PeerTransport` that never has any peers -- the default for single-node
/// deployments, where `replicate` is still accepted but never finds a
/// candidate (replication failures are explicitly non-fatal per §4.1).
pub struct NoPeers;

#[async_trait]
impl PeerTransport for NoPeers {
    async fn push(&self, _endpoint: &str, _file_id: &str, _bytes: &[u8]) -> Result<(), ObjectStoreError> {
        Err(ObjectStoreError::ReplicationFailed("no peer transport configured".into()))
    }
    async fn pull(&self, _endpoint: &str, _file_id: &str) -> Result<Vec<u8>, ObjectStoreError> {
        Err(ObjectStoreError::NotFound("no peer transport configured".into()))
    }
}

pub struct StorageInfo {
    pub file_id: String,
    pub replicas: Vec<String>,
    pub promotion_state: PromotionState,
}

pub struct ObjectPool {
    local_node_id: String,
    local_dir: PathBuf,
    replication_factor: usize,
    coordination: Arc<dyn CoordinationStore>,
    nodes: Arc<dyn StorageNodeRegistry>,
    objects: Arc<dyn ObjectStore>,
    peers: Arc<dyn PeerTransport>,
}

impl ObjectPool {
    pub fn new(
        local_node_id: impl Into<String>,
        local_dir: impl Into<PathBuf>,
        replication_factor: usize,
        coordination: Arc<dyn CoordinationStore>,
        nodes: Arc<dyn StorageNodeRegistry>,
        objects: Arc<dyn ObjectStore>,
        peers: Arc<dyn PeerTransport>,
    ) -> Self {
        Self {
            local_node_id: local_node_id.into(),
            local_dir: local_dir.into(),
            replication_factor,
            coordination,
            nodes,
            objects,
            peers,
        }
    }

    fn local_path(&self, file_id: &str) -> PathBuf {
        self.local_dir.join(file_id)
    }

    async fn load_entry(&self, file_id: &str) -> Result<Option<FileEntry>, CoordinationError> {
        let key = format!("files:{file_id}");
        let fields = self.coordination.hash_get_all(&key).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        let object = serde_json::Value::Object(fields.into_iter().map(|(k, v)| (k, v)).collect());
        Ok(serde_json::from_value(object).ok())
    }

    async fn save_entry(&self, entry: &FileEntry) -> Result<(), CoordinationError> {
        let key = format!("files:{}", entry.file_id);
        let value = serde_json::to_value(entry).expect("FileEntry always serialises");
        if let serde_json::Value::Object(fields) = value {
            for (field, v) in fields {
                self.coordination.hash_set(&key, &field, v).await?;
            }
        }
        Ok(())
    }

    /// Copies `source_path` into the pool, replicates it if asked, and
    /// attempts immediate promotion. Idempotent: a second `store` of the
    /// same bytes is a no-op beyond confirming this node's replica entry.
    pub async fn store(
        &self,
        source_path: &Path,
        metadata: serde_json::Value,
        replicate: bool,
    ) -> Result<StorageInfo, ObjectStoreError> {
        let bytes = fs::read(source_path).await?;
        let digest = Sha256::digest(&bytes);
        let file_id = format!("file_{}", hex::encode(digest));

        if let Some(mut entry) = self.load_entry(&file_id).await.map_err(|e| ObjectStoreError::ReplicationFailed(e.to_string()))? {
            if !entry.replicas.contains(&self.local_node_id) {
                entry.replicas.push(self.local_node_id.clone());
                self.save_entry(&entry).await.map_err(|e| ObjectStoreError::ReplicationFailed(e.to_string()))?;
            }
            return Ok(StorageInfo { file_id: entry.file_id, replicas: entry.replicas, promotion_state: entry.promotion_state });
        }

        fs::create_dir_all(&self.local_dir).await?;
        fs::write(self.local_path(&file_id), &bytes).await?;
        self.coordination
            .set_add("files:index", &file_id)
            .await
            .map_err(|e| ObjectStoreError::ReplicationFailed(e.to_string()))?;

        let mut entry = FileEntry {
            file_id: file_id.clone(),
            size_bytes: bytes.len() as u64,
            created_at: Utc::now(),
            replicas: vec![self.local_node_id.clone()],
            promotion_state: PromotionState::Pending,
            cid: None,
            metadata,
            promotion_attempts: 0,
        };

        if replicate && self.replication_factor > 1 {
            self.replicate(&file_id, &bytes, &mut entry).await;
        }

        match self.objects.put(&bytes).await {
            Ok(cid) => {
                let _ = self.objects.pin(&cid, entry.metadata.clone()).await;
                entry.cid = Some(cid);
                entry.promotion_state = PromotionState::Stored;
            }
            Err(err) => {
                warn!(file_id = %file_id, error = %err, "promotion failed, queuing retry");
                self.coordination
                    .list_push(RETRY_QUEUE_KEY, serde_json::json!(file_id))
                    .await
                    .map_err(|e| ObjectStoreError::PromotionFailed(e.to_string()))?;
            }
        }

        self.save_entry(&entry).await.map_err(|e| ObjectStoreError::ReplicationFailed(e.to_string()))?;
        info!(file_id = %file_id, replicas = entry.replicas.len(), "stored file in object pool");
        Ok(StorageInfo { file_id, replicas: entry.replicas, promotion_state: entry.promotion_state })
    }

    async fn replicate(&self, file_id: &str, bytes: &[u8], entry: &mut FileEntry) {
        let need = bytes.len() as u64;
        let candidates = match self.nodes.pick_nodes(need, self.replication_factor - 1).await {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "could not list storage nodes for replication");
                return;
            }
        };
        for node in candidates {
            match self.peers.push(&node.endpoint, file_id, bytes).await {
                Ok(()) => entry.replicas.push(node.id),
                Err(e) => warn!(node = %node.id, error = %e, "replication to peer failed, continuing"),
            }
        }
    }

    /// Returns a local path to the file, fetching from a peer or the OSA if
    /// no local replica exists.
    pub async fn fetch(&self, file_id: &str) -> Result<PathBuf, ObjectStoreError> {
        let local = self.local_path(file_id);
        if fs::try_exists(&local).await.unwrap_or(false) {
            return Ok(local);
        }

        let entry = self
            .load_entry(file_id)
            .await
            .map_err(|e| ObjectStoreError::NotFound(e.to_string()))?
            .ok_or_else(|| ObjectStoreError::NotFound(file_id.to_string()))?;

        for node in self.nodes.list().await.map_err(|e| ObjectStoreError::NotFound(e.to_string()))? {
            if !entry.replicas.contains(&node.id) {
                continue;
            }
            if let Ok(bytes) = self.peers.pull(&node.endpoint, file_id).await {
                fs::create_dir_all(&self.local_dir).await?;
                fs::write(&local, &bytes).await?;
                return Ok(local);
            }
        }

        if let Some(cid) = entry.cid {
            let bytes = self.objects.get(&cid).await?;
            fs::create_dir_all(&self.local_dir).await?;
            fs::write(&local, &bytes).await?;
            return Ok(local);
        }

        Err(ObjectStoreError::NotFound(file_id.to_string()))
    }

    /// Pops up to `limit` ids from the retry queue and attempts promotion
    /// again; failures are re-queued at the tail up to `MAX_PROMOTION_ATTEMPTS`.
    pub async fn retry_promotions(&self, limit: usize) -> Result<usize, ObjectStoreError> {
        let mut promoted = 0;
        for _ in 0..limit {
            let popped = self
                .coordination
                .list_pop(RETRY_QUEUE_KEY, Duration::from_millis(10))
                .await
                .map_err(|e| ObjectStoreError::PromotionFailed(e.to_string()))?;
            let Some(value) = popped else { break };
            let Some(file_id) = value.as_str().map(str::to_string) else { continue };

            let Some(mut entry) = self.load_entry(&file_id).await.map_err(|e| ObjectStoreError::PromotionFailed(e.to_string()))? else {
                continue;
            };
            let local = self.local_path(&file_id);
            let Ok(bytes) = fs::read(&local).await else { continue };

            match self.objects.put(&bytes).await {
                Ok(cid) => {
                    let _ = self.objects.pin(&cid, entry.metadata.clone()).await;
                    entry.cid = Some(cid);
                    entry.promotion_state = PromotionState::Stored;
                    self.save_entry(&entry).await.map_err(|e| ObjectStoreError::PromotionFailed(e.to_string()))?;
                    promoted += 1;
                }
                Err(_) => {
                    entry.promotion_attempts += 1;
                    if entry.promotion_attempts >= MAX_PROMOTION_ATTEMPTS {
                        entry.promotion_state = PromotionState::Failed;
                        self.save_entry(&entry).await.map_err(|e| ObjectStoreError::PromotionFailed(e.to_string()))?;
                    } else {
                        self.save_entry(&entry).await.map_err(|e| ObjectStoreError::PromotionFailed(e.to_string()))?;
                        self.coordination
                            .list_push(RETRY_QUEUE_KEY, serde_json::json!(file_id))
                            .await
                            .map_err(|e| ObjectStoreError::PromotionFailed(e.to_string()))?;
                    }
                }
            }
        }
        Ok(promoted)
    }

    /// Deletes local replicas for files `Stored` and older than
    /// `max_age_days`, provided at least one other replica or a CID remains.
    pub async fn cleanup(&self, max_age_days: i64) -> Result<usize, ObjectStoreError> {
        let mut cleaned = 0;
        let cutoff = Utc::now() - chrono::Duration::days(max_age_days);

        let entries = self.coordination.set_members("files:index").await.unwrap_or_default();
        for file_id in entries {
            let Some(mut entry) = self.load_entry(&file_id).await.map_err(|e| ObjectStoreError::PromotionFailed(e.to_string()))? else {
                continue;
            };
            if entry.promotion_state != PromotionState::Stored || entry.created_at > cutoff {
                continue;
            }
            let other_replica = entry.replicas.iter().any(|r| r != &self.local_node_id);
            if !(other_replica || entry.cid.is_some()) {
                continue;
            }
            let local = self.local_path(&file_id);
            if fs::try_exists(&local).await.unwrap_or(false) {
                fs::remove_file(&local).await?;
            }
            entry.replicas.retain(|r| r != &self.local_node_id);
            self.save_entry(&entry).await.map_err(|e| ObjectStoreError::PromotionFailed(e.to_string()))?;
            cleaned += 1;
        }
        Ok(cleaned)
    }
}

impl From<FileEntry> for Document {
    fn from(entry: FileEntry) -> Self {
        Document {
            id: entry.file_id,
            original_filename: String::new(),
            size_bytes: entry.size_bytes,
            created_at: entry.created_at,
            replicas: entry.replicas,
            promotion_state: entry.promotion_state,
            cid: entry.cid,
            metadata: match entry.metadata {
                serde_json::Value::Object(map) => map.into_iter().collect(),
                _ => Default::default(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LocalObjectStore;
    use pipeline_adapter_coordination::{CoordinatedStorageNodeRegistry, InMemoryCoordinationStore};

    async fn pool(dir: &std::path::Path) -> ObjectPool {
        let coordination = Arc::new(InMemoryCoordinationStore::new());
        let nodes = Arc::new(CoordinatedStorageNodeRegistry::new(coordination.clone()));
        let objects = Arc::new(LocalObjectStore::new(dir.join("objects")).await.unwrap());
        ObjectPool::new("node-1", dir.join("pool"), 1, coordination, nodes, objects, Arc::new(NoPeers))
    }

    #[tokio::test]
    async fn store_is_idempotent_for_identical_content() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("a.txt");
        fs::write(&source, b"same bytes").await.unwrap();
        let pool = pool(dir.path()).await;

        let first = pool.store(&source, serde_json::json!({}), false).await.unwrap();
        let second = pool.store(&source, serde_json::json!({}), false).await.unwrap();

        assert_eq!(first.file_id, second.file_id);
        assert_eq!(second.replicas.len(), 1);
        assert_eq!(second.promotion_state, PromotionState::Stored);
    }

    #[tokio::test]
    async fn store_without_replication_still_promotes() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("b.txt");
        fs::write(&source, b"solo file").await.unwrap();
        let pool = pool(dir.path()).await;

        let info = pool.store(&source, serde_json::json!({"kind": "doc"}), true).await.unwrap();
        assert_eq!(info.promotion_state, PromotionState::Stored);
        assert_eq!(info.replicas, vec!["node-1".to_string()]);
    }

    #[tokio::test]
    async fn fetch_returns_local_replica_without_touching_peers_or_store() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("c.txt");
        fs::write(&source, b"fetch me").await.unwrap();
        let pool = pool(dir.path()).await;
        let info = pool.store(&source, serde_json::json!({}), false).await.unwrap();

        let fetched = pool.fetch(&info.file_id).await.unwrap();
        assert_eq!(fs::read(fetched).await.unwrap(), b"fetch me");
    }
}
