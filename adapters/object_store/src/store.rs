//! A local, sha256-content-addressed implementation of `ObjectStore`.

use async_trait::async_trait;
use pipeline_core::errors::ObjectStoreError;
use pipeline_core::traits::ObjectStore;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tokio::sync::RwLock;

fn cid_for(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    format!("cid_{}", hex::encode(digest))
}

/// Names are small enough, and mutated rarely enough, that an in-process map
/// guarded by a lock is adequate; it is persisted to `names.json` on every
/// publish so a restart does not lose the pointer.
struct NameTable {
    path: PathBuf,
    entries: HashMap<String, String>,
}

impl NameTable {
    async fn load(path: PathBuf) -> Self {
        let entries = match fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
            Err(_) => HashMap::new(),
        };
        Self { path, entries }
    }

    async fn persist(&self) -> Result<(), ObjectStoreError> {
        let bytes = serde_json::to_vec_pretty(&self.entries).map_err(|e| ObjectStoreError::PromotionFailed(e.to_string()))?;
        fs::write(&self.path, bytes).await?;
        Ok(())
    }
}

pub struct LocalObjectStore {
    root: PathBuf,
    names: Arc<RwLock<NameTable>>,
}

impl LocalObjectStore {
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self, ObjectStoreError> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        fs::create_dir_all(root.join("pins")).await?;
        let names = NameTable::load(root.join("names.json")).await;
        Ok(Self { root, names: Arc::new(RwLock::new(names)) })
    }

    fn object_path(&self, cid: &str) -> PathBuf {
        self.root.join(format!("{cid}.bin"))
    }

    fn pin_path(&self, cid: &str) -> PathBuf {
        self.root.join("pins").join(format!("{cid}.json"))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(&self, bytes: &[u8]) -> Result<String, ObjectStoreError> {
        let cid = cid_for(bytes);
        let path = self.object_path(&cid);
        if !fs::try_exists(&path).await.unwrap_or(false) {
            fs::write(&path, bytes).await?;
        }
        Ok(cid)
    }

    async fn get(&self, cid: &str) -> Result<Vec<u8>, ObjectStoreError> {
        fs::read(self.object_path(cid)).await.map_err(|_| ObjectStoreError::NotFound(cid.to_string()))
    }

    async fn pin(&self, cid: &str, metadata: serde_json::Value) -> Result<(), ObjectStoreError> {
        if !fs::try_exists(self.object_path(cid)).await.unwrap_or(false) {
            return Err(ObjectStoreError::NotFound(cid.to_string()));
        }
        let bytes = serde_json::to_vec(&metadata).map_err(|e| ObjectStoreError::PromotionFailed(e.to_string()))?;
        fs::write(self.pin_path(cid), bytes).await?;
        Ok(())
    }

    async fn unpin(&self, cid: &str) -> Result<(), ObjectStoreError> {
        let path = self.pin_path(cid);
        if fs::try_exists(&path).await.unwrap_or(false) {
            fs::remove_file(&path).await?;
        }
        Ok(())
    }

    async fn publish_name(&self, key: &str, cid: &str) -> Result<(), ObjectStoreError> {
        let mut names = self.names.write().await;
        names.entries.insert(key.to_string(), cid.to_string());
        names.persist().await
    }

    async fn resolve_name(&self, key: &str) -> Result<String, ObjectStoreError> {
        let names = self.names.read().await;
        names.entries.get(key).cloned().ok_or_else(|| ObjectStoreError::NameNotFound(key.to_string()))
    }
}
