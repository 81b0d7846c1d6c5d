//! `StorageNodeRegistry` over `CoordinationStore` hashes. Peer selection
//! (largest-free-space-first, lexicographic tiebreak) is the default method
//! on the trait itself; this adapter only needs to supply `register`,
//! `update_usage`, and `list`.

use async_trait::async_trait;
use chrono::Utc;
use pipeline_core::errors::CoordinationError;
use pipeline_core::traits::{CoordinationStore, StorageNodeRegistry};
use pipeline_core::types::StorageNodeInfo;
use std::sync::Arc;

const NODES_SET_KEY: &str = "storage_nodes";

pub struct CoordinatedStorageNodeRegistry {
    store: Arc<dyn CoordinationStore>,
}

impl CoordinatedStorageNodeRegistry {
    pub fn new(store: Arc<dyn CoordinationStore>) -> Self {
        Self { store }
    }

    fn node_key(id: &str) -> String {
        format!("storage_node:{id}")
    }
}

#[async_trait]
impl StorageNodeRegistry for CoordinatedStorageNodeRegistry {
    async fn register(&self, node: StorageNodeInfo) -> Result<(), CoordinationError> {
        let value = serde_json::to_value(&node).map_err(|e| CoordinationError::OperationFailed(e.to_string()))?;
        self.store.hash_set(&Self::node_key(&node.id), "data", value).await?;
        self.store.set_add(NODES_SET_KEY, &node.id).await
    }

    async fn update_usage(&self, node_id: &str, used_bytes: u64) -> Result<(), CoordinationError> {
        let Some(raw) = self.store.hash_get(&Self::node_key(node_id), "data").await? else {
            return Err(CoordinationError::OperationFailed(format!("unknown storage node {node_id}")));
        };
        let mut node: StorageNodeInfo = serde_json::from_value(raw).map_err(|e| CoordinationError::OperationFailed(e.to_string()))?;
        node.used_bytes = used_bytes;
        node.last_updated = Utc::now();
        let value = serde_json::to_value(&node).map_err(|e| CoordinationError::OperationFailed(e.to_string()))?;
        self.store.hash_set(&Self::node_key(node_id), "data", value).await
    }

    async fn list(&self) -> Result<Vec<StorageNodeInfo>, CoordinationError> {
        let mut nodes = Vec::new();
        for id in self.store.set_members(NODES_SET_KEY).await? {
            if let Some(raw) = self.store.hash_get(&Self::node_key(&id), "data").await? {
                if let Ok(node) = serde_json::from_value(raw) {
                    nodes.push(node);
                }
            }
        }
        Ok(nodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryCoordinationStore;

    fn node(id: &str, free: u64) -> StorageNodeInfo {
        StorageNodeInfo {
            id: id.to_string(),
            mount_path: "/data".into(),
            capacity_bytes: free,
            used_bytes: 0,
            last_updated: Utc::now(),
            endpoint: format!("http://{id}"),
        }
    }

    #[tokio::test]
    async fn pick_nodes_prefers_largest_free_space_then_lexicographic_id() {
        let store = Arc::new(InMemoryCoordinationStore::new());
        let registry = CoordinatedStorageNodeRegistry::new(store);
        registry.register(node("b", 100)).await.unwrap();
        registry.register(node("a", 100)).await.unwrap();
        registry.register(node("c", 50)).await.unwrap();

        let picked = registry.pick_nodes(10, 2).await.unwrap();
        assert_eq!(picked.len(), 2);
        assert_eq!(picked[0].id, "a");
        assert_eq!(picked[1].id, "b");
    }
}
