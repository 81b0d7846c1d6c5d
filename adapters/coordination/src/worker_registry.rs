//! `WorkerRegistry` over `CoordinationStore` hashes: one `workers:<id>`
//! hash per worker, reaped by heartbeat age (§4.2).

use async_trait::async_trait;
use chrono::Utc;
use pipeline_core::errors::CoordinationError;
use pipeline_core::traits::{CoordinationStore, WorkerRegistry};
use pipeline_core::types::WorkerInfo;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const WORKERS_SET_KEY: &str = "workers:active";

pub struct CoordinatedWorkerRegistry {
    store: Arc<dyn CoordinationStore>,
}

impl CoordinatedWorkerRegistry {
    pub fn new(store: Arc<dyn CoordinationStore>) -> Self {
        Self { store }
    }

    fn worker_key(id: &str) -> String {
        format!("workers:{id}")
    }
}

#[async_trait]
impl WorkerRegistry for CoordinatedWorkerRegistry {
    async fn register(&self, capabilities: serde_json::Value) -> Result<String, CoordinationError> {
        let id = Uuid::new_v4().to_string();
        let info = WorkerInfo { id: id.clone(), capabilities, last_heartbeat: Utc::now() };
        let value = serde_json::to_value(&info).map_err(|e| CoordinationError::OperationFailed(e.to_string()))?;
        self.store.hash_set(&Self::worker_key(&id), "data", value).await?;
        self.store.set_add(WORKERS_SET_KEY, &id).await?;
        Ok(id)
    }

    async fn heartbeat(&self, worker_id: &str) -> Result<(), CoordinationError> {
        let Some(raw) = self.store.hash_get(&Self::worker_key(worker_id), "data").await? else {
            return Err(CoordinationError::OperationFailed(format!("unknown worker {worker_id}")));
        };
        let mut info: WorkerInfo = serde_json::from_value(raw).map_err(|e| CoordinationError::OperationFailed(e.to_string()))?;
        info.last_heartbeat = Utc::now();
        let value = serde_json::to_value(&info).map_err(|e| CoordinationError::OperationFailed(e.to_string()))?;
        self.store.hash_set(&Self::worker_key(worker_id), "data", value).await
    }

    async fn list_active(&self) -> Result<Vec<WorkerInfo>, CoordinationError> {
        let mut workers = Vec::new();
        for id in self.store.set_members(WORKERS_SET_KEY).await? {
            if let Some(raw) = self.store.hash_get(&Self::worker_key(&id), "data").await? {
                if let Ok(info) = serde_json::from_value::<WorkerInfo>(raw) {
                    workers.push(info);
                }
            }
        }
        Ok(workers)
    }

    async fn reap_stale(&self, threshold: Duration) -> Result<Vec<String>, CoordinationError> {
        let mut reaped = Vec::new();
        for info in self.list_active().await? {
            let age = Utc::now().signed_duration_since(info.last_heartbeat);
            if age.to_std().unwrap_or_default() >= threshold {
                self.store.set_remove(WORKERS_SET_KEY, &info.id).await?;
                reaped.push(info.id);
            }
        }
        Ok(reaped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryCoordinationStore;

    #[tokio::test]
    async fn register_then_list_active_round_trips() {
        let registry = CoordinatedWorkerRegistry::new(Arc::new(InMemoryCoordinationStore::new()));
        let id = registry.register(serde_json::json!({"gpu_count": 1})).await.unwrap();
        let active = registry.list_active().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, id);
    }

    #[tokio::test]
    async fn reap_stale_removes_workers_past_threshold() {
        let store = Arc::new(InMemoryCoordinationStore::new());
        let registry = CoordinatedWorkerRegistry::new(store.clone());
        let id = registry.register(serde_json::json!({})).await.unwrap();

        // Force a stale heartbeat by writing it directly, bypassing `heartbeat()`.
        let mut info: WorkerInfo =
            serde_json::from_value(store.hash_get(&format!("workers:{id}"), "data").await.unwrap().unwrap()).unwrap();
        info.last_heartbeat = Utc::now() - chrono::Duration::seconds(600);
        store
            .hash_set(&format!("workers:{id}"), "data", serde_json::to_value(&info).unwrap())
            .await
            .unwrap();

        let reaped = registry.reap_stale(Duration::from_secs(300)).await.unwrap();
        assert_eq!(reaped, vec![id]);
        assert!(registry.list_active().await.unwrap().is_empty());
    }
}
