//! `JobQueue` built entirely out of `CoordinationStore` primitives, so it
//! works unchanged against the in-memory store or a real Redis deployment --
//! mirroring the source system's `enqueue_document`/`dequeue_document` over
//! `lpush`/`brpop`, generalised to batch claims and worker-scoped reaping.

use async_trait::async_trait;
use chrono::Utc;
use pipeline_core::errors::CoordinationError;
use pipeline_core::traits::{CoordinationStore, JobQueue};
use pipeline_core::types::{Job, JobStatus};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const PENDING_KEY: &str = "jobs:pending";
const PROCESSING_SET_KEY: &str = "jobs:processing";
const CLAIMS_HASH_KEY: &str = "jobs:claims";

fn job_key(id: Uuid) -> String {
    format!("job:{id}")
}

pub struct CoordinatedJobQueue {
    store: Arc<dyn CoordinationStore>,
    worker_id: String,
}

impl CoordinatedJobQueue {
    pub fn new(store: Arc<dyn CoordinationStore>, worker_id: impl Into<String>) -> Self {
        Self { store, worker_id: worker_id.into() }
    }

    async fn load_job(&self, id: Uuid) -> Result<Job, CoordinationError> {
        let raw = self
            .store
            .hash_get(&job_key(id), "data")
            .await?
            .ok_or_else(|| CoordinationError::JobNotFound(id.to_string()))?;
        serde_json::from_value(raw).map_err(|e| CoordinationError::OperationFailed(e.to_string()))
    }

    async fn save_job(&self, job: &Job) -> Result<(), CoordinationError> {
        let value = serde_json::to_value(job).map_err(|e| CoordinationError::OperationFailed(e.to_string()))?;
        self.store.hash_set(&job_key(job.id), "data", value).await
    }
}

#[async_trait]
impl JobQueue for CoordinatedJobQueue {
    async fn enqueue(&self, doc_ref: &str, meta: serde_json::Value) -> Result<Uuid, CoordinationError> {
        let mut job = Job::new(doc_ref, "producer");
        job.result = Some(meta);
        self.save_job(&job).await?;
        self.store.list_push(PENDING_KEY, serde_json::json!(job.id.to_string())).await?;
        Ok(job.id)
    }

    async fn dequeue_batch(&self, n: usize, timeout: Duration) -> Result<Vec<Job>, CoordinationError> {
        let mut claimed = Vec::with_capacity(n);
        for _ in 0..n {
            let Some(value) = self.store.list_pop(PENDING_KEY, timeout).await? else { break };
            let Some(id_str) = value.as_str() else { continue };
            let Ok(id) = Uuid::parse_str(id_str) else { continue };

            let mut job = match self.load_job(id).await {
                Ok(job) => job,
                Err(_) => continue,
            };
            job.status = JobStatus::Processing;
            job.claiming_worker = Some(self.worker_id.clone());
            job.started_at = Some(Utc::now());
            job.claim_history.push(self.worker_id.clone());
            self.save_job(&job).await?;

            self.store.set_add(PROCESSING_SET_KEY, &id.to_string()).await?;
            self.store.hash_set(CLAIMS_HASH_KEY, &id.to_string(), serde_json::json!(Utc::now().to_rfc3339())).await?;

            claimed.push(job);
        }
        Ok(claimed)
    }

    async fn complete(&self, job_id: Uuid, result: serde_json::Value) -> Result<(), CoordinationError> {
        let mut job = self.load_job(job_id).await?;
        job.status = JobStatus::Completed;
        job.completed_at = Some(Utc::now());
        job.result = Some(result);
        self.save_job(&job).await?;
        self.store.set_remove(PROCESSING_SET_KEY, &job_id.to_string()).await?;
        self.store.hash_delete(CLAIMS_HASH_KEY, &job_id.to_string()).await?;
        Ok(())
    }

    async fn fail(&self, job_id: Uuid, err: &str) -> Result<(), CoordinationError> {
        let mut job = self.load_job(job_id).await?;
        job.status = JobStatus::Failed;
        job.completed_at = Some(Utc::now());
        job.error = Some(err.to_string());
        self.save_job(&job).await?;
        self.store.set_remove(PROCESSING_SET_KEY, &job_id.to_string()).await?;
        self.store.hash_delete(CLAIMS_HASH_KEY, &job_id.to_string()).await?;
        Ok(())
    }

    async fn requeue(&self, job_id: Uuid) -> Result<(), CoordinationError> {
        let mut job = self.load_job(job_id).await?;
        job.status = JobStatus::Pending;
        job.claiming_worker = None;
        self.save_job(&job).await?;
        self.store.set_remove(PROCESSING_SET_KEY, &job_id.to_string()).await?;
        self.store.hash_delete(CLAIMS_HASH_KEY, &job_id.to_string()).await?;
        self.store.list_push(PENDING_KEY, serde_json::json!(job_id.to_string())).await?;
        Ok(())
    }

    async fn retry_stale_claims(&self, older_than: Duration) -> Result<Vec<Uuid>, CoordinationError> {
        let mut requeued = Vec::new();
        for id_str in self.store.set_members(PROCESSING_SET_KEY).await? {
            let Ok(id) = Uuid::parse_str(&id_str) else { continue };
            let Some(claimed_at) = self.store.hash_get(CLAIMS_HASH_KEY, &id_str).await? else { continue };
            let Some(claimed_at) = claimed_at.as_str().and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok()) else {
                continue;
            };
            let age = Utc::now().signed_duration_since(claimed_at.with_timezone(&Utc));
            if age.to_std().unwrap_or_default() >= older_than {
                self.requeue(id).await?;
                requeued.push(id);
            }
        }
        Ok(requeued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryCoordinationStore;

    fn queue(worker: &str) -> CoordinatedJobQueue {
        CoordinatedJobQueue::new(Arc::new(InMemoryCoordinationStore::new()), worker)
    }

    #[tokio::test]
    async fn enqueue_then_dequeue_claims_to_worker() {
        let q = queue("worker-1");
        let id = q.enqueue("doc://a", serde_json::json!({})).await.unwrap();
        let batch = q.dequeue_batch(5, Duration::from_millis(1)).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].id, id);
        assert_eq!(batch[0].status, JobStatus::Processing);
        assert_eq!(batch[0].claiming_worker.as_deref(), Some("worker-1"));
    }

    #[tokio::test]
    async fn dequeue_batch_respects_n_even_with_more_pending() {
        let q = queue("worker-1");
        for i in 0..5 {
            q.enqueue(&format!("doc://{i}"), serde_json::json!({})).await.unwrap();
        }
        let batch = q.dequeue_batch(2, Duration::from_millis(1)).await.unwrap();
        assert_eq!(batch.len(), 2);
    }

    #[tokio::test]
    async fn complete_removes_job_from_processing_set() {
        let store = Arc::new(InMemoryCoordinationStore::new());
        let q = CoordinatedJobQueue::new(store.clone(), "worker-1");
        let id = q.enqueue("doc://a", serde_json::json!({})).await.unwrap();
        q.dequeue_batch(1, Duration::from_millis(1)).await.unwrap();
        q.complete(id, serde_json::json!({"ok": true})).await.unwrap();
        assert!(store.set_members(PROCESSING_SET_KEY).await.unwrap().is_empty());
    }
}
