//! The Processor Orchestrator (§4.2, §5): per-worker batch dequeue loop over
//! a bounded cooperative pool, cost-budget and idle-timeout shutdown, and
//! scheduled side-tasks for worker heartbeat and stale-claim reaping.
//! Grounded on `run_worker`/`_batch_process_jobs`/`_graceful_shutdown` in
//! `enhanced_document_processor.py`, restructured from a thread pool plus a
//! polling `schedule` library onto `tokio::select!` over timers and the
//! queue's own blocking pop.

use crate::cost::CostTracker;
use pipeline_adapter_coordination::{CoordinatedJobQueue, CoordinatedWorkerRegistry};
use pipeline_core::prelude::*;
use pipeline_extract::Extractor;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Per-job soft timeout (§5).
pub const JOB_TIMEOUT: Duration = Duration::from_secs(3600);
/// Budget-exceeded shutdown grace period (§5).
pub const BUDGET_SHUTDOWN_GRACE: Duration = Duration::from_secs(300);
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const REAP_INTERVAL: Duration = Duration::from_secs(60);
const DEQUEUE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Total compute cost reached `max_budget`. Maps to exit code 2 (§6).
    Budget,
    /// No jobs dequeued for `idle_shutdown`. Maps to exit code 0.
    Idle,
    /// The cancellation token was triggered by the operator. Exit code 0.
    Signal,
}

pub struct OrchestratorConfig {
    pub batch_size: usize,
    pub max_parallel: usize,
    pub idle_shutdown: Duration,
    pub reap_threshold: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self { batch_size: 32, max_parallel: 32, idle_shutdown: Duration::from_secs(10 * 60), reap_threshold: Duration::from_secs(5 * 60) }
    }
}

pub struct Orchestrator {
    job_queue: Arc<dyn JobQueue>,
    worker_registry: Arc<dyn WorkerRegistry>,
    extractor: Arc<Extractor>,
    cost: Arc<CostTracker>,
    config: OrchestratorConfig,
    worker_id: String,
}

impl Orchestrator {
    /// Registers this process as a worker against the shared coordination
    /// store and returns a ready-to-run orchestrator. The job queue is built
    /// against this worker's own id so claims can be attributed and reaped.
    pub async fn register(
        store: Arc<dyn CoordinationStore>,
        extractor: Arc<Extractor>,
        cost: Arc<CostTracker>,
        config: OrchestratorConfig,
        capabilities: serde_json::Value,
    ) -> Result<Self, CoreError> {
        let worker_registry: Arc<dyn WorkerRegistry> = Arc::new(CoordinatedWorkerRegistry::new(store.clone()));
        let worker_id = worker_registry.register(capabilities).await?;
        info!(worker_id, "registered worker");
        let job_queue: Arc<dyn JobQueue> = Arc::new(CoordinatedJobQueue::new(store, worker_id.clone()));
        Ok(Self { job_queue, worker_registry, extractor, cost, config, worker_id })
    }

    fn batch_size(&self) -> usize {
        self.config.batch_size.min(self.config.max_parallel)
    }

    /// Runs the dequeue/process loop until cancelled, the budget is
    /// exceeded, or the worker has been idle past its threshold.
    pub async fn run(&self, cancel: CancellationToken) -> ShutdownReason {
        info!(worker_id = self.worker_id, "starting worker loop");
        let mut last_activity = Instant::now();
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        let mut reap = tokio::time::interval(REAP_INTERVAL);

        loop {
            if self.cost.budget_exceeded() {
                warn!(worker_id = self.worker_id, total_cost = self.cost.total(), "budget exceeded, shutting down");
                return ShutdownReason::Budget;
            }
            if last_activity.elapsed() > self.config.idle_shutdown {
                info!(worker_id = self.worker_id, "idle shutdown threshold reached");
                return ShutdownReason::Idle;
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(worker_id = self.worker_id, "shutdown signal received");
                    return ShutdownReason::Signal;
                }
                _ = heartbeat.tick() => {
                    if let Err(e) = self.worker_registry.heartbeat(&self.worker_id).await {
                        warn!(worker_id = self.worker_id, error = %e, "heartbeat failed");
                    }
                }
                _ = reap.tick() => {
                    self.run_reap_pass().await;
                }
                jobs = self.job_queue.dequeue_batch(self.batch_size(), DEQUEUE_TIMEOUT) => {
                    match jobs {
                        Ok(jobs) if !jobs.is_empty() => {
                            last_activity = Instant::now();
                            self.process_batch(jobs).await;
                            self.cost.accrue();
                        }
                        Ok(_) => {}
                        Err(e) => warn!(worker_id = self.worker_id, error = %e, "dequeue failed"),
                    }
                }
            }
        }
    }

    async fn run_reap_pass(&self) {
        match self.worker_registry.reap_stale(self.config.reap_threshold).await {
            Ok(reaped) if !reaped.is_empty() => warn!(count = reaped.len(), "reaped stale workers"),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "worker reap failed"),
        }
        match self.job_queue.retry_stale_claims(self.config.reap_threshold).await {
            Ok(requeued) if !requeued.is_empty() => warn!(count = requeued.len(), "requeued stale job claims"),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "stale claim retry failed"),
        }
    }

    /// Runs a batch to completion before returning, so a batch already
    /// in flight is never abandoned by a shutdown decided between
    /// `select!` iterations -- this is `_graceful_shutdown`'s in-flight
    /// drain, just implied by never starting a new batch concurrently
    /// with the one the loop is already awaiting.
    async fn process_batch(&self, jobs: Vec<Job>) {
        info!(count = jobs.len(), "processing batch");
        let mut set = tokio::task::JoinSet::new();
        for job in jobs {
            let job_queue = self.job_queue.clone();
            let extractor = self.extractor.clone();
            set.spawn(async move { process_one(job_queue, extractor, job).await });
        }
        while let Some(result) = set.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "job task panicked");
            }
        }
    }
}

async fn process_one(job_queue: Arc<dyn JobQueue>, extractor: Arc<Extractor>, job: Job) {
    let text = match tokio::fs::read_to_string(&job.doc_ref).await {
        Ok(text) => text,
        Err(e) => {
            let _ = job_queue.fail(job.id, &format!("failed to read document: {e}")).await;
            return;
        }
    };

    let outcome = tokio::time::timeout(JOB_TIMEOUT, extractor.process(&job.id.to_string(), &text)).await;
    match outcome {
        Ok(Ok(processed)) => match serde_json::to_value(&processed) {
            Ok(result) => {
                if let Err(e) = job_queue.complete(job.id, result).await {
                    error!(job_id = %job.id, error = %e, "failed to mark job complete");
                }
            }
            Err(e) => {
                let _ = job_queue.fail(job.id, &format!("result serialization failed: {e}")).await;
            }
        },
        Ok(Err(e)) => {
            let _ = job_queue.fail(job.id, &e.to_string()).await;
        }
        Err(_) => {
            let _ = job_queue.fail(job.id, "job exceeded soft timeout").await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pipeline_adapter_coordination::InMemoryCoordinationStore;
    use pipeline_adapter_object_store::LocalObjectStore;
    use pipeline_extract::TemplateStore;

    struct StubLlm;

    #[async_trait]
    impl LlmConnector for StubLlm {
        async fn generate(&self, _prompt: &str, _max_tokens: u32) -> Result<String, LlmError> {
            Ok(r#"{"document_type": "other"}"#.to_string())
        }
    }

    struct StubEmbedder;

    #[async_trait]
    impl pipeline_extract::Embedder for StubEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, LlmError> {
            Ok(vec![0.0])
        }
    }

    struct StubVectorIndex;

    #[async_trait]
    impl VectorIndex for StubVectorIndex {
        async fn upsert(&self, _id: &str, _vector: Vec<f32>, _payload: serde_json::Value) -> Result<(), GraphError> {
            Ok(())
        }
        async fn search(&self, _vector: &[f32], _k: usize) -> Result<Vec<String>, GraphError> {
            Ok(Vec::new())
        }
    }

    async fn make_extractor(dir: &std::path::Path, coordination: Arc<dyn CoordinationStore>) -> Arc<Extractor> {
        let object_store = Arc::new(LocalObjectStore::new(dir.join("objects")).await.unwrap());
        let templates = TemplateStore::new(dir.join("templates"), false);
        Arc::new(Extractor::new(
            Arc::new(StubLlm),
            templates,
            Arc::new(StubVectorIndex),
            Arc::new(StubEmbedder),
            object_store,
            coordination,
            dir,
        ))
    }

    #[tokio::test]
    async fn processes_a_dequeued_job_and_marks_it_complete() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn CoordinationStore> = Arc::new(InMemoryCoordinationStore::new());
        let extractor = make_extractor(dir.path(), store.clone()).await;
        let cost = Arc::new(CostTracker::new(0.0, f64::INFINITY));
        let orchestrator =
            Orchestrator::register(store.clone(), extractor, cost, OrchestratorConfig::default(), serde_json::json!({})).await.unwrap();

        let doc_path = dir.path().join("doc.txt");
        tokio::fs::write(&doc_path, "some arbitrary document text").await.unwrap();
        let job_queue: Arc<dyn JobQueue> = Arc::new(CoordinatedJobQueue::new(store.clone(), "producer"));
        let job_id = job_queue.enqueue(&doc_path.to_string_lossy(), serde_json::json!({})).await.unwrap();

        let jobs = orchestrator.job_queue.dequeue_batch(1, Duration::from_secs(1)).await.unwrap();
        assert_eq!(jobs.len(), 1);
        orchestrator.process_batch(jobs).await;

        let completed = orchestrator.job_queue.dequeue_batch(1, Duration::from_millis(10)).await.unwrap();
        assert!(completed.is_empty(), "job should not be redequeued after completion");
        let _ = job_id;
    }

    #[tokio::test]
    async fn missing_document_file_fails_the_job_rather_than_panicking() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn CoordinationStore> = Arc::new(InMemoryCoordinationStore::new());
        let extractor = make_extractor(dir.path(), store.clone()).await;
        let cost = Arc::new(CostTracker::new(0.0, f64::INFINITY));
        let orchestrator =
            Orchestrator::register(store.clone(), extractor, cost, OrchestratorConfig::default(), serde_json::json!({})).await.unwrap();

        orchestrator.job_queue.enqueue("/nonexistent/path.txt", serde_json::json!({})).await.unwrap();
        let jobs = orchestrator.job_queue.dequeue_batch(1, Duration::from_secs(1)).await.unwrap();
        orchestrator.process_batch(jobs).await;
    }

    #[tokio::test]
    async fn run_returns_idle_when_the_queue_stays_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn CoordinationStore> = Arc::new(InMemoryCoordinationStore::new());
        let extractor = make_extractor(dir.path(), store.clone()).await;
        let cost = Arc::new(CostTracker::new(0.0, f64::INFINITY));
        let mut config = OrchestratorConfig::default();
        config.idle_shutdown = Duration::from_millis(20);
        let orchestrator = Orchestrator::register(store, extractor, cost, config, serde_json::json!({})).await.unwrap();

        let reason = orchestrator.run(CancellationToken::new()).await;
        assert_eq!(reason, ShutdownReason::Idle);
    }

    #[tokio::test]
    async fn run_returns_budget_when_the_tracker_is_already_exhausted() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn CoordinationStore> = Arc::new(InMemoryCoordinationStore::new());
        let extractor = make_extractor(dir.path(), store.clone()).await;
        let cost = Arc::new(CostTracker::new(0.0, 0.0));
        let orchestrator = Orchestrator::register(store, extractor, cost, OrchestratorConfig::default(), serde_json::json!({})).await.unwrap();

        let reason = orchestrator.run(CancellationToken::new()).await;
        assert_eq!(reason, ShutdownReason::Budget);
    }
}
