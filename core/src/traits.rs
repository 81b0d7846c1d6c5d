//! Trait seams between the pipeline core and its adapters: the object store,
//! the coordination store, the graph store, the LLM client, and the vector
//! index. Each is implemented once in-memory (for tests and small
//! deployments) and, where the pack's dependency stack offers a real backend,
//! once against it.

use crate::errors::{CoordinationError, GraphError, LlmError, ObjectStoreError};
use crate::types::{GraphEdge, GraphNode, Job, StorageNodeInfo, WorkerInfo};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Content-addressed object store: `put`/`get`/`pin`/`unpin` plus a mutable
/// name record facility (§2, OSA).
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, bytes: &[u8]) -> Result<String, ObjectStoreError>;
    async fn get(&self, cid: &str) -> Result<Vec<u8>, ObjectStoreError>;
    async fn pin(&self, cid: &str, metadata: serde_json::Value) -> Result<(), ObjectStoreError>;
    async fn unpin(&self, cid: &str) -> Result<(), ObjectStoreError>;
    async fn publish_name(&self, key: &str, cid: &str) -> Result<(), ObjectStoreError>;
    async fn resolve_name(&self, key: &str) -> Result<String, ObjectStoreError>;
}

/// Typed wrapper over a remote key/value store's list/hash/set/stream
/// primitives (§2, CA). `StreamEntry` models one message read from a
/// consumer group.
#[derive(Debug, Clone)]
pub struct StreamEntry {
    pub id: String,
    pub payload: serde_json::Value,
}

#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Blocking push onto a list.
    async fn list_push(&self, key: &str, value: serde_json::Value) -> Result<(), CoordinationError>;
    /// Blocking pop with a timeout; `None` on timeout.
    async fn list_pop(&self, key: &str, timeout: Duration) -> Result<Option<serde_json::Value>, CoordinationError>;

    async fn hash_set(&self, key: &str, field: &str, value: serde_json::Value) -> Result<(), CoordinationError>;
    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<serde_json::Value>, CoordinationError>;
    async fn hash_delete(&self, key: &str, field: &str) -> Result<(), CoordinationError>;
    async fn hash_get_all(&self, key: &str) -> Result<Vec<(String, serde_json::Value)>, CoordinationError>;

    async fn set_add(&self, key: &str, member: &str) -> Result<(), CoordinationError>;
    async fn set_remove(&self, key: &str, member: &str) -> Result<(), CoordinationError>;
    async fn set_members(&self, key: &str) -> Result<Vec<String>, CoordinationError>;

    async fn stream_append(&self, key: &str, payload: serde_json::Value) -> Result<String, CoordinationError>;
    async fn stream_read_group(
        &self,
        key: &str,
        group: &str,
        consumer: &str,
        max: usize,
        block: Duration,
    ) -> Result<Vec<StreamEntry>, CoordinationError>;
    async fn stream_ack(&self, key: &str, group: &str, id: &str) -> Result<(), CoordinationError>;

    async fn incr(&self, key: &str, by: i64) -> Result<i64, CoordinationError>;
}

/// Durable job queue, layered atop a `CoordinationStore` (§4.2).
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, doc_ref: &str, meta: serde_json::Value) -> Result<Uuid, CoordinationError>;
    async fn dequeue_batch(&self, n: usize, timeout: Duration) -> Result<Vec<Job>, CoordinationError>;
    async fn complete(&self, job_id: Uuid, result: serde_json::Value) -> Result<(), CoordinationError>;
    async fn fail(&self, job_id: Uuid, err: &str) -> Result<(), CoordinationError>;
    async fn requeue(&self, job_id: Uuid) -> Result<(), CoordinationError>;
    async fn retry_stale_claims(&self, older_than: Duration) -> Result<Vec<Uuid>, CoordinationError>;
}

/// Worker liveness registry (§4.2).
#[async_trait]
pub trait WorkerRegistry: Send + Sync {
    async fn register(&self, capabilities: serde_json::Value) -> Result<String, CoordinationError>;
    async fn heartbeat(&self, worker_id: &str) -> Result<(), CoordinationError>;
    async fn list_active(&self) -> Result<Vec<WorkerInfo>, CoordinationError>;
    async fn reap_stale(&self, threshold: Duration) -> Result<Vec<String>, CoordinationError>;
}

/// Storage-node capacity registry used by the object pool's peer selection
/// (§4.1: largest-free-space first, ties broken by lexicographic node id).
#[async_trait]
pub trait StorageNodeRegistry: Send + Sync {
    async fn register(&self, node: StorageNodeInfo) -> Result<(), CoordinationError>;
    async fn update_usage(&self, node_id: &str, used_bytes: u64) -> Result<(), CoordinationError>;
    async fn list(&self) -> Result<Vec<StorageNodeInfo>, CoordinationError>;

    /// Select up to `count` peers able to hold `need_bytes`, largest
    /// free-space first, lexicographic node id as the tiebreak.
    async fn pick_nodes(&self, need_bytes: u64, count: usize) -> Result<Vec<StorageNodeInfo>, CoordinationError> {
        let mut candidates: Vec<StorageNodeInfo> =
            self.list().await?.into_iter().filter(|n| n.free_bytes() >= need_bytes).collect();
        candidates.sort_by(|a, b| b.free_bytes().cmp(&a.free_bytes()).then_with(|| a.id.cmp(&b.id)));
        candidates.truncate(count);
        Ok(candidates)
    }
}

/// In-memory directed multigraph with a closed node/edge vocabulary (§4.6).
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Idempotent insert keyed by `(node_type, label)`, returning the node id.
    async fn upsert_node(&self, node: GraphNode) -> Result<String, GraphError>;
    /// Idempotent insert keyed by `(source, target, edge_type)`; returns
    /// `false` when the edge already existed (no mutation occurred).
    async fn upsert_edge(&self, edge: GraphEdge) -> Result<bool, GraphError>;
    async fn get_node(&self, id: &str) -> Result<Option<GraphNode>, GraphError>;
    async fn find_node_by_label(&self, node_type_label: &str, label: &str) -> Result<Option<GraphNode>, GraphError>;
    async fn nodes(&self) -> Result<Vec<GraphNode>, GraphError>;
    async fn edges(&self) -> Result<Vec<GraphEdge>, GraphError>;
    async fn edges_from(&self, node_id: &str) -> Result<Vec<GraphEdge>, GraphError>;
    async fn edges_to(&self, node_id: &str) -> Result<Vec<GraphEdge>, GraphError>;
    /// Serialise the current graph to the snapshot JSON shape (§6).
    async fn snapshot_json(&self) -> Result<serde_json::Value, GraphError>;
}

/// Single interface over either LLM back-end described in §4.4.
#[async_trait]
pub trait LlmConnector: Send + Sync {
    async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String, LlmError>;

    /// Chat-style helper; the default rendering wraps `generate` with the
    /// `<System>...</System><User>...</User><Assistant>` framing specified
    /// for local-only back-ends. Remote chat-completions back-ends override
    /// this to use their native message array instead.
    async fn complete_chat(&self, messages: &[ChatMessage], max_tokens: u32) -> Result<String, LlmError> {
        let mut prompt = String::new();
        for message in messages {
            match message.role {
                ChatRole::System => prompt.push_str(&format!("<System>{}</System>", message.content)),
                ChatRole::User => prompt.push_str(&format!("<User>{}</User>", message.content)),
                ChatRole::Assistant => prompt.push_str(&format!("<Assistant>{}</Assistant>", message.content)),
            }
        }
        prompt.push_str("<Assistant>");
        self.generate(&prompt, max_tokens).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }
}

/// Vector index adapter: `upsert`/`search` (§2).
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert(&self, id: &str, vector: Vec<f32>, payload: serde_json::Value) -> Result<(), GraphError>;
    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<String>, GraphError>;
}

/// One source's telemetry fetch contract (§4.8, §9: the inheritance
/// hierarchy collapses to this interface plus the shared `process_reading`
/// helper defined in the `telemetry` crate).
#[derive(Debug, Clone)]
pub struct RawReading {
    pub stream_id: String,
    pub value: f64,
    pub unit: String,
    pub lat: f64,
    pub lng: f64,
    pub timestamp: DateTime<Utc>,
    pub locality: Option<String>,
    pub source_url: Option<String>,
}

#[async_trait]
pub trait TelemetryIngestor: Send + Sync {
    fn name(&self) -> &'static str;
    fn metric_type(&self) -> &'static str;
    fn unit(&self) -> &'static str;
    fn license(&self) -> &'static str;
    async fn fetch_data(&self) -> Result<Vec<RawReading>, crate::errors::TelemetryError>;
}
