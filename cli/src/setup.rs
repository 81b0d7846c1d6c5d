//! Shared adapter wiring (§6): every mode starts from the same object
//! store, coordination store, and graph snapshot; only which services run
//! on top differs.

use crate::config::{LlmType, Settings};
use pipeline_adapter_coordination::{CoordinatedStorageNodeRegistry, InMemoryCoordinationStore, RedisCoordinationStore};
use pipeline_adapter_graph_memory::InMemoryGraphStore;
use pipeline_adapter_object_store::LocalObjectStore;
use pipeline_connector_llm_local::{LocalLlmConfig, LocalLlmConnector};
use pipeline_connector_llm_openai::{OpenAiConfig, OpenAiConnector};
use pipeline_core::errors::{CoreError, ObjectStoreError};
use pipeline_core::prelude::*;
use std::sync::Arc;
use tracing::{info, warn};

pub async fn build_object_store(settings: &Settings) -> Result<Arc<LocalObjectStore>, CoreError> {
    Ok(Arc::new(LocalObjectStore::new(&settings.storage_path).await.map_err(CoreError::ObjectStore)?))
}

pub async fn build_coordination(settings: &Settings) -> Result<Arc<dyn CoordinationStore>, CoreError> {
    match &settings.redis_url {
        Some(url) => {
            info!(redis_url = %url, "connecting to redis coordination store");
            let store = RedisCoordinationStore::connect(url).await.map_err(CoreError::Coordination)?;
            Ok(Arc::new(store))
        }
        None => {
            warn!("no REDIS_URL configured, using an in-process coordination store");
            Ok(Arc::new(InMemoryCoordinationStore::new()))
        }
    }
}

/// Advertises this process's local storage capacity to the shared
/// `StorageNodeRegistry` so `ObjectPool` peers elsewhere can pick it for
/// replication (§4.1). Failure to register is logged, not fatal -- a node
/// that can't announce itself can still serve its own local writes.
pub async fn register_storage_node(coordination: Arc<dyn CoordinationStore>, node_id: &str, settings: &Settings) {
    let registry = CoordinatedStorageNodeRegistry::new(coordination);
    let capacity_bytes = (settings.storage_capacity_gb * 1024.0 * 1024.0 * 1024.0) as u64;
    let node = StorageNodeInfo {
        id: node_id.to_string(),
        mount_path: settings.storage_path.display().to_string(),
        capacity_bytes,
        used_bytes: 0,
        last_updated: Utc::now(),
        endpoint: node_id.to_string(),
    };
    if let Err(e) = registry.register(node).await {
        warn!(error = %e, "failed to register storage node");
    }
}

/// Restores the graph from the last published snapshot, if the name record
/// resolves to one; an unresolved name (nothing published yet) starts from
/// an empty graph rather than failing the mode.
pub async fn build_graph(settings: &Settings, object_store: &Arc<LocalObjectStore>) -> Result<Arc<InMemoryGraphStore>, CoreError> {
    let graph = InMemoryGraphStore::new();

    let cid = match object_store.resolve_name(&settings.graph_ipns_key).await {
        Ok(cid) => cid,
        Err(ObjectStoreError::NameNotFound(_)) => {
            info!(key = %settings.graph_ipns_key, "no published graph snapshot yet, starting empty");
            return Ok(Arc::new(graph));
        }
        Err(e) => return Err(CoreError::ObjectStore(e)),
    };

    let bytes = object_store.get(&cid).await.map_err(CoreError::ObjectStore)?;
    let snapshot: serde_json::Value = serde_json::from_slice(&bytes).map_err(CoreError::Serialization)?;
    restore_snapshot(&graph, &snapshot).await?;
    Ok(Arc::new(graph))
}

async fn restore_snapshot(graph: &InMemoryGraphStore, snapshot: &serde_json::Value) -> Result<(), CoreError> {
    let nodes: Vec<GraphNode> = snapshot.get("nodes").cloned().map(serde_json::from_value).transpose().map_err(CoreError::Serialization)?.unwrap_or_default();
    let edges: Vec<GraphEdge> = snapshot.get("edges").cloned().map(serde_json::from_value).transpose().map_err(CoreError::Serialization)?.unwrap_or_default();

    info!(nodes = nodes.len(), edges = edges.len(), "restored graph from published snapshot");
    for node in nodes {
        graph.upsert_node(node).await.map_err(CoreError::Graph)?;
    }
    for edge in edges {
        graph.upsert_edge(edge).await.map_err(CoreError::Graph)?;
    }
    Ok(())
}

/// Resolves the configured `LLM_TYPE` to a concrete connector. `local` talks
/// to a llama.cpp subprocess; `openai`/`openai_compatible` both go through
/// the chat-completions connector, differing only in `api_base` -- the same
/// seam `--ollama_base` rides to point at an Ollama OpenAI-compatible
/// endpoint (§4.4).
pub fn build_llm_connector(settings: &Settings) -> Result<Arc<dyn LlmConnector>, CoreError> {
    match settings.llm_type {
        LlmType::Local => {
            let mut config = LocalLlmConfig::new(settings.llama_path.clone(), settings.model_path.clone());
            if let Some(threads) = settings.threads {
                config = config.with_threads(threads);
            }
            if let Some(ctx_size) = settings.ctx_size {
                config = config.with_ctx_size(ctx_size);
            }
            Ok(Arc::new(LocalLlmConnector::new(config)))
        }
        LlmType::Openai | LlmType::OpenaiCompatible => {
            let api_key = settings.openai_api_key.clone().ok_or_else(|| {
                CoreError::Configuration("OPENAI_API_KEY is required for LLM_TYPE=openai or openai_compatible".to_string())
            })?;
            let config = OpenAiConfig::new(api_key).with_model(settings.llm_model.clone()).with_api_base(settings.openai_api_base.clone());
            Ok(Arc::new(OpenAiConnector::new(config).map_err(CoreError::Llm)?))
        }
    }
}
