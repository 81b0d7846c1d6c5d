//! Health check handler (§4.10, §10.2): reports adapter connectivity rather
//! than just process liveness.

use crate::{ApiResponse, AppState};
use axum::{extract::State, http::StatusCode, response::Json};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum AdapterStatus {
    Ok,
    Unreachable,
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub version: String,
    pub graph_store: AdapterStatus,
    pub coordination_store: AdapterStatus,
    pub object_store: AdapterStatus,
    pub timestamp: String,
}

/// Health check endpoint. A store is reported reachable if it answers a
/// cheap, side-effect-free query at all -- `NotFound`-shaped errors count as
/// reachable, since they mean the round trip to the backend succeeded.
pub async fn health_check(State(state): State<AppState>) -> Result<Json<ApiResponse<HealthStatus>>, (StatusCode, Json<ApiResponse<()>>)> {
    let graph_store = if state.graph.nodes().await.is_ok() { AdapterStatus::Ok } else { AdapterStatus::Unreachable };
    let coordination_store =
        if state.coordination.hash_get_all("pipeline:health").await.is_ok() { AdapterStatus::Ok } else { AdapterStatus::Unreachable };
    let object_store = match state.object_store.resolve_name("pipeline:health").await {
        Ok(_) => AdapterStatus::Ok,
        Err(pipeline_core::ObjectStoreError::NameNotFound(_)) => AdapterStatus::Ok,
        Err(_) => AdapterStatus::Unreachable,
    };

    let all_ok = graph_store == AdapterStatus::Ok && coordination_store == AdapterStatus::Ok && object_store == AdapterStatus::Ok;
    let health = HealthStatus {
        status: if all_ok { "healthy" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION").to_string(),
        graph_store,
        coordination_store,
        object_store,
        timestamp: chrono::Utc::now().to_rfc3339(),
    };

    if all_ok {
        Ok(Json(ApiResponse::success(health)))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(ApiResponse::error("one or more adapters unreachable"))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ReadApiConfig;
    use pipeline_adapter_coordination::InMemoryCoordinationStore;
    use pipeline_adapter_graph_memory::InMemoryGraphStore;
    use pipeline_adapter_object_store::LocalObjectStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn reports_healthy_when_every_adapter_answers() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState {
            graph: Arc::new(InMemoryGraphStore::new()),
            coordination: Arc::new(InMemoryCoordinationStore::new()),
            object_store: Arc::new(LocalObjectStore::new(dir.path()).await.unwrap()),
            config: ReadApiConfig::default(),
        };

        let response = health_check(State(state)).await.unwrap();
        assert_eq!(response.0.data.as_ref().unwrap().status, "healthy");
    }
}
