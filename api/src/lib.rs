//! Read-only HTTP API (§4.10): graph queries, natural-language search,
//! telemetry series, and git-like project lineage, served over the latest
//! published graph snapshot. Never mutates the graph -- all writes go
//! through the Graph Writer Service.

use axum::{
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use pipeline_core::prelude::*;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

mod handlers;
mod middleware;
mod models;

pub use models::*;

/// Read API server configuration.
#[derive(Debug, Clone)]
pub struct ReadApiConfig {
    pub bind_address: SocketAddr,
    pub enable_cors: bool,
}

impl Default for ReadApiConfig {
    fn default() -> Self {
        Self { bind_address: "0.0.0.0:3000".parse().unwrap(), enable_cors: true }
    }
}

/// Application state shared across handlers: read access to the three
/// adapters the rest of the pipeline writes through.
#[derive(Clone)]
pub struct AppState {
    pub graph: Arc<dyn GraphStore>,
    pub coordination: Arc<dyn CoordinationStore>,
    pub object_store: Arc<dyn ObjectStore>,
    pub config: ReadApiConfig,
}

/// Standard API response wrapper.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self { success: true, data: Some(data), error: None, timestamp: chrono::Utc::now().to_rfc3339() }
    }

    pub fn error(message: impl Into<String>) -> ApiResponse<()> {
        ApiResponse { success: false, data: None, error: Some(message.into()), timestamp: chrono::Utc::now().to_rfc3339() }
    }
}

/// Converts a `GraphError` into an HTTP status/response pair.
pub fn handle_graph_error(error: GraphError) -> (StatusCode, Json<ApiResponse<()>>) {
    let (status, message) = match error {
        GraphError::NodeNotFound(msg) => (StatusCode::NOT_FOUND, format!("node not found: {msg}")),
        GraphError::EdgeNotFound(msg) => (StatusCode::NOT_FOUND, format!("edge not found: {msg}")),
        GraphError::ConstraintViolation(msg) => (StatusCode::BAD_REQUEST, format!("constraint violation: {msg}")),
        GraphError::PublicationFailed(msg) => (StatusCode::INTERNAL_SERVER_ERROR, format!("publication failed: {msg}")),
        GraphError::Io(e) => (StatusCode::INTERNAL_SERVER_ERROR, format!("io error: {e}")),
        GraphError::Serialization(e) => (StatusCode::INTERNAL_SERVER_ERROR, format!("serialization error: {e}")),
    };
    tracing::error!("API error: {} - {}", status, message);
    (status, Json(ApiResponse::error(message)))
}

/// The read API presentation adapter.
pub struct ReadApi {
    config: ReadApiConfig,
}

impl ReadApi {
    pub fn new(config: ReadApiConfig) -> Self {
        Self { config }
    }

    fn build_router(&self, state: AppState) -> Router {
        let mut router = Router::new()
            .route("/health", get(handlers::health::health_check))
            .route("/projects", get(handlers::projects::list_projects))
            .route("/projects/:id", get(handlers::projects::get_project))
            .route("/projects/:id/documents", get(handlers::projects::project_documents))
            .route("/projects/:id/git-history", get(handlers::projects::git_history))
            .route("/documents/:id/related", get(handlers::projects::related_to_document))
            .route("/projects/by-locality/:name", get(handlers::projects::projects_by_locality))
            .route("/graph/subgraph/:node_id", get(handlers::graph::subgraph))
            .route("/graph/map-data", get(handlers::graph::map_data))
            .route("/localities", get(handlers::graph::localities))
            .route("/search", get(handlers::search::substring_search))
            .route("/api/search", post(handlers::search::structured_search))
            .route("/api/search/multi", post(handlers::search::multi_search))
            .route("/api/search/suggest", get(handlers::search::suggest))
            .route("/api/telemetry/streams", get(handlers::telemetry::list_streams))
            .route("/api/telemetry/map-data", get(handlers::telemetry::map_data))
            .route("/api/telemetry/:stream_id", get(handlers::telemetry::stream_series))
            .with_state(state);

        let service_builder = ServiceBuilder::new().layer(TraceLayer::new_for_http());

        if self.config.enable_cors {
            router = router.layer(CorsLayer::permissive());
        }

        router.layer(service_builder)
    }

    /// Serves the API until the listener is dropped or the process is killed.
    pub async fn serve(&self, state: AppState) -> Result<(), PresentationError> {
        info!("Starting read API server on {}", self.config.bind_address);
        let router = self.build_router(state);

        let listener = tokio::net::TcpListener::bind(&self.config.bind_address)
            .await
            .map_err(|e| PresentationError::StartupFailed(format!("failed to bind to {}: {e}", self.config.bind_address)))?;

        info!("read API listening on {}", self.config.bind_address);
        axum::serve(listener, router).await.map_err(|e| PresentationError::StartupFailed(format!("server error: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = ReadApiConfig::default();
        assert_eq!(config.bind_address.port(), 3000);
        assert!(config.enable_cors);
    }

    #[test]
    fn test_api_response_success() {
        let response = ApiResponse::success("test data");
        assert!(response.success);
        assert_eq!(response.data, Some("test data"));
        assert!(response.error.is_none());
    }

    #[test]
    fn test_api_response_error() {
        let response = ApiResponse::<()>::error("test error");
        assert!(!response.success);
        assert!(response.data.is_none());
        assert_eq!(response.error, Some("test error".to_string()));
    }
}
