//! Project-centric read endpoints (§4.10): listing, single-project lookup,
//! the documents anchored to a project, a document's immediate neighbours,
//! locality-filtered project lookup, and git-like lineage history.

use crate::{handle_graph_error, ApiResponse, AppState};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use pipeline_core::prelude::*;
use pipeline_lineage::{build_git_history, extract_branches, Branches, Commit};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct NodeSummary {
    pub id: String,
    pub label: String,
    pub node_type: String,
    pub properties: std::collections::HashMap<String, serde_json::Value>,
    pub coordinates: Option<Coordinates>,
}

impl From<GraphNode> for NodeSummary {
    fn from(node: GraphNode) -> Self {
        Self { id: node.id, label: node.label, node_type: label_of(node.node_type), properties: node.properties, coordinates: node.coordinates }
    }
}

fn label_of(node_type: NodeType) -> String {
    serde_json::to_value(node_type).ok().and_then(|v| v.as_str().map(str::to_string)).unwrap_or_else(|| "unknown".to_string())
}

#[derive(Debug, Serialize)]
pub struct RelatedNode {
    #[serde(flatten)]
    pub node: NodeSummary,
    pub edge_type: EdgeType,
    pub direction: &'static str,
}

type ApiError = (StatusCode, Json<ApiResponse<()>>);

fn not_found(what: &str, id: &str) -> ApiError {
    (StatusCode::NOT_FOUND, Json(ApiResponse::error(format!("{what} not found: {id}"))))
}

pub async fn list_projects(State(state): State<AppState>) -> Result<Json<ApiResponse<Vec<NodeSummary>>>, ApiError> {
    let nodes = state.graph.nodes().await.map_err(handle_graph_error)?;
    let projects = nodes.into_iter().filter(|n| n.node_type == NodeType::Project).map(NodeSummary::from).collect();
    Ok(Json(ApiResponse::success(projects)))
}

pub async fn get_project(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<ApiResponse<NodeSummary>>, ApiError> {
    let node = state.graph.get_node(&id).await.map_err(handle_graph_error)?;
    match node {
        Some(node) if node.node_type == NodeType::Project => Ok(Json(ApiResponse::success(NodeSummary::from(node)))),
        _ => Err(not_found("project", &id)),
    }
}

/// Documents anchored to this project, discovered via the `CONTAINS_DOCUMENT`
/// edges the Graph Writer points from each source document at its anchor
/// node (project, patent, or research paper).
pub async fn project_documents(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Vec<NodeSummary>>>, ApiError> {
    let incoming = state.graph.edges_to(&id).await.map_err(handle_graph_error)?;
    let mut documents = Vec::new();
    for edge in incoming.into_iter().filter(|e| e.edge_type == EdgeType::ContainsDocument) {
        if let Some(node) = state.graph.get_node(&edge.source).await.map_err(handle_graph_error)? {
            documents.push(NodeSummary::from(node));
        }
    }
    Ok(Json(ApiResponse::success(documents)))
}

pub async fn related_to_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Vec<RelatedNode>>>, ApiError> {
    if state.graph.get_node(&id).await.map_err(handle_graph_error)?.is_none() {
        return Err(not_found("document", &id));
    }

    let mut related = Vec::new();
    for edge in state.graph.edges_from(&id).await.map_err(handle_graph_error)? {
        if let Some(node) = state.graph.get_node(&edge.target).await.map_err(handle_graph_error)? {
            related.push(RelatedNode { node: NodeSummary::from(node), edge_type: edge.edge_type, direction: "outgoing" });
        }
    }
    for edge in state.graph.edges_to(&id).await.map_err(handle_graph_error)? {
        if let Some(node) = state.graph.get_node(&edge.source).await.map_err(handle_graph_error)? {
            related.push(RelatedNode { node: NodeSummary::from(node), edge_type: edge.edge_type, direction: "incoming" });
        }
    }
    Ok(Json(ApiResponse::success(related)))
}

pub async fn projects_by_locality(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ApiResponse<Vec<NodeSummary>>>, ApiError> {
    let name_upper = name.to_uppercase();
    let Some(locality) = state.graph.find_node_by_label("locality", &name_upper).await.map_err(handle_graph_error)? else {
        return Ok(Json(ApiResponse::success(Vec::new())));
    };

    let mut projects = Vec::new();
    for edge in state.graph.edges_to(&locality.id).await.map_err(handle_graph_error)? {
        if edge.edge_type != EdgeType::LocatedIn {
            continue;
        }
        if let Some(node) = state.graph.get_node(&edge.source).await.map_err(handle_graph_error)? {
            if node.node_type == NodeType::Project {
                projects.push(NodeSummary::from(node));
            }
        }
    }
    Ok(Json(ApiResponse::success(projects)))
}

#[derive(Debug, Serialize)]
pub struct GitHistoryResponse {
    pub commits: Vec<Commit>,
    pub branches: Branches,
}

pub async fn git_history(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<ApiResponse<GitHistoryResponse>>, ApiError> {
    let commits = build_git_history(state.graph.as_ref(), &id).await.map_err(handle_graph_error)?;
    let branches = extract_branches(&commits);
    Ok(Json(ApiResponse::success(GitHistoryResponse { commits, branches })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ReadApiConfig;
    use pipeline_adapter_coordination::InMemoryCoordinationStore;
    use pipeline_adapter_graph_memory::InMemoryGraphStore;
    use pipeline_adapter_object_store::LocalObjectStore;
    use std::sync::Arc;

    async fn state() -> (AppState, Arc<InMemoryGraphStore>) {
        let dir = tempfile::tempdir().unwrap();
        let graph = Arc::new(InMemoryGraphStore::new());
        let state = AppState {
            graph: graph.clone(),
            coordination: Arc::new(InMemoryCoordinationStore::new()),
            object_store: Arc::new(LocalObjectStore::new(dir.path()).await.unwrap()),
            config: ReadApiConfig::default(),
        };
        (state, graph)
    }

    #[tokio::test]
    async fn lists_only_project_typed_nodes() {
        let (state, graph) = state().await;
        graph.upsert_node(GraphNode::new("project_a", NodeType::Project, "Project A")).await.unwrap();
        graph.upsert_node(GraphNode::new("patent_b", NodeType::Patent, "Patent B")).await.unwrap();

        let response = list_projects(State(state)).await.unwrap();
        let projects = response.0.data.unwrap();
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].id, "project_a");
    }

    #[tokio::test]
    async fn get_project_rejects_a_non_project_node() {
        let (state, graph) = state().await;
        graph.upsert_node(GraphNode::new("patent_b", NodeType::Patent, "Patent B")).await.unwrap();

        let err = get_project(State(state), Path("patent_b".to_string())).await.unwrap_err();
        assert_eq!(err.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn project_documents_follows_contains_document_edges() {
        let (state, graph) = state().await;
        graph.upsert_node(GraphNode::new("project_a", NodeType::Project, "Project A")).await.unwrap();
        graph.upsert_node(GraphNode::new("doc_1", NodeType::Document, "doc_1")).await.unwrap();
        graph.upsert_edge(GraphEdge::new("doc_1", "project_a", EdgeType::ContainsDocument)).await.unwrap();

        let response = project_documents(State(state), Path("project_a".to_string())).await.unwrap();
        let docs = response.0.data.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, "doc_1");
    }

    #[tokio::test]
    async fn git_history_reaches_pipeline_lineage_end_to_end() {
        let (state, graph) = state().await;
        graph.upsert_node(GraphNode::new("research_r1", NodeType::ResearchPaper, "R1")).await.unwrap();
        graph.upsert_node(GraphNode::new("patent_p1", NodeType::Patent, "P1")).await.unwrap();
        graph.upsert_node(GraphNode::new("project_j1", NodeType::Project, "J1")).await.unwrap();
        graph.upsert_edge(GraphEdge::new("patent_p1", "research_r1", EdgeType::DerivesFrom)).await.unwrap();
        graph.upsert_edge(GraphEdge::new("project_j1", "patent_p1", EdgeType::Implements)).await.unwrap();

        let response = git_history(State(state), Path("project_j1".to_string())).await.unwrap();
        let body = response.0.data.unwrap();
        assert_eq!(body.commits.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(), vec!["research_r1", "patent_p1", "project_j1"]);
        assert_eq!(body.branches.project, vec!["project/project_j1".to_string()]);
    }
}
