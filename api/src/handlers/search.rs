//! Search endpoints (§4.10). The plain substring search (`GET /search`) is
//! the original's literal behaviour; `/api/search` and `/api/search/multi`
//! add a thin structured layer on top -- tokenising the natural-language
//! query into keywords and an optional node-type filter -- without standing
//! up a full NL parser, matching the spec's "surface only" framing for this
//! endpoint group.

use crate::{handlers::projects::NodeSummary, handle_graph_error, ApiResponse, AppState, SearchQuery};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
};
use pipeline_core::prelude::*;
use serde::{Deserialize, Serialize};

type ApiError = (StatusCode, Json<ApiResponse<()>>);

fn matches_label_or_summary(node: &GraphNode, needle: &str) -> bool {
    if node.label.to_lowercase().contains(needle) {
        return true;
    }
    node.properties.values().any(|v| v.as_str().map(|s| s.to_lowercase().contains(needle)).unwrap_or(false))
}

/// `GET /search?q=...` -- substring search over labels and project summaries.
pub async fn substring_search(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<ApiResponse<Vec<NodeSummary>>>, ApiError> {
    let needle = params.q.to_lowercase();
    let nodes = state.graph.nodes().await.map_err(handle_graph_error)?;
    let matches = nodes.into_iter().filter(|n| matches_label_or_summary(n, &needle)).map(NodeSummary::from).collect();
    Ok(Json(ApiResponse::success(matches)))
}

const NODE_TYPE_WORDS: &[(&str, NodeType)] = &[
    ("project", NodeType::Project),
    ("projects", NodeType::Project),
    ("patent", NodeType::Patent),
    ("patents", NodeType::Patent),
    ("research", NodeType::ResearchPaper),
    ("paper", NodeType::ResearchPaper),
    ("papers", NodeType::ResearchPaper),
    ("person", NodeType::Person),
    ("people", NodeType::Person),
    ("locality", NodeType::Locality),
    ("localities", NodeType::Locality),
    ("sensor", NodeType::Sensor),
    ("sensors", NodeType::Sensor),
];

const STOPWORDS: &[&str] = &["the", "a", "an", "in", "of", "for", "about", "near", "show", "me", "find", "all"];

#[derive(Debug, Clone, Deserialize)]
pub struct StructuredSearchRequest {
    pub query: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StructuredQuery {
    pub node_type: Option<NodeType>,
    pub keywords: Vec<String>,
}

/// Tokenises a free-text query into a node-type filter (from a small
/// vocabulary of type words) plus the remaining keywords.
fn parse_structured_query(query: &str) -> StructuredQuery {
    let mut node_type = None;
    let mut keywords = Vec::new();

    for word in query.split_whitespace() {
        let lower = word.to_lowercase();
        let cleaned: String = lower.chars().filter(|c| c.is_alphanumeric()).collect();
        if cleaned.is_empty() || STOPWORDS.contains(&cleaned.as_str()) {
            continue;
        }
        if node_type.is_none() {
            if let Some((_, nt)) = NODE_TYPE_WORDS.iter().find(|(word, _)| *word == cleaned) {
                node_type = Some(*nt);
                continue;
            }
        }
        keywords.push(cleaned);
    }

    StructuredQuery { node_type, keywords }
}

async fn run_structured_query(state: &AppState, query: &StructuredQuery) -> Result<Vec<NodeSummary>, GraphError> {
    let nodes = state.graph.nodes().await?;
    let matches = nodes
        .into_iter()
        .filter(|n| query.node_type.map(|t| t == n.node_type).unwrap_or(true))
        .filter(|n| query.keywords.is_empty() || query.keywords.iter().any(|k| matches_label_or_summary(n, k)))
        .map(NodeSummary::from)
        .collect();
    Ok(matches)
}

#[derive(Debug, Serialize)]
pub struct StructuredSearchResponse {
    pub parsed: StructuredQuery,
    pub results: Vec<NodeSummary>,
}

/// `POST /api/search` -- structured query derived from a natural-language
/// string.
pub async fn structured_search(
    State(state): State<AppState>,
    Json(request): Json<StructuredSearchRequest>,
) -> Result<Json<ApiResponse<StructuredSearchResponse>>, ApiError> {
    let parsed = parse_structured_query(&request.query);
    let results = run_structured_query(&state, &parsed).await.map_err(handle_graph_error)?;
    Ok(Json(ApiResponse::success(StructuredSearchResponse { parsed, results })))
}

#[derive(Debug, Deserialize)]
pub struct MultiSearchRequest {
    pub queries: Vec<String>,
}

/// `POST /api/search/multi` -- a natural-language request decomposed
/// upstream into a sequence of simpler queries, each run independently and
/// in order (later steps do not depend on earlier ones; ordering here only
/// reflects the caller's decomposition).
pub async fn multi_search(
    State(state): State<AppState>,
    Json(request): Json<MultiSearchRequest>,
) -> Result<Json<ApiResponse<Vec<StructuredSearchResponse>>>, ApiError> {
    let mut steps = Vec::with_capacity(request.queries.len());
    for query in &request.queries {
        let parsed = parse_structured_query(query);
        let results = run_structured_query(&state, &parsed).await.map_err(handle_graph_error)?;
        steps.push(StructuredSearchResponse { parsed, results });
    }
    Ok(Json(ApiResponse::success(steps)))
}

/// `GET /api/search/suggest?q=prefix` -- label prefix completion.
pub async fn suggest(State(state): State<AppState>, Query(params): Query<SearchQuery>) -> Result<Json<ApiResponse<Vec<String>>>, ApiError> {
    let prefix = params.q.to_lowercase();
    let nodes = state.graph.nodes().await.map_err(handle_graph_error)?;
    let mut suggestions: Vec<String> = nodes.into_iter().map(|n| n.label).filter(|label| label.to_lowercase().starts_with(&prefix)).collect();
    suggestions.sort();
    suggestions.dedup();
    suggestions.truncate(10);
    Ok(Json(ApiResponse::success(suggestions)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ReadApiConfig;
    use pipeline_adapter_coordination::InMemoryCoordinationStore;
    use pipeline_adapter_graph_memory::InMemoryGraphStore;
    use pipeline_adapter_object_store::LocalObjectStore;
    use std::sync::Arc;

    async fn state_with_nodes() -> AppState {
        let dir = tempfile::tempdir().unwrap();
        let graph = Arc::new(InMemoryGraphStore::new());
        graph.upsert_node(GraphNode::new("project_bridge", NodeType::Project, "Harbor Bridge Expansion")).await.unwrap();
        graph.upsert_node(GraphNode::new("patent_sonar", NodeType::Patent, "Underwater Sonar Array")).await.unwrap();
        AppState {
            graph,
            coordination: Arc::new(InMemoryCoordinationStore::new()),
            object_store: Arc::new(LocalObjectStore::new(dir.path()).await.unwrap()),
            config: ReadApiConfig::default(),
        }
    }

    #[test]
    fn parse_structured_query_extracts_a_node_type_and_drops_stopwords() {
        let parsed = parse_structured_query("show me all patents about sonar");
        assert_eq!(parsed.node_type, Some(NodeType::Patent));
        assert_eq!(parsed.keywords, vec!["sonar".to_string()]);
    }

    #[tokio::test]
    async fn substring_search_matches_on_label() {
        let state = state_with_nodes().await;
        let response = substring_search(State(state), Query(SearchQuery { q: "bridge".to_string() })).await.unwrap();
        let results = response.0.data.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "project_bridge");
    }

    #[tokio::test]
    async fn structured_search_filters_by_parsed_node_type() {
        let state = state_with_nodes().await;
        let response =
            structured_search(State(state), Json(StructuredSearchRequest { query: "patents about sonar".to_string() })).await.unwrap();
        let body = response.0.data.unwrap();
        assert_eq!(body.results.len(), 1);
        assert_eq!(body.results[0].id, "patent_sonar");
    }

    #[tokio::test]
    async fn multi_search_runs_each_query_independently() {
        let state = state_with_nodes().await;
        let response = multi_search(
            State(state),
            Json(MultiSearchRequest { queries: vec!["bridge".to_string(), "patents".to_string()] }),
        )
        .await
        .unwrap();
        let steps = response.0.data.unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].results.len(), 1);
        assert_eq!(steps[1].results.len(), 1);
    }
}
