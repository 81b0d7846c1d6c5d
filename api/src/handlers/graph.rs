//! Graph-shaped read endpoints (§4.10): BFS-bounded ego subgraphs, the
//! locality index, and the coordinate-bearing map-data feed.

use crate::{
    handlers::projects::NodeSummary, handle_graph_error, point_feature, ApiResponse, AppState, GeoJsonFeatureCollection, SubgraphParams,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use pipeline_core::prelude::*;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

type ApiError = (StatusCode, Json<ApiResponse<()>>);

#[derive(Debug, Serialize)]
pub struct SubgraphResponse {
    pub nodes: Vec<NodeSummary>,
    pub edges: Vec<GraphEdge>,
}

const DEFAULT_SUBGRAPH_DEPTH: usize = 1;

/// `GET /graph/subgraph/{nodeId}?depth=k` -- BFS out from `node_id` in both
/// directions, `depth` hops deep.
pub async fn subgraph(
    State(state): State<AppState>,
    Path(node_id): Path<String>,
    Query(params): Query<SubgraphParams>,
) -> Result<Json<ApiResponse<SubgraphResponse>>, ApiError> {
    if state.graph.get_node(&node_id).await.map_err(handle_graph_error)?.is_none() {
        return Err((StatusCode::NOT_FOUND, Json(ApiResponse::error(format!("node not found: {node_id}")))));
    }
    let depth = params.depth.unwrap_or(DEFAULT_SUBGRAPH_DEPTH);

    let mut visited: HashSet<String> = HashSet::from([node_id.clone()]);
    let mut frontier = vec![node_id];
    let mut nodes: Vec<GraphNode> = Vec::new();
    let mut edges: Vec<GraphEdge> = Vec::new();
    let mut edge_seen: HashSet<(String, String, EdgeType)> = HashSet::new();

    for id in &visited {
        if let Some(node) = state.graph.get_node(id).await.map_err(handle_graph_error)? {
            nodes.push(node);
        }
    }

    for _ in 0..depth {
        let mut next_frontier = Vec::new();
        for id in &frontier {
            let mut neighbours = state.graph.edges_from(id).await.map_err(handle_graph_error)?;
            neighbours.extend(state.graph.edges_to(id).await.map_err(handle_graph_error)?);

            for edge in neighbours {
                if edge_seen.insert(edge.merge_key()) {
                    edges.push(edge.clone());
                }
                let neighbour_id = if &edge.source == id { edge.target.clone() } else { edge.source.clone() };
                if visited.insert(neighbour_id.clone()) {
                    if let Some(node) = state.graph.get_node(&neighbour_id).await.map_err(handle_graph_error)? {
                        nodes.push(node);
                    }
                    next_frontier.push(neighbour_id);
                }
            }
        }
        frontier = next_frontier;
        if frontier.is_empty() {
            break;
        }
    }

    Ok(Json(ApiResponse::success(SubgraphResponse {
        nodes: nodes.into_iter().map(NodeSummary::from).collect(),
        edges,
    })))
}

pub async fn localities(State(state): State<AppState>) -> Result<Json<ApiResponse<Vec<NodeSummary>>>, ApiError> {
    let nodes = state.graph.nodes().await.map_err(handle_graph_error)?;
    let localities = nodes.into_iter().filter(|n| n.node_type == NodeType::Locality).map(NodeSummary::from).collect();
    Ok(Json(ApiResponse::success(localities)))
}

/// `GET /graph/map-data` -- every node carrying coordinates, as a GeoJSON
/// `FeatureCollection`, plus a count of coordinate-bearing nodes per
/// locality (derived from each node's `LOCATED_IN` edges, not from the
/// locality node count itself).
pub async fn map_data(State(state): State<AppState>) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let nodes = state.graph.nodes().await.map_err(handle_graph_error)?;
    let mut located: HashMap<String, Vec<String>> = HashMap::new();
    let with_coordinates: Vec<&GraphNode> = nodes.iter().filter(|n| n.coordinates.is_some()).collect();

    let mut features = Vec::with_capacity(with_coordinates.len());
    for node in &with_coordinates {
        let coordinates = node.coordinates.expect("filtered to coordinate-bearing nodes above");
        features.push(point_feature(
            coordinates,
            serde_json::json!({"id": node.id, "label": node.label, "node_type": node.node_type}),
        ));

        for edge in state.graph.edges_from(&node.id).await.map_err(handle_graph_error)? {
            if edge.edge_type == EdgeType::LocatedIn {
                located.entry(edge.target.clone()).or_default().push(node.id.clone());
            }
        }
    }

    let counts_by_locality: HashMap<String, usize> = located.into_iter().map(|(locality_id, members)| (locality_id, members.len())).collect();

    Ok(Json(ApiResponse::success(serde_json::json!({
        "geojson": GeoJsonFeatureCollection::new(features),
        "counts_by_locality": counts_by_locality,
    }))))
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
    async fn subgraph_stops_after_the_requested_depth() {
        let (state, graph) = state().await;
        graph.upsert_node(GraphNode::new("a", NodeType::Project, "A")).await.unwrap();
        graph.upsert_node(GraphNode::new("b", NodeType::Patent, "B")).await.unwrap();
        graph.upsert_node(GraphNode::new("c", NodeType::ResearchPaper, "C")).await.unwrap();
        graph.upsert_edge(GraphEdge::new("a", "b", EdgeType::Implements)).await.unwrap();
        graph.upsert_edge(GraphEdge::new("b", "c", EdgeType::DerivesFrom)).await.unwrap();

        let response = subgraph(State(state), Path("a".to_string()), Query(SubgraphParams { depth: Some(1) })).await.unwrap();
        let body = response.0.data.unwrap();
        let ids: HashSet<_> = body.nodes.iter().map(|n| n.id.clone()).collect();
        assert_eq!(ids, HashSet::from(["a".to_string(), "b".to_string()]));
    }

    #[tokio::test]
    async fn map_data_only_includes_coordinate_bearing_nodes() {
        let (state, graph) = state().await;
        graph.upsert_node(GraphNode::new("a", NodeType::Building, "A").with_coordinates(Coordinates::new(36.85, -76.28))).await.unwrap();
        graph.upsert_node(GraphNode::new("b", NodeType::Project, "B")).await.unwrap();

        let response = map_data(State(state)).await.unwrap();
        let body = response.0.data.unwrap();
        let features = body["geojson"]["features"].as_array().unwrap();
        assert_eq!(features.len(), 1);
    }
}
