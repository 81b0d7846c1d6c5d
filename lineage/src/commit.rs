//! Backward traversal and topological commit ordering (§4.11), grounded on
//! `build_git_history_for_project`/`get_node_locality_info`/
//! `get_node_timestamp` in `git_graph.py`. The original walks a NetworkX
//! `DiGraph` in memory; this walks the same shape one `GraphStore` query at
//! a time, since nothing in this workspace holds the whole graph as an
//! adjacency structure outside of `InMemoryGraphStore` itself.

use chrono::{DateTime, Utc};
use pipeline_core::prelude::*;
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};

/// The normative seven-city list used for `in_seven_cities` (§4.8, shared
/// with the telemetry crate's identical list -- duplicated here rather than
/// taking a dependency on `pipeline-telemetry`, since lineage has no other
/// reason to depend on the telemetry stack).
const SEVEN_CITIES: &[&str] =
    &["CHESAPEAKE", "HAMPTON", "NEWPORT NEWS", "NORFOLK", "PORTSMOUTH", "SUFFOLK", "VIRGINIA BEACH"];

/// Edge types a lineage traversal follows (§4.11 step 1). Deliberately
/// excludes `SUPERSEDES`, which the glossary's general "lineage edge"
/// definition includes but the traversal rule in §4.11 does not name --
/// see `DESIGN.md`.
const LINEAGE_EDGE_TYPES: &[EdgeType] = &[EdgeType::DerivesFrom, EdgeType::Implements, EdgeType::Influenced];

fn is_lineage_edge(edge_type: EdgeType) -> bool {
    LINEAGE_EDGE_TYPES.contains(&edge_type)
}

#[derive(Debug, Clone, Serialize)]
pub struct Commit {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub message: String,
    pub parents: Vec<String>,
    pub cid: Option<String>,
    pub author: String,
    pub locality: String,
    pub localities: Vec<String>,
    pub coordinates: Option<Coordinates>,
    pub in_seven_cities: bool,
}

struct LocalityInfo {
    primary_locality: String,
    localities: Vec<String>,
    coordinates: Option<Coordinates>,
    in_seven_cities: bool,
}

impl Default for LocalityInfo {
    fn default() -> Self {
        Self { primary_locality: String::new(), localities: Vec::new(), coordinates: None, in_seven_cities: false }
    }
}

/// Builds the commit list for a project id: traces lineage ancestors
/// backward, topologically sorts them, and emits one commit per non-
/// locality/region node (§4.11 steps 1-3).
pub async fn build_git_history(graph: &dyn GraphStore, project_id: &str) -> Result<Vec<Commit>, GraphError> {
    graph.get_node(project_id).await?.ok_or_else(|| GraphError::NodeNotFound(project_id.to_string()))?;

    let (nodes, edges) = trace_ancestors(graph, project_id).await?;
    let order = topological_order(project_id, &nodes, &edges);

    let mut commits = Vec::with_capacity(order.len());
    for node_id in order {
        let node_type = nodes[&node_id].node_type;
        if matches!(node_type, NodeType::Locality | NodeType::Region) {
            continue;
        }

        let parents: Vec<String> = edges
            .iter()
            .filter(|e| e.target == node_id)
            .map(|e| e.source.clone())
            .filter(|p| nodes.get(p).map(|n| !matches!(n.node_type, NodeType::Locality | NodeType::Region)).unwrap_or(false))
            .collect();

        let timestamp = node_timestamp(&nodes[&node_id], &edges, &node_id);
        let locality_info = locality_info_for(graph, &node_id, &nodes[&node_id]).await?;

        commits.push(Commit {
            id: node_id.clone(),
            timestamp,
            node_type,
            message: nodes[&node_id].label.clone(),
            parents,
            cid: nodes[&node_id].cid.clone(),
            author: nodes[&node_id]
                .properties
                .get("author")
                .and_then(|v| v.as_str())
                .unwrap_or("Unknown")
                .to_string(),
            locality: locality_info.primary_locality,
            localities: locality_info.localities,
            coordinates: locality_info.coordinates,
            in_seven_cities: locality_info.in_seven_cities,
        });
    }
    Ok(commits)
}

/// BFS backward from `project_id` following lineage edges, plus any
/// `LOCATED_IN` edges out of a traced node into a locality (§4.11's
/// `add_localities_to_subgraph`), returning the subgraph's nodes and edges.
async fn trace_ancestors(
    graph: &dyn GraphStore,
    project_id: &str,
) -> Result<(HashMap<String, GraphNode>, Vec<GraphEdge>), GraphError> {
    let mut nodes = HashMap::new();
    let mut edges = Vec::new();
    let mut queue = VecDeque::new();
    queue.push_back(project_id.to_string());
    nodes.insert(project_id.to_string(), graph.get_node(project_id).await?.expect("checked by caller"));

    while let Some(current) = queue.pop_front() {
        for edge in graph.edges_to(&current).await? {
            if !is_lineage_edge(edge.edge_type) {
                continue;
            }
            if !nodes.contains_key(&edge.source) {
                let Some(node) = graph.get_node(&edge.source).await? else { continue };
                nodes.insert(edge.source.clone(), node);
                queue.push_back(edge.source.clone());
            }
            edges.push(edge);
        }
    }

    let traced_ids: Vec<String> = nodes.keys().cloned().collect();
    for node_id in traced_ids {
        for edge in graph.edges_from(&node_id).await? {
            if edge.edge_type != EdgeType::LocatedIn {
                continue;
            }
            let Some(target) = graph.get_node(&edge.target).await? else { continue };
            if target.node_type != NodeType::Locality {
                continue;
            }
            nodes.entry(edge.target.clone()).or_insert(target);
            edges.push(edge);
        }
    }

    Ok((nodes, edges))
}

/// Kahn's algorithm over the subgraph's lineage+locality edges, seeded with
/// every node so nodes with no subgraph edges still appear exactly once.
fn topological_order(root: &str, nodes: &HashMap<String, GraphNode>, edges: &[GraphEdge]) -> Vec<String> {
    let mut in_degree: HashMap<&str, usize> = nodes.keys().map(|id| (id.as_str(), 0)).collect();
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in edges {
        if nodes.contains_key(&edge.source) && nodes.contains_key(&edge.target) {
            *in_degree.entry(edge.target.as_str()).or_insert(0) += 1;
            adjacency.entry(edge.source.as_str()).or_default().push(edge.target.as_str());
        }
    }

    let mut ready: VecDeque<&str> = in_degree.iter().filter(|(_, d)| **d == 0).map(|(id, _)| *id).collect();
    let mut order = Vec::with_capacity(nodes.len());
    let mut seen = HashSet::new();
    while let Some(id) = ready.pop_front() {
        if !seen.insert(id) {
            continue;
        }
        order.push(id.to_string());
        if let Some(next) = adjacency.get(id) {
            for &n in next {
                let entry = in_degree.get_mut(n).unwrap();
                *entry = entry.saturating_sub(1);
                if *entry == 0 {
                    ready.push_back(n);
                }
            }
        }
    }

    // A cycle (shouldn't occur given idempotent upserts, but graph data can
    // come from elsewhere) leaves nodes unvisited; append them in label
    // order so the root is never silently dropped from its own history.
    let mut remaining: Vec<&str> = nodes.keys().map(|k| k.as_str()).filter(|id| !seen.contains(id)).collect();
    remaining.sort();
    order.extend(remaining.into_iter().map(String::from));

    debug_assert!(order.contains(&root.to_string()));
    order
}

fn node_timestamp(node: &GraphNode, edges: &[GraphEdge], node_id: &str) -> DateTime<Utc> {
    if let Some(date) = node.properties.get("date").and_then(|v| v.as_str()) {
        if let Ok(parsed) = DateTime::parse_from_rfc3339(date) {
            return parsed.with_timezone(&Utc);
        }
    }
    edges.iter().filter(|e| e.target == node_id).map(|e| e.timestamp).min().unwrap_or_else(Utc::now)
}

async fn locality_info_for(graph: &dyn GraphStore, node_id: &str, node: &GraphNode) -> Result<LocalityInfo, GraphError> {
    if let Some(coordinates) = node.coordinates {
        return Ok(LocalityInfo {
            primary_locality: node.label.clone(),
            localities: vec![node.label.clone()],
            coordinates: Some(coordinates),
            in_seven_cities: SEVEN_CITIES.contains(&node.label.to_uppercase().as_str()),
        });
    }

    let mut candidates = Vec::new();
    for edge in graph.edges_from(node_id).await? {
        if edge.edge_type != EdgeType::LocatedIn {
            continue;
        }
        let Some(target) = graph.get_node(&edge.target).await? else { continue };
        if target.node_type != NodeType::Locality {
            continue;
        }
        candidates.push((target.label.clone(), edge.confidence.unwrap_or(0.5), target.coordinates));
    }
    candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let Some((primary_name, _, primary_coords)) = candidates.first().cloned() else {
        return Ok(LocalityInfo::default());
    };
    Ok(LocalityInfo {
        primary_locality: primary_name.clone(),
        localities: candidates.into_iter().map(|(name, _, _)| name).collect(),
        coordinates: primary_coords,
        in_seven_cities: SEVEN_CITIES.contains(&primary_name.to_uppercase().as_str()),
    })
}
