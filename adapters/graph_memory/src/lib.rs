//! In-memory implementation of `GraphStore`: an append-only directed
//! multigraph, idempotently keyed per §3/§4.6, serialisable to the
//! `{nodes, edges, projects, locations}` snapshot shape (§6).

use async_trait::async_trait;
use pipeline_core::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Default)]
struct MemoryGraph {
    nodes: HashMap<String, GraphNode>,
    /// `(node_type, label)` -> node id, for idempotent upsert-by-label lookup.
    nodes_by_label: HashMap<(NodeType, String), String>,
    edges: Vec<GraphEdge>,
    /// `merge_key()` -> index into `edges`, for idempotent edge insertion.
    edge_index: HashMap<(String, String, EdgeType), usize>,
}

impl MemoryGraph {
    fn upsert_node(&mut self, node: GraphNode) -> String {
        let key = (node.node_type, node.label.clone());
        if let Some(existing_id) = self.nodes_by_label.get(&key).cloned() {
            let mut merged = self.nodes.get(&existing_id).cloned().unwrap_or_else(|| node.clone());
            merged.properties.extend(node.properties);
            if node.coordinates.is_some() {
                merged.coordinates = node.coordinates;
            }
            if node.cid.is_some() {
                merged.cid = node.cid;
            }
            self.nodes.insert(existing_id.clone(), merged);
            return existing_id;
        }

        let id = node.id.clone();
        self.nodes_by_label.insert(key, id.clone());
        self.nodes.insert(id.clone(), node);
        id
    }

    fn upsert_edge(&mut self, edge: GraphEdge) -> bool {
        let key = edge.merge_key();
        if self.edge_index.contains_key(&key) {
            return false;
        }
        let idx = self.edges.len();
        self.edge_index.insert(key, idx);
        self.edges.push(edge);
        true
    }
}

/// In-memory `GraphStore`.
pub struct InMemoryGraphStore {
    graph: Arc<RwLock<MemoryGraph>>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self { graph: Arc::new(RwLock::new(MemoryGraph::default())) }
    }

    pub async fn stats(&self) -> (usize, usize) {
        let graph = self.graph.read().await;
        (graph.nodes.len(), graph.edges.len())
    }
}

impl Default for InMemoryGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn upsert_node(&self, node: GraphNode) -> Result<String, GraphError> {
        let mut graph = self.graph.write().await;
        let id = graph.upsert_node(node);
        debug!(node_id = %id, "upserted graph node");
        Ok(id)
    }

    async fn upsert_edge(&self, edge: GraphEdge) -> Result<bool, GraphError> {
        let mut graph = self.graph.write().await;
        let inserted = graph.upsert_edge(edge);
        Ok(inserted)
    }

    async fn get_node(&self, id: &str) -> Result<Option<GraphNode>, GraphError> {
        let graph = self.graph.read().await;
        Ok(graph.nodes.get(id).cloned())
    }

    async fn find_node_by_label(&self, node_type_label: &str, label: &str) -> Result<Option<GraphNode>, GraphError> {
        let graph = self.graph.read().await;
        let node_type = node_type_from_str(node_type_label)
            .ok_or_else(|| GraphError::ConstraintViolation(format!("unknown node type {node_type_label}")))?;
        let Some(id) = graph.nodes_by_label.get(&(node_type, label.to_string())) else {
            return Ok(None);
        };
        Ok(graph.nodes.get(id).cloned())
    }

    async fn nodes(&self) -> Result<Vec<GraphNode>, GraphError> {
        let graph = self.graph.read().await;
        Ok(graph.nodes.values().cloned().collect())
    }

    async fn edges(&self) -> Result<Vec<GraphEdge>, GraphError> {
        let graph = self.graph.read().await;
        Ok(graph.edges.clone())
    }

    async fn edges_from(&self, node_id: &str) -> Result<Vec<GraphEdge>, GraphError> {
        let graph = self.graph.read().await;
        Ok(graph.edges.iter().filter(|e| e.source == node_id).cloned().collect())
    }

    async fn edges_to(&self, node_id: &str) -> Result<Vec<GraphEdge>, GraphError> {
        let graph = self.graph.read().await;
        Ok(graph.edges.iter().filter(|e| e.target == node_id).cloned().collect())
    }

    async fn snapshot_json(&self) -> Result<serde_json::Value, GraphError> {
        let graph = self.graph.read().await;
        let nodes: Vec<&GraphNode> = graph.nodes.values().collect();
        let projects: Vec<&GraphNode> = nodes.iter().filter(|n| n.node_type == NodeType::Project).copied().collect();
        let locations: Vec<&GraphNode> = nodes.iter().filter(|n| n.node_type == NodeType::Locality || n.node_type == NodeType::Region).copied().collect();

        let snapshot = serde_json::to_value(serde_json::json!({
            "nodes": nodes,
            "edges": graph.edges,
            "projects": projects,
            "locations": locations,
        }))?;
        Ok(snapshot)
    }
}

fn node_type_from_str(s: &str) -> Option<NodeType> {
    serde_json::from_value(serde_json::Value::String(s.to_string())).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn upsert_node_by_label_is_idempotent_and_merges_properties() {
        let store = InMemoryGraphStore::new();
        let first = GraphNode::new("proj-1", NodeType::Project, "Bay Bridge Widening")
            .with_property("status", json!("active"));
        let second = GraphNode::new("proj-1-dup", NodeType::Project, "Bay Bridge Widening")
            .with_property("budget_usd", json!(1_000_000));

        let id1 = store.upsert_node(first).await.unwrap();
        let id2 = store.upsert_node(second).await.unwrap();
        assert_eq!(id1, id2);

        let merged = store.get_node(&id1).await.unwrap().unwrap();
        assert_eq!(merged.properties.get("status"), Some(&json!("active")));
        assert_eq!(merged.properties.get("budget_usd"), Some(&json!(1_000_000)));
    }

    #[tokio::test]
    async fn upsert_edge_ignores_duplicate_merge_key() {
        let store = InMemoryGraphStore::new();
        store.upsert_node(GraphNode::new("a", NodeType::Project, "A")).await.unwrap();
        store.upsert_node(GraphNode::new("b", NodeType::Locality, "B")).await.unwrap();

        let first = GraphEdge::new("a", "b", EdgeType::LocatedIn).with_confidence(0.5);
        let duplicate = GraphEdge::new("a", "b", EdgeType::LocatedIn).with_confidence(0.9);

        assert!(store.upsert_edge(first).await.unwrap());
        assert!(!store.upsert_edge(duplicate).await.unwrap());

        let edges = store.edges().await.unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].confidence, Some(0.5));
    }

    #[tokio::test]
    async fn snapshot_json_separates_projects_and_locations() {
        let store = InMemoryGraphStore::new();
        store.upsert_node(GraphNode::new("proj-1", NodeType::Project, "Widening")).await.unwrap();
        store.upsert_node(GraphNode::new("loc-1", NodeType::Locality, "Norfolk")).await.unwrap();
        store.upsert_node(GraphNode::new("person-1", NodeType::Person, "Jane Doe")).await.unwrap();

        let snapshot = store.snapshot_json().await.unwrap();
        assert_eq!(snapshot["projects"].as_array().unwrap().len(), 1);
        assert_eq!(snapshot["locations"].as_array().unwrap().len(), 1);
        assert_eq!(snapshot["nodes"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn edges_from_and_edges_to_filter_by_node() {
        let store = InMemoryGraphStore::new();
        store.upsert_node(GraphNode::new("a", NodeType::Project, "A")).await.unwrap();
        store.upsert_node(GraphNode::new("b", NodeType::Locality, "B")).await.unwrap();
        store.upsert_edge(GraphEdge::new("a", "b", EdgeType::LocatedIn)).await.unwrap();

        assert_eq!(store.edges_from("a").await.unwrap().len(), 1);
        assert_eq!(store.edges_to("b").await.unwrap().len(), 1);
        assert_eq!(store.edges_from("b").await.unwrap().len(), 0);
    }
}
