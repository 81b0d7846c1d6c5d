//! Spatial nearest-neighbour edge attachment (§4.9), grounded on the original
//! `geospatial.py`. The graph here is small enough that an O(n^2) haversine
//! scan replaces the original's BallTree without changing the observable
//! behaviour.

use geo::{HaversineDistance, Point};
use pipeline_core::prelude::*;
use std::collections::HashSet;

/// Connects every coordinate-bearing node to its up-to-`k` nearest
/// neighbours within `max_km`, adding `NEARBY` edges. Skips a pair if either
/// direction already has an edge.
pub async fn add_nearest_edges(graph: &dyn GraphStore, k: usize, max_km: f64) -> Result<usize, GraphError> {
    let nodes: Vec<GraphNode> = graph.nodes().await?.into_iter().filter(|n| n.coordinates.is_some()).collect();
    if nodes.len() < 2 {
        return Ok(0);
    }

    let mut existing: HashSet<(String, String)> = HashSet::new();
    for edge in graph.edges().await? {
        existing.insert((edge.source.clone(), edge.target.clone()));
        existing.insert((edge.target, edge.source));
    }

    let mut attached = 0;
    for (i, src) in nodes.iter().enumerate() {
        let src_point = to_point(src);
        let mut ranked: Vec<(f64, &GraphNode)> = nodes
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .map(|(_, other)| (src_point.haversine_distance(&to_point(other)) / 1000.0, other))
            .collect();
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0));

        for (km, dst) in ranked.into_iter().take(k) {
            if km > max_km {
                continue;
            }
            let pair = (src.id.clone(), dst.id.clone());
            if existing.contains(&pair) || existing.contains(&(dst.id.clone(), src.id.clone())) {
                continue;
            }
            let edge = GraphEdge::new(src.id.as_str(), dst.id.as_str(), EdgeType::Nearby).with_distance_km(round2(km));
            graph.upsert_edge(edge).await?;
            existing.insert(pair);
            attached += 1;
        }
    }

    Ok(attached)
}

fn to_point(node: &GraphNode) -> Point<f64> {
    let c = node.coordinates.expect("caller filters to coordinate-bearing nodes");
    Point::new(c.lng, c.lat)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_adapter_graph_memory::InMemoryGraphStore;

    fn node(id: &str, lat: f64, lng: f64) -> GraphNode {
        GraphNode::new(id, NodeType::Locality, id).with_coordinates(Coordinates::new(lat, lng))
    }

    #[tokio::test]
    async fn connects_nearby_nodes_within_radius() {
        let store = InMemoryGraphStore::new();
        // Norfolk and Virginia Beach centres, roughly 25km apart.
        store.upsert_node(node("loc_norfolk", 36.8508, -76.2859)).await.unwrap();
        store.upsert_node(node("loc_virginia_beach", 36.8529, -75.9780)).await.unwrap();
        // Far away: should not connect at max_km=50.
        store.upsert_node(node("loc_richmond", 37.5407, -77.4360)).await.unwrap();

        let attached = add_nearest_edges(&store, 3, 50.0).await.unwrap();
        assert!(attached >= 1);

        let edges = store.edges().await.unwrap();
        assert!(edges.iter().any(|e| {
            (e.source == "loc_norfolk" && e.target == "loc_virginia_beach")
                || (e.source == "loc_virginia_beach" && e.target == "loc_norfolk")
        }));
        assert!(!edges.iter().any(|e| e.source == "loc_richmond" || e.target == "loc_richmond"));
    }

    #[tokio::test]
    async fn never_adds_both_directions_for_the_same_pair() {
        let store = InMemoryGraphStore::new();
        store.upsert_node(node("a", 36.85, -76.28)).await.unwrap();
        store.upsert_node(node("b", 36.86, -76.29)).await.unwrap();

        add_nearest_edges(&store, 3, 500.0).await.unwrap();
        let edges = store.edges().await.unwrap();
        assert_eq!(edges.iter().filter(|e| e.edge_type == EdgeType::Nearby).count(), 1);
    }

    #[tokio::test]
    async fn fewer_than_two_coordinate_nodes_is_a_noop() {
        let store = InMemoryGraphStore::new();
        store.upsert_node(node("a", 36.85, -76.28)).await.unwrap();
        let attached = add_nearest_edges(&store, 3, 500.0).await.unwrap();
        assert_eq!(attached, 0);
    }
}
