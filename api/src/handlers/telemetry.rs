//! Telemetry read endpoints (§4.10): the stream index, a time-ranged
//! resolution-bucketed series for one stream, and a coordinate feed for the
//! map. All three read `TelemetryStream`/`TelemetryReading` nodes wired in by
//! `telemetry::base::process_reading` -- there is no separate telemetry
//! store, the graph is the store.

use crate::{
    handlers::projects::NodeSummary, handle_graph_error, point_feature, ApiResponse, AppState, GeoJsonFeatureCollection, Resolution,
    TelemetryRangeParams, TelemetryStreamFilter,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, Utc};
use pipeline_core::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;

type ApiError = (StatusCode, Json<ApiResponse<()>>);

fn reading_timestamp(node: &GraphNode) -> Option<DateTime<Utc>> {
    node.properties.get("timestamp")?.as_str()?.parse().ok()
}

fn reading_value(node: &GraphNode) -> Option<f64> {
    node.properties.get("value")?.as_f64()
}

/// `GET /api/telemetry/streams?type=...&locality=...`.
pub async fn list_streams(
    State(state): State<AppState>,
    Query(filter): Query<TelemetryStreamFilter>,
) -> Result<Json<ApiResponse<Vec<NodeSummary>>>, ApiError> {
    let nodes = state.graph.nodes().await.map_err(handle_graph_error)?;
    let mut streams = Vec::new();

    for node in nodes.into_iter().filter(|n| n.node_type == NodeType::TelemetryStream) {
        if let Some(metric_type) = &filter.metric_type {
            let matches = node.properties.get("metric").and_then(|v| v.as_str()) == Some(metric_type.as_str());
            if !matches {
                continue;
            }
        }
        if let Some(locality) = &filter.locality {
            if !stream_has_locality(&state, &node.id, locality).await.map_err(handle_graph_error)? {
                continue;
            }
        }
        streams.push(NodeSummary::from(node));
    }

    Ok(Json(ApiResponse::success(streams)))
}

async fn stream_has_locality(state: &AppState, stream_id: &str, locality: &str) -> Result<bool, GraphError> {
    let locality_upper = locality.to_uppercase();
    for edge in state.graph.edges_from(stream_id).await? {
        if edge.edge_type != EdgeType::Contains {
            continue;
        }
        for reading_edge in state.graph.edges_from(&edge.target).await? {
            if reading_edge.edge_type != EdgeType::LocatedIn {
                continue;
            }
            if let Some(locality_node) = state.graph.get_node(&reading_edge.target).await? {
                if locality_node.label.to_uppercase() == locality_upper {
                    return Ok(true);
                }
            }
        }
    }
    Ok(false)
}

#[derive(Debug, Serialize)]
pub struct SeriesPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// `GET /api/telemetry/{streamId}?from=...&to=...&resolution=raw|hourly|daily`.
pub async fn stream_series(
    State(state): State<AppState>,
    Path(stream_id): Path<String>,
    Query(params): Query<TelemetryRangeParams>,
) -> Result<Json<ApiResponse<Vec<SeriesPoint>>>, ApiError> {
    let Some(stream) = state.graph.find_node_by_label("telemetry_stream", &stream_id).await.map_err(handle_graph_error)? else {
        return Err((StatusCode::NOT_FOUND, Json(ApiResponse::error(format!("telemetry stream not found: {stream_id}")))));
    };

    let mut points = Vec::new();
    for edge in state.graph.edges_from(&stream.id).await.map_err(handle_graph_error)? {
        if edge.edge_type != EdgeType::Contains {
            continue;
        }
        let Some(reading) = state.graph.get_node(&edge.target).await.map_err(handle_graph_error)? else { continue };
        let (Some(timestamp), Some(value)) = (reading_timestamp(&reading), reading_value(&reading)) else { continue };
        if params.from.map(|from| timestamp < from).unwrap_or(false) {
            continue;
        }
        if params.to.map(|to| timestamp > to).unwrap_or(false) {
            continue;
        }
        points.push(SeriesPoint { timestamp, value });
    }
    points.sort_by_key(|p| p.timestamp);

    let bucketed = match params.resolution.unwrap_or_default() {
        Resolution::Raw => points,
        Resolution::Hourly => bucket(points, "%Y-%m-%dT%H:00:00Z"),
        Resolution::Daily => bucket(points, "%Y-%m-%dT00:00:00Z"),
    };

    Ok(Json(ApiResponse::success(bucketed)))
}

/// Averages readings into buckets keyed by the given `strftime` format,
/// returning one point per bucket at the bucket's own timestamp.
fn bucket(points: Vec<SeriesPoint>, format: &str) -> Vec<SeriesPoint> {
    let mut buckets: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    for point in &points {
        let key = point.timestamp.format(format).to_string();
        let entry = buckets.entry(key).or_insert((0.0, 0));
        entry.0 += point.value;
        entry.1 += 1;
    }
    buckets
        .into_iter()
        .filter_map(|(key, (sum, count))| {
            let timestamp = DateTime::parse_from_rfc3339(&key).ok()?.with_timezone(&Utc);
            Some(SeriesPoint { timestamp, value: sum / count as f64 })
        })
        .collect()
}

/// `GET /api/telemetry/map-data`.
pub async fn map_data(State(state): State<AppState>) -> Result<Json<ApiResponse<GeoJsonFeatureCollection>>, ApiError> {
    let nodes = state.graph.nodes().await.map_err(handle_graph_error)?;
    let features = nodes
        .into_iter()
        .filter(|n| n.node_type == NodeType::TelemetryReading)
        .filter_map(|n| {
            let coordinates = n.coordinates?;
            Some(point_feature(coordinates, serde_json::json!({"id": n.id, "stream_id": n.label})))
        })
        .collect();
    Ok(Json(ApiResponse::success(GeoJsonFeatureCollection::new(features))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ReadApiConfig;
    use pipeline_adapter_coordination::InMemoryCoordinationStore;
    use pipeline_adapter_graph_memory::InMemoryGraphStore;
    use pipeline_adapter_object_store::LocalObjectStore;
    use std::sync::Arc;

    async fn seeded_state() -> AppState {
        let dir = tempfile::tempdir().unwrap();
        let graph = Arc::new(InMemoryGraphStore::new());
        graph
            .upsert_node(GraphNode::new("stream_traffic_1", NodeType::TelemetryStream, "traffic_1").with_property("metric", "traffic"))
            .await
            .unwrap();
        for (i, value) in [10.0, 20.0].into_iter().enumerate() {
            let reading_id = format!("reading_traffic_1_{i}");
            graph
                .upsert_node(
                    GraphNode::new(reading_id.as_str(), NodeType::TelemetryReading, reading_id.as_str())
                        .with_coordinates(Coordinates::new(36.85, -76.28))
                        .with_property("value", value)
                        .with_property("timestamp", Utc::now().to_rfc3339()),
                )
                .await
                .unwrap();
            graph.upsert_edge(GraphEdge::new("stream_traffic_1", reading_id.as_str(), EdgeType::Contains)).await.unwrap();
        }

        AppState {
            graph,
            coordination: Arc::new(InMemoryCoordinationStore::new()),
            object_store: Arc::new(LocalObjectStore::new(dir.path()).await.unwrap()),
            config: ReadApiConfig::default(),
        }
    }

    #[tokio::test]
    async fn lists_streams_filtered_by_metric_type() {
        let state = seeded_state().await;
        let response =
            list_streams(State(state), Query(TelemetryStreamFilter { metric_type: Some("traffic".to_string()), locality: None })).await.unwrap();
        assert_eq!(response.0.data.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn stream_series_returns_raw_points_in_order() {
        let state = seeded_state().await;
        let response =
            stream_series(State(state), Path("traffic_1".to_string()), Query(TelemetryRangeParams { from: None, to: None, resolution: None }))
                .await
                .unwrap();
        let points = response.0.data.unwrap();
        assert_eq!(points.len(), 2);
        assert!(points[0].timestamp <= points[1].timestamp);
    }

    #[tokio::test]
    async fn unknown_stream_returns_not_found() {
        let state = seeded_state().await;
        let err = stream_series(
            State(state),
            Path("nope".to_string()),
            Query(TelemetryRangeParams { from: None, to: None, resolution: None }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::NOT_FOUND);
    }
}
