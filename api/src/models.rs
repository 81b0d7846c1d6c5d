//! Response DTOs shared across handlers: GeoJSON shapes for the two
//! map-data endpoints and the pagination-style query params `/search` and
//! the telemetry series endpoint accept.

use pipeline_core::prelude::*;
use serde::{Deserialize, Serialize};

/// A single point feature, used by both `/graph/map-data` and
/// `/api/telemetry/map-data`.
#[derive(Debug, Serialize)]
pub struct GeoJsonFeature {
    #[serde(rename = "type")]
    pub feature_type: &'static str,
    pub geometry: GeoJsonGeometry,
    pub properties: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct GeoJsonGeometry {
    #[serde(rename = "type")]
    pub geometry_type: &'static str,
    pub coordinates: [f64; 2],
}

#[derive(Debug, Serialize)]
pub struct GeoJsonFeatureCollection {
    #[serde(rename = "type")]
    pub collection_type: &'static str,
    pub features: Vec<GeoJsonFeature>,
}

impl GeoJsonFeatureCollection {
    pub fn new(features: Vec<GeoJsonFeature>) -> Self {
        Self { collection_type: "FeatureCollection", features }
    }
}

pub fn point_feature(coordinates: Coordinates, properties: serde_json::Value) -> GeoJsonFeature {
    GeoJsonFeature {
        feature_type: "Feature",
        geometry: GeoJsonGeometry { geometry_type: "Point", coordinates: [coordinates.lng, coordinates.lat] },
        properties,
    }
}

/// `GET /graph/subgraph/{nodeId}?depth=k`.
#[derive(Debug, Deserialize)]
pub struct SubgraphParams {
    pub depth: Option<usize>,
}

/// `GET /api/telemetry/{streamId}?from=...&to=...&resolution=raw|hourly|daily`.
#[derive(Debug, Deserialize)]
pub struct TelemetryRangeParams {
    pub from: Option<chrono::DateTime<chrono::Utc>>,
    pub to: Option<chrono::DateTime<chrono::Utc>>,
    pub resolution: Option<Resolution>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    #[default]
    Raw,
    Hourly,
    Daily,
}

/// `GET /api/telemetry/streams?type=...&locality=...`.
#[derive(Debug, Deserialize)]
pub struct TelemetryStreamFilter {
    #[serde(rename = "type")]
    pub metric_type: Option<String>,
    pub locality: Option<String>,
}

/// `GET /search?q=...` and `GET /api/search/suggest?q=...`.
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_feature_orders_lng_before_lat() {
        let feature = point_feature(Coordinates::new(36.85, -76.28), serde_json::json!({}));
        assert_eq!(feature.geometry.coordinates, [-76.28, 36.85]);
    }
}
