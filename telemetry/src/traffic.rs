//! VDOT traffic ingestor (§4.8), grounded on `traffic_ingestor.py`: fetches a
//! set of region-scoped GeoJSON feeds and turns each in-bounds point feature
//! into a `RawReading`.

use crate::base::{is_in_region, nearest_seven_city};
use chrono::Utc;
use pipeline_core::prelude::*;
use serde_json::Value;

const VDOT_API_BASE: &str = "https://www.511virginia.org/data/geojson/";
const ENDPOINTS: &[(&str, &str)] =
    &[("incidents", "incidents.geojson"), ("cameras", "cameras.geojson"), ("signs", "signs.geojson"), ("counters", "counters.geojson")];
const COUNT_FIELDS: &[&str] = &["count", "volume", "vehicleCount", "dailyCount", "flowRate"];

pub struct TrafficIngestor {
    client: reqwest::Client,
    base_url: String,
    endpoints: Vec<&'static str>,
}

impl TrafficIngestor {
    pub fn new() -> Self {
        Self::with_base_url(VDOT_API_BASE)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            endpoints: ENDPOINTS.iter().map(|(name, _)| *name).collect(),
        }
    }

    async fn fetch_endpoint(&self, name: &str) -> Option<Value> {
        let (_, path) = ENDPOINTS.iter().find(|(n, _)| *n == name)?;
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.get(&url).timeout(std::time::Duration::from_secs(30)).send().await.ok()?;
        response.json::<Value>().await.ok()
    }

    fn extract_count(properties: &Value) -> Option<f64> {
        for field in COUNT_FIELDS {
            if let Some(v) = properties.get(field) {
                if let Some(n) = v.as_f64() {
                    return Some(n);
                }
            }
        }
        if properties.get("type").and_then(Value::as_str) == Some("incident") {
            return Some(1.0);
        }
        match properties.get("congestionLevel").and_then(Value::as_str).map(str::to_lowercase).as_deref() {
            Some("high") => Some(100.0),
            Some("medium") => Some(50.0),
            Some("low") => Some(20.0),
            _ => None,
        }
    }
}

impl Default for TrafficIngestor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TelemetryIngestor for TrafficIngestor {
    fn name(&self) -> &'static str {
        "traffic"
    }

    fn metric_type(&self) -> &'static str {
        "traffic"
    }

    fn unit(&self) -> &'static str {
        "count"
    }

    fn license(&self) -> &'static str {
        "CC-BY-4.0"
    }

    async fn fetch_data(&self) -> Result<Vec<RawReading>, TelemetryError> {
        let now = Utc::now();
        let mut readings = Vec::new();

        for endpoint in &self.endpoints {
            let Some(data) = self.fetch_endpoint(endpoint).await else { continue };
            let Some(features) = data.get("features").and_then(Value::as_array) else { continue };

            for feature in features {
                let Some(coords) = feature.pointer("/geometry/coordinates").and_then(Value::as_array) else { continue };
                if coords.len() != 2 {
                    continue;
                }
                let (lon, lat) = (coords[0].as_f64().unwrap_or_default(), coords[1].as_f64().unwrap_or_default());
                if !is_in_region(lat, lon) {
                    continue;
                }

                let properties = feature.get("properties").cloned().unwrap_or(Value::Null);
                let Some(value) = Self::extract_count(&properties) else { continue };

                let feature_id = properties.get("id").and_then(Value::as_str).map(str::to_string).unwrap_or_else(|| format!("{endpoint}_{lon}_{lat}"));
                let locality = nearest_seven_city(lat, lon).to_string();

                readings.push(RawReading {
                    stream_id: format!("traffic_{endpoint}_{feature_id}"),
                    value,
                    unit: self.unit().to_string(),
                    lat,
                    lng: lon,
                    timestamp: now,
                    locality: Some(locality),
                    source_url: Some(format!("{}{}", self.base_url, ENDPOINTS.iter().find(|(n, _)| n == endpoint).map(|(_, p)| *p).unwrap_or_default())),
                });
            }
        }

        Ok(readings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn parses_an_in_region_incident_feature_with_nearest_city() {
        let server = MockServer::start().await;
        let body = serde_json::json!({
            "features": [
                {
                    "type": "Feature",
                    "geometry": {"type": "Point", "coordinates": [-76.2859, 36.8508]},
                    "properties": {"id": "inc-1", "type": "incident"}
                },
                {
                    "type": "Feature",
                    "geometry": {"type": "Point", "coordinates": [-74.0, 40.0]},
                    "properties": {"id": "inc-2", "type": "incident"}
                }
            ]
        });
        Mock::given(method("GET")).and(path("/incidents.geojson")).respond_with(ResponseTemplate::new(200).set_body_json(&body)).mount(&server).await;
        for other in ["cameras.geojson", "signs.geojson", "counters.geojson"] {
            Mock::given(method("GET")).and(path(format!("/{other}"))).respond_with(ResponseTemplate::new(404)).mount(&server).await;
        }

        let ingestor = TrafficIngestor::with_base_url(format!("{}/", server.uri()));
        let readings = ingestor.fetch_data().await.unwrap();

        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].value, 1.0);
        assert_eq!(readings[0].locality.as_deref(), Some("NORFOLK"));
    }

    #[tokio::test]
    async fn maps_congestion_level_to_a_count_when_no_numeric_field_is_present() {
        let server = MockServer::start().await;
        let body = serde_json::json!({
            "features": [{
                "type": "Feature",
                "geometry": {"type": "Point", "coordinates": [-76.2875, 36.7682]},
                "properties": {"id": "cam-1", "congestionLevel": "High"}
            }]
        });
        Mock::given(method("GET")).and(path("/cameras.geojson")).respond_with(ResponseTemplate::new(200).set_body_json(&body)).mount(&server).await;
        for other in ["incidents.geojson", "signs.geojson", "counters.geojson"] {
            Mock::given(method("GET")).and(path(format!("/{other}"))).respond_with(ResponseTemplate::new(404)).mount(&server).await;
        }

        let ingestor = TrafficIngestor::with_base_url(format!("{}/", server.uri()));
        let readings = ingestor.fetch_data().await.unwrap();
        assert_eq!(readings.iter().find(|r| r.stream_id.contains("cam-1")).unwrap().value, 100.0);
    }
}
