//! National Weather Service gridded-forecast ingestor (§4.8), grounded on
//! `weather_ingestor.py`: fetches forecast data for a fixed list of grid
//! points covering the seven cities and, per configured weather variable,
//! picks the value whose valid time is closest to now.

use chrono::{DateTime, Utc};
use pipeline_core::prelude::*;
use serde_json::Value;

const NWS_API_BASE: &str = "https://api.weather.gov/";
const WEATHER_TYPES: &[(&str, &str)] =
    &[("temperature", "temperature"), ("precipitation", "quantitativePrecipitation"), ("wind", "windSpeed"), ("humidity", "relativeHumidity")];

/// `(office, grid_x, grid_y, city, lat, lng)` -- the original hardcodes these
/// to avoid NWS API rate limits; this keeps the same approximation.
const GRID_POINTS: &[(&str, i32, i32, &str, f64, f64)] = &[
    ("AKQ", 70, 32, "NORFOLK", 36.8508, -76.2859),
    ("AKQ", 71, 32, "VIRGINIA BEACH", 36.8529, -75.9780),
    ("AKQ", 69, 31, "CHESAPEAKE", 36.7682, -76.2875),
    ("AKQ", 68, 32, "PORTSMOUTH", 36.8354, -76.2982),
    ("AKQ", 66, 33, "SUFFOLK", 36.7282, -76.5836),
    ("AKQ", 67, 35, "HAMPTON", 37.0299, -76.3452),
    ("AKQ", 66, 35, "NEWPORT NEWS", 37.0871, -76.4343),
];

pub struct WeatherIngestor {
    client: reqwest::Client,
    base_url: String,
    weather_types: Vec<&'static str>,
}

impl WeatherIngestor {
    pub fn new() -> Self {
        Self::with_base_url(NWS_API_BASE)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), base_url: base_url.into(), weather_types: WEATHER_TYPES.iter().map(|(t, _)| *t).collect() }
    }

    async fn fetch_gridpoint(&self, office: &str, x: i32, y: i32) -> Option<Value> {
        let url = format!("{}gridpoints/{office}/{x},{y}", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("User-Agent", "pipeline-telemetry/1.0")
            .header("Accept", "application/geo+json")
            .timeout(std::time::Duration::from_secs(30))
            .send()
            .await
            .ok()?;
        response.json::<Value>().await.ok()
    }

    fn extract_value(data: &Value, weather_type: &str) -> Option<(f64, String)> {
        let property_name = WEATHER_TYPES.iter().find(|(t, _)| *t == weather_type).map(|(_, p)| *p)?;
        let values = data.pointer(&format!("/properties/{property_name}/values"))?.as_array()?;
        let unit = data.pointer(&format!("/properties/{property_name}/uom")).and_then(Value::as_str).unwrap_or("").to_string();

        let now = Utc::now();
        let mut best: Option<(DateTime<Utc>, f64)> = None;
        for entry in values {
            let valid_time = entry.get("validTime").and_then(Value::as_str)?;
            let start = valid_time.split('/').next()?;
            let Ok(parsed) = DateTime::parse_from_rfc3339(start) else { continue };
            let parsed = parsed.with_timezone(&Utc);
            let value = entry.get("value").and_then(Value::as_f64)?;
            let diff = (now - parsed).num_seconds().abs();
            if best.is_none() || diff < (now - best.unwrap().0).num_seconds().abs() {
                best = Some((parsed, value));
            }
        }
        best.map(|(_, v)| (v, unit.clone()))
    }
}

impl Default for WeatherIngestor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TelemetryIngestor for WeatherIngestor {
    fn name(&self) -> &'static str {
        "weather"
    }

    fn metric_type(&self) -> &'static str {
        "weather"
    }

    fn unit(&self) -> &'static str {
        "variable"
    }

    fn license(&self) -> &'static str {
        "CC0-1.0"
    }

    async fn fetch_data(&self) -> Result<Vec<RawReading>, TelemetryError> {
        let now = Utc::now();
        let mut readings = Vec::new();

        for (office, x, y, city, lat, lng) in GRID_POINTS {
            let Some(data) = self.fetch_gridpoint(office, *x, *y).await else { continue };

            for weather_type in &self.weather_types {
                let Some((value, unit)) = Self::extract_value(&data, weather_type) else { continue };
                readings.push(RawReading {
                    stream_id: format!("weather_{weather_type}_{city}"),
                    value,
                    unit,
                    lat: *lat,
                    lng: *lng,
                    timestamp: now,
                    locality: Some((*city).to_string()),
                    source_url: Some(format!("{}gridpoints/{office}/{x},{y}", self.base_url)),
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
    async fn picks_the_value_closest_to_now() {
        let server = MockServer::start().await;
        let now = Utc::now();
        let body = serde_json::json!({
            "properties": {
                "temperature": {
                    "uom": "wmoUnit:degC",
                    "values": [
                        {"validTime": (now - chrono::Duration::hours(5)).to_rfc3339() + "/PT1H", "value": 10.0},
                        {"validTime": (now - chrono::Duration::minutes(5)).to_rfc3339() + "/PT1H", "value": 22.5},
                    ]
                }
            }
        });
        Mock::given(method("GET")).and(path("/gridpoints/AKQ/70,32")).respond_with(ResponseTemplate::new(200).set_body_json(&body)).mount(&server).await;
        Mock::given(method("GET")).respond_with(ResponseTemplate::new(404)).mount(&server).await;

        let ingestor = WeatherIngestor::with_base_url(format!("{}/", server.uri()));
        let readings = ingestor.fetch_data().await.unwrap();

        let norfolk_temp = readings.iter().find(|r| r.stream_id == "weather_temperature_NORFOLK").unwrap();
        assert_eq!(norfolk_temp.value, 22.5);
        assert_eq!(norfolk_temp.unit, "wmoUnit:degC");
    }
}
