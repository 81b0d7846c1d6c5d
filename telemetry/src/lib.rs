//! Telemetry ingestion framework (§4.8): the region/PII/license gate shared
//! by every ingestor, concrete traffic and weather ingestors, and the
//! recurring scheduler that drives them.

pub mod base;
pub mod scheduler;
pub mod traffic;
pub mod weather;

pub use base::{is_in_region, is_license_allowed, nearest_seven_city, process_reading, StorageConfig, ALLOWED_LICENSES, SEVEN_CITIES};
pub use scheduler::{run as run_scheduler, run_once, ScheduledIngestor, TRAFFIC_INTERVAL, WEATHER_INTERVAL};
pub use traffic::TrafficIngestor;
pub use weather::WeatherIngestor;
