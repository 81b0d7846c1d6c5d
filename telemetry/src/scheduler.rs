//! Recurring ingestion loop (§4.8: "traffic every 15 minutes, weather every
//! 60 minutes"): each registered ingestor runs on its own `tokio::time`
//! interval, processing every reading it returns through `process_reading`.
//! Individual rejections are never retried -- the reading is simply dropped
//! and a rejection counter keyed by reason is incremented, per §7's "reading
//! silently dropped, counter incremented" policy.

use crate::base::{process_reading, StorageConfig};
use pipeline_core::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub const TRAFFIC_INTERVAL: Duration = Duration::from_secs(15 * 60);
pub const WEATHER_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// One ingestor's schedule entry.
pub struct ScheduledIngestor {
    pub ingestor: Arc<dyn TelemetryIngestor>,
    pub interval: Duration,
}

impl ScheduledIngestor {
    pub fn new(ingestor: Arc<dyn TelemetryIngestor>, interval: Duration) -> Self {
        Self { ingestor, interval }
    }
}

/// Runs every scheduled ingestor concurrently until `cancel` fires. Each
/// ingestor's tick fetches, processes, and reports its own count; a failure
/// to fetch is logged and the ingestor simply waits for its next tick.
pub async fn run(
    schedules: Vec<ScheduledIngestor>,
    object_store: Arc<dyn ObjectStore>,
    graph: Arc<dyn GraphStore>,
    coordination: Arc<dyn CoordinationStore>,
    storage: Arc<StorageConfig>,
    cancel: CancellationToken,
) {
    let mut handles = Vec::new();
    for schedule in schedules {
        let object_store = object_store.clone();
        let graph = graph.clone();
        let coordination = coordination.clone();
        let storage = storage.clone();
        let cancel = cancel.clone();
        handles.push(tokio::spawn(async move {
            run_one(schedule, object_store, graph, coordination, storage, cancel).await;
        }));
    }
    for handle in handles {
        let _ = handle.await;
    }
}

async fn run_one(
    schedule: ScheduledIngestor,
    object_store: Arc<dyn ObjectStore>,
    graph: Arc<dyn GraphStore>,
    coordination: Arc<dyn CoordinationStore>,
    storage: Arc<StorageConfig>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(schedule.interval);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!(ingestor = schedule.ingestor.name(), "telemetry scheduler shutting down");
                return;
            }
            _ = ticker.tick() => {
                let processed = run_once(&*schedule.ingestor, &*object_store, &*graph, &*coordination, &storage).await;
                info!(ingestor = schedule.ingestor.name(), processed, "telemetry tick complete");
            }
        }
    }
}

/// Fetches and processes one batch of readings for a single ingestor,
/// returning the number accepted.
pub async fn run_once(
    ingestor: &dyn TelemetryIngestor,
    object_store: &dyn ObjectStore,
    graph: &dyn GraphStore,
    coordination: &dyn CoordinationStore,
    storage: &StorageConfig,
) -> usize {
    let readings = match ingestor.fetch_data().await {
        Ok(r) => r,
        Err(e) => {
            warn!(ingestor = ingestor.name(), error = %e, "telemetry fetch failed");
            return 0;
        }
    };

    let mut accepted = 0;
    for raw in readings {
        match process_reading(ingestor.name(), ingestor.metric_type(), ingestor.unit(), ingestor.license(), raw, object_store, graph, storage).await
        {
            Ok(_) => accepted += 1,
            Err(e) => {
                let reason = rejection_reason(&e);
                warn!(ingestor = ingestor.name(), reason, "telemetry reading rejected");
                if let Err(incr_err) = coordination.incr(&format!("telemetry_readings_rejected:{reason}"), 1).await {
                    warn!(error = %incr_err, "failed to increment telemetry rejection counter");
                }
            }
        }
    }
    accepted
}

fn rejection_reason(error: &TelemetryError) -> &'static str {
    match error {
        TelemetryError::RegionOutOfBounds { .. } => "out_of_bounds",
        TelemetryError::PiiDetected => "pii_detected",
        TelemetryError::LicenseNotAllowed(_) => "license_not_allowed",
        TelemetryError::FetchFailed(_) => "fetch_failed",
        TelemetryError::StorageFailed(_) => "storage_failed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pipeline_adapter_coordination::InMemoryCoordinationStore;
    use pipeline_adapter_graph_memory::InMemoryGraphStore;
    use pipeline_adapter_object_store::LocalObjectStore;

    struct FixedIngestor(Vec<RawReading>);

    #[async_trait]
    impl TelemetryIngestor for FixedIngestor {
        fn name(&self) -> &'static str {
            "fixed"
        }
        fn metric_type(&self) -> &'static str {
            "fixed"
        }
        fn unit(&self) -> &'static str {
            "count"
        }
        fn license(&self) -> &'static str {
            "CC0-1.0"
        }
        async fn fetch_data(&self) -> Result<Vec<RawReading>, TelemetryError> {
            Ok(self.0.clone())
        }
    }

    fn reading(lat: f64, lng: f64) -> RawReading {
        RawReading {
            stream_id: "s1".to_string(),
            value: 1.0,
            unit: "count".to_string(),
            lat,
            lng,
            timestamp: chrono::Utc::now(),
            locality: None,
            source_url: None,
        }
    }

    #[tokio::test]
    async fn counts_one_acceptance_and_one_region_rejection() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path()).await.unwrap();
        let graph = InMemoryGraphStore::new();
        let coordination = InMemoryCoordinationStore::new();
        let storage = StorageConfig::object_store();

        let ingestor = FixedIngestor(vec![reading(36.85, -76.28), reading(40.0, -74.0)]);
        let accepted = run_once(&ingestor, &store, &graph, &coordination, &storage).await;

        assert_eq!(accepted, 1);
        let rejected = coordination.incr("telemetry_readings_rejected:out_of_bounds", 0).await.unwrap();
        assert_eq!(rejected, 1);
    }
}
