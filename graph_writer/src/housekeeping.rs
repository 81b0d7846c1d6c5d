//! Scheduled cleanup of stale retry-queue entries and stuck sync records
//! (§4.6 supplemental), grounded on the original processor's periodic
//! cleanup pass. The original walks a filesystem `data/failed` directory and
//! queries an IPFS daemon's pin list directly; here the same two concerns --
//! "stop retrying a promotion that already succeeded and has been stable a
//! while" and "stop retrying a sync that has failed for too long" -- are
//! expressed against the `CoordinationStore` hash primitives the rest of the
//! pipeline already uses for this kind of bookkeeping.

use chrono::{DateTime, Utc};
use pipeline_core::errors::CoordinationError;
use pipeline_core::traits::CoordinationStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

pub const RETRY_QUEUE_KEY: &str = "housekeeping:retry_queue";
pub const SYNC_RECORDS_KEY: &str = "housekeeping:sync_records";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryEntry {
    pub promoted_at: DateTime<Utc>,
    pub stored: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRecord {
    pub first_attempt_at: DateTime<Utc>,
    pub synced: bool,
    #[serde(default)]
    pub permanently_failed: bool,
}

pub struct Housekeeper {
    coordination: Arc<dyn CoordinationStore>,
    pin_lifetime_days: i64,
    failed_staleness_days: i64,
}

impl Housekeeper {
    pub fn new(coordination: Arc<dyn CoordinationStore>, pin_lifetime_days: i64, failed_staleness_days: i64) -> Self {
        Self { coordination, pin_lifetime_days, failed_staleness_days }
    }

    /// Removes retry-queue entries for files that promoted successfully and
    /// have stayed stable longer than `PIN_LIFETIME_DAYS`.
    pub async fn purge_stable_retry_entries(&self, now: DateTime<Utc>) -> Result<usize, CoordinationError> {
        let mut removed = 0;
        for (field, value) in self.coordination.hash_get_all(RETRY_QUEUE_KEY).await? {
            let Ok(entry) = serde_json::from_value::<RetryEntry>(value) else { continue };
            let age_days = (now - entry.promoted_at).num_days();
            if entry.stored && age_days > self.pin_lifetime_days {
                self.coordination.hash_delete(RETRY_QUEUE_KEY, &field).await?;
                removed += 1;
            }
        }
        info!(removed, "purged stable retry-queue entries");
        Ok(removed)
    }

    /// Marks sync records older than `FAILED_DOC_STALENESS_DAYS` with no
    /// successful sync as permanently failed, so the worker stops retrying.
    pub async fn mark_stale_syncs_permanently_failed(&self, now: DateTime<Utc>) -> Result<usize, CoordinationError> {
        let mut marked = 0;
        for (field, value) in self.coordination.hash_get_all(SYNC_RECORDS_KEY).await? {
            let Ok(mut record) = serde_json::from_value::<SyncRecord>(value) else { continue };
            if record.synced || record.permanently_failed {
                continue;
            }
            let age_days = (now - record.first_attempt_at).num_days();
            if age_days > self.failed_staleness_days {
                record.permanently_failed = true;
                let value = serde_json::to_value(&record)
                    .map_err(|e| CoordinationError::OperationFailed(e.to_string()))?;
                self.coordination.hash_set(SYNC_RECORDS_KEY, &field, value).await?;
                marked += 1;
            }
        }
        info!(marked, "marked stale sync records permanently failed");
        Ok(marked)
    }

    pub async fn run(&self, now: DateTime<Utc>) -> Result<(usize, usize), CoordinationError> {
        let removed = self.purge_stable_retry_entries(now).await?;
        let marked = self.mark_stale_syncs_permanently_failed(now).await?;
        Ok((removed, marked))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pipeline_adapter_coordination::InMemoryCoordinationStore;

    #[tokio::test]
    async fn purges_stable_entries_past_pin_lifetime() {
        let coordination = Arc::new(InMemoryCoordinationStore::new());
        let now = Utc::now();
        coordination
            .hash_set(
                RETRY_QUEUE_KEY,
                "cid_old",
                serde_json::to_value(RetryEntry { promoted_at: now - Duration::days(40), stored: true }).unwrap(),
            )
            .await
            .unwrap();
        coordination
            .hash_set(
                RETRY_QUEUE_KEY,
                "cid_fresh",
                serde_json::to_value(RetryEntry { promoted_at: now - Duration::days(2), stored: true }).unwrap(),
            )
            .await
            .unwrap();

        let housekeeper = Housekeeper::new(coordination.clone(), 30, 7);
        let removed = housekeeper.purge_stable_retry_entries(now).await.unwrap();
        assert_eq!(removed, 1);
        assert!(coordination.hash_get(RETRY_QUEUE_KEY, "cid_fresh").await.unwrap().is_some());
        assert!(coordination.hash_get(RETRY_QUEUE_KEY, "cid_old").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn marks_stale_unsynced_records_permanently_failed() {
        let coordination = Arc::new(InMemoryCoordinationStore::new());
        let now = Utc::now();
        coordination
            .hash_set(
                SYNC_RECORDS_KEY,
                "doc_1",
                serde_json::to_value(SyncRecord { first_attempt_at: now - Duration::days(10), synced: false, permanently_failed: false })
                    .unwrap(),
            )
            .await
            .unwrap();

        let housekeeper = Housekeeper::new(coordination.clone(), 30, 7);
        let marked = housekeeper.mark_stale_syncs_permanently_failed(now).await.unwrap();
        assert_eq!(marked, 1);

        let updated: SyncRecord = serde_json::from_value(coordination.hash_get(SYNC_RECORDS_KEY, "doc_1").await.unwrap().unwrap()).unwrap();
        assert!(updated.permanently_failed);
    }

    #[tokio::test]
    async fn leaves_synced_records_alone() {
        let coordination = Arc::new(InMemoryCoordinationStore::new());
        let now = Utc::now();
        coordination
            .hash_set(
                SYNC_RECORDS_KEY,
                "doc_2",
                serde_json::to_value(SyncRecord { first_attempt_at: now - Duration::days(100), synced: true, permanently_failed: false })
                    .unwrap(),
            )
            .await
            .unwrap();

        let housekeeper = Housekeeper::new(coordination, 30, 7);
        let marked = housekeeper.mark_stale_syncs_permanently_failed(now).await.unwrap();
        assert_eq!(marked, 0);
    }
}
