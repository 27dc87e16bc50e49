//! In-memory backend

use crate::model::{RelayMode, RelayRecord, RelayState, SampleId, TemperatureSample};
use crate::repository::{ReadingStore, RelayStore};
use crate::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use data_validator::{ensure_finite, TEMPERATURE_FIELD};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// Repository keeping everything in process memory
pub struct MemoryRepository {
    /// Samples in insertion order
    readings: Mutex<Vec<TemperatureSample>>,
    /// One record per device
    relays: Mutex<BTreeMap<String, RelayRecord>>,
    /// Next sample ID
    next_sample_id: Mutex<i64>,
}

impl MemoryRepository {
    /// Create a new in-memory repository
    pub fn new() -> Self {
        info!("Creating in-memory repository");
        Self {
            readings: Mutex::new(Vec::with_capacity(1024)),
            relays: Mutex::new(BTreeMap::new()),
            next_sample_id: Mutex::new(1),
        }
    }

    /// Clear all data (for testing)
    pub fn clear(&self) {
        if let Ok(mut readings) = self.readings.lock() {
            readings.clear();
        }
        if let Ok(mut relays) = self.relays.lock() {
            relays.clear();
        }
    }
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StorageError> {
    mutex
        .lock()
        .map_err(|e| StorageError::DatabaseError(format!("Lock error: {}", e)))
}

/// Newest first; later inserts win ties
fn newest_first(a: &TemperatureSample, b: &TemperatureSample) -> Ordering {
    b.recorded_at
        .cmp(&a.recorded_at)
        .then_with(|| b.id.cmp(&a.id))
}

#[async_trait]
impl ReadingStore for MemoryRepository {
    async fn record(&self, value: f64, at: DateTime<Utc>) -> Result<SampleId, StorageError> {
        ensure_finite(TEMPERATURE_FIELD, value)?;

        let mut readings = lock(&self.readings)?;
        let mut next = lock(&self.next_sample_id)?;

        let id = SampleId(*next);
        *next += 1;

        readings.push(TemperatureSample {
            id,
            value,
            recorded_at: at,
        });
        debug!("Inserted sample {} ({})", id, value);

        Ok(id)
    }

    async fn list_all(&self) -> Result<Vec<TemperatureSample>, StorageError> {
        let readings = lock(&self.readings)?;
        let mut all = readings.clone();
        all.sort_by(newest_first);
        Ok(all)
    }

    async fn latest(&self) -> Result<Option<TemperatureSample>, StorageError> {
        let readings = lock(&self.readings)?;
        Ok(readings.iter().min_by(|a, b| newest_first(a, b)).cloned())
    }

    async fn count(&self) -> Result<usize, StorageError> {
        Ok(lock(&self.readings)?.len())
    }
}

#[async_trait]
impl RelayStore for MemoryRepository {
    async fn get(&self, device: &str) -> Result<Option<RelayRecord>, StorageError> {
        Ok(lock(&self.relays)?.get(device).cloned())
    }

    async fn upsert(
        &self,
        device: &str,
        state: RelayState,
        mode: RelayMode,
        at: DateTime<Utc>,
    ) -> Result<RelayRecord, StorageError> {
        let record = RelayRecord {
            device: device.to_string(),
            state,
            mode,
            updated_at: at,
        };
        lock(&self.relays)?.insert(device.to_string(), record.clone());
        debug!("Upserted relay {} -> {}/{}", device, state, mode);
        Ok(record)
    }

    async fn list(&self) -> Result<Vec<RelayRecord>, StorageError> {
        Ok(lock(&self.relays)?.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[tokio::test]
    async fn test_poisoned_lock_is_a_database_error() {
        let repo = std::sync::Arc::new(MemoryRepository::new());
        let poisoner = repo.clone();
        let joined = std::thread::spawn(move || {
            let _readings = poisoner.readings.lock().unwrap();
            panic!("writer crashed mid-update");
        })
        .join();
        assert!(joined.is_err());

        assert!(matches!(
            repo.record(21.0, at(0)).await,
            Err(StorageError::DatabaseError(_))
        ));
        assert!(matches!(repo.latest().await, Err(StorageError::DatabaseError(_))));
        // Relays live behind their own lock
        assert!(repo.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sample_insert_and_retrieve() {
        let repo = MemoryRepository::new();

        let id = repo.record(24.5, at(0)).await.unwrap();
        assert_eq!(id, SampleId(1));

        let all = repo.list_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].value, 24.5);
        assert_eq!(all[0].recorded_at, at(0));
    }

    #[tokio::test]
    async fn test_list_is_newest_first() {
        let repo = MemoryRepository::new();
        repo.record(20.0, at(10)).await.unwrap();
        repo.record(21.0, at(30)).await.unwrap();
        // Clock went backwards
        repo.record(22.0, at(20)).await.unwrap();

        let values: Vec<f64> = repo.list_all().await.unwrap().iter().map(|s| s.value).collect();
        assert_eq!(values, vec![21.0, 22.0, 20.0]);
        assert_eq!(repo.latest().await.unwrap().unwrap().value, 21.0);
    }

    #[tokio::test]
    async fn test_equal_timestamps_prefer_later_insert() {
        let repo = MemoryRepository::new();
        repo.record(20.0, at(0)).await.unwrap();
        repo.record(21.0, at(0)).await.unwrap();

        assert_eq!(repo.latest().await.unwrap().unwrap().value, 21.0);
    }

    #[tokio::test]
    async fn test_latest_on_empty_store() {
        let repo = MemoryRepository::new();
        assert!(repo.latest().await.unwrap().is_none());
        assert_eq!(repo.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_rejects_non_finite_sample() {
        let repo = MemoryRepository::new();
        assert!(matches!(
            repo.record(f64::NAN, at(0)).await,
            Err(StorageError::Validation(_))
        ));
        assert!(repo.record(f64::INFINITY, at(0)).await.is_err());
        assert_eq!(repo.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_upsert_keeps_one_record_per_device() {
        let repo = MemoryRepository::new();
        repo.upsert("exhaust", RelayState::On, RelayMode::Auto, at(0))
            .await
            .unwrap();
        repo.upsert("exhaust", RelayState::Off, RelayMode::Manual, at(0) + Duration::seconds(5))
            .await
            .unwrap();

        let all = repo.list().await.unwrap();
        assert_eq!(all.len(), 1);
        let record = repo.get("exhaust").await.unwrap().unwrap();
        assert_eq!(record.state, RelayState::Off);
        assert_eq!(record.mode, RelayMode::Manual);
        assert_eq!(record.updated_at, at(5));
    }

    #[tokio::test]
    async fn test_last_writer_wins_regardless_of_timestamp() {
        let repo = MemoryRepository::new();
        repo.upsert("sprinkler", RelayState::On, RelayMode::Auto, at(100))
            .await
            .unwrap();
        repo.upsert("sprinkler", RelayState::Off, RelayMode::Auto, at(0))
            .await
            .unwrap();

        let record = repo.get("sprinkler").await.unwrap().unwrap();
        assert_eq!(record.state, RelayState::Off);
        assert_eq!(record.updated_at, at(0));
    }

    #[tokio::test]
    async fn test_missing_device_is_none() {
        let repo = MemoryRepository::new();
        assert!(repo.get("unknown-device").await.unwrap().is_none());
        assert!(repo.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear() {
        let repo = MemoryRepository::new();
        repo.record(20.0, at(0)).await.unwrap();
        repo.upsert("exhaust", RelayState::On, RelayMode::Auto, at(0))
            .await
            .unwrap();

        repo.clear();
        assert_eq!(repo.count().await.unwrap(), 0);
        assert!(repo.list().await.unwrap().is_empty());
    }
}
