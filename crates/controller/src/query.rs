//! Read paths over both stores

use crate::ServiceError;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use storage::{ReadingStore, RelayMode, RelayRecord, RelayState, RelayStore, TemperatureSample};

/// Relay state as seen by a reader, with defaults for unknown devices
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaySnapshot {
    pub device: String,
    pub state: RelayState,
    pub mode: RelayMode,
    /// `None` when the device has never been written
    pub updated_at: Option<DateTime<Utc>>,
}

impl RelaySnapshot {
    /// OFF / AUTO, not backed by any record
    pub fn default_for(device: &str) -> Self {
        Self {
            device: device.to_string(),
            state: RelayState::default(),
            mode: RelayMode::default(),
            updated_at: None,
        }
    }
}

impl From<RelayRecord> for RelaySnapshot {
    fn from(record: RelayRecord) -> Self {
        Self {
            device: record.device,
            state: record.state,
            mode: record.mode,
            updated_at: Some(record.updated_at),
        }
    }
}

/// Side-effect free queries
pub struct QueryService {
    readings: Arc<dyn ReadingStore>,
    relays: Arc<dyn RelayStore>,
}

impl QueryService {
    pub fn new(readings: Arc<dyn ReadingStore>, relays: Arc<dyn RelayStore>) -> Self {
        Self { readings, relays }
    }

    pub async fn latest_reading(&self) -> Result<Option<TemperatureSample>, ServiceError> {
        Ok(self.readings.latest().await?)
    }

    /// Most recent first
    pub async fn all_readings(&self) -> Result<Vec<TemperatureSample>, ServiceError> {
        Ok(self.readings.list_all().await?)
    }

    pub async fn reading_count(&self) -> Result<usize, ServiceError> {
        Ok(self.readings.count().await?)
    }

    /// Stored record, or OFF/AUTO for a device never written. Never creates a record.
    pub async fn relay_state(&self, device: &str) -> Result<RelaySnapshot, ServiceError> {
        Ok(self
            .relays
            .get(device)
            .await?
            .map(RelaySnapshot::from)
            .unwrap_or_else(|| RelaySnapshot::default_for(device)))
    }

    /// Every stored relay record
    pub async fn relays(&self) -> Result<Vec<RelayRecord>, ServiceError> {
        Ok(self.relays.list().await?)
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::services;
    use serde_json::json;
    use storage::{RelayMode, RelayState};

    #[tokio::test]
    async fn test_unknown_device_defaults_without_creating_record() {
        let (services, _repo, _notifier) = services();

        let snapshot = services.query.relay_state("unknown-device").await.unwrap();
        assert_eq!(snapshot.device, "unknown-device");
        assert_eq!(snapshot.state, RelayState::Off);
        assert_eq!(snapshot.mode, RelayMode::Auto);
        assert!(snapshot.updated_at.is_none());

        assert!(services.query.relays().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_store_has_no_latest() {
        let (services, _repo, _notifier) = services();
        assert!(services.query.latest_reading().await.unwrap().is_none());
        assert!(services.query.all_readings().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_readings_are_newest_first() {
        let (services, _repo, _notifier) = services();
        for t in [21.0, 22.5, 24.0] {
            services.ingestion.ingest(Some(&json!(t))).await.unwrap();
        }

        let values: Vec<f64> = services
            .query
            .all_readings()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.value)
            .collect();
        assert_eq!(values, vec![24.0, 22.5, 21.0]);
        assert_eq!(services.query.reading_count().await.unwrap(), 3);
    }
}
