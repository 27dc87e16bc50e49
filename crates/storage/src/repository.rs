//! Store interfaces

use crate::model::{RelayMode, RelayRecord, RelayState, SampleId, TemperatureSample};
use crate::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Append-only log of temperature samples
#[async_trait]
pub trait ReadingStore: Send + Sync {
    /// Append a sample. Non-finite values are rejected.
    async fn record(&self, value: f64, at: DateTime<Utc>) -> Result<SampleId, StorageError>;

    /// All samples, most recent first
    async fn list_all(&self) -> Result<Vec<TemperatureSample>, StorageError>;

    /// Most recent sample, `None` when the log is empty
    async fn latest(&self) -> Result<Option<TemperatureSample>, StorageError>;

    async fn count(&self) -> Result<usize, StorageError>;
}

/// Latest-state table keyed by device
#[async_trait]
pub trait RelayStore: Send + Sync {
    async fn get(&self, device: &str) -> Result<Option<RelayRecord>, StorageError>;

    /// Replace the whole record for `device` in one step
    async fn upsert(
        &self,
        device: &str,
        state: RelayState,
        mode: RelayMode,
        at: DateTime<Utc>,
    ) -> Result<RelayRecord, StorageError>;

    /// Every stored record, ordered by device name
    async fn list(&self) -> Result<Vec<RelayRecord>, StorageError>;
}
