//! Polyhouse Controller
//!
//! The unit-of-work layer between transport and storage:
//! - Ingestion pipeline (validate, store sample, evaluate, apply to AUTO relays)
//! - Manual relay control
//! - Read-only queries with default relay fallback
//!
//! Relay read-decide-write sequences are serialized per device.

mod error;
mod locks;
mod notify;
mod pipeline;
mod query;
mod relay_control;

pub use error::ServiceError;
pub use locks::{DeviceGuard, DeviceLocks};
pub use notify::{ChangeSource, LogNotifier, Notifier, NotifyError, RelayChange};
pub use pipeline::{IngestOutcome, IngestionPipeline, RelayStatus};
pub use query::{QueryService, RelaySnapshot};
pub use relay_control::{RelayCommand, RelayController};

use chrono::{DateTime, SubsecRound, Utc};
use control_engine::ControlEngine;
use data_validator::Validator;
use std::sync::Arc;
use storage::{ReadingStore, RelayStore};

/// Current instant at the millisecond precision the stores keep
pub(crate) fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// All services wired to the same stores and device locks
pub struct Services {
    pub ingestion: IngestionPipeline,
    pub query: QueryService,
    pub relays: RelayController,
}

impl Services {
    pub fn new(
        readings: Arc<dyn ReadingStore>,
        relays: Arc<dyn RelayStore>,
        engine: ControlEngine,
        validator: Validator,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let locks = Arc::new(DeviceLocks::new());
        Self {
            ingestion: IngestionPipeline::new(
                readings.clone(),
                relays.clone(),
                engine,
                validator,
                locks.clone(),
                notifier.clone(),
            ),
            query: QueryService::new(readings, relays.clone()),
            relays: RelayController::new(relays, locks, notifier),
        }
    }

    /// In-memory stores, default rules, log notifications
    pub fn in_memory() -> Self {
        let repo = Arc::new(storage::MemoryRepository::new());
        Self::new(
            repo.clone(),
            repo,
            ControlEngine::default(),
            Validator::default(),
            Arc::new(LogNotifier),
        )
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Collects every delivered change
    #[derive(Default)]
    pub struct RecordingNotifier {
        pub changes: Mutex<Vec<RelayChange>>,
    }

    impl RecordingNotifier {
        pub fn take(&self) -> Vec<RelayChange> {
            std::mem::take(&mut *self.changes.lock().unwrap())
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn relay_changed(&self, change: &RelayChange) -> Result<(), NotifyError> {
            self.changes.lock().unwrap().push(change.clone());
            Ok(())
        }
    }

    /// Services over a shared memory repository plus a recording notifier
    pub fn services() -> (Services, Arc<storage::MemoryRepository>, Arc<RecordingNotifier>) {
        let repo = Arc::new(storage::MemoryRepository::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let services = Services::new(
            repo.clone(),
            repo.clone(),
            ControlEngine::default(),
            Validator::default(),
            notifier.clone(),
        );
        (services, repo, notifier)
    }
}
