//! Sample ingestion: validate, persist, evaluate, apply

use crate::locks::DeviceLocks;
use crate::notify::{deliver, ChangeSource, Notifier, RelayChange};
use crate::{now_millis, ServiceError};
use chrono::{DateTime, Utc};
use control_engine::{ControlEngine, ControlTarget, CurrentRelays, EXHAUST, SPRINKLER};
use data_validator::Validator;
use metrics::counter;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use storage::{ReadingStore, RelayMode, RelayRecord, RelayState, RelayStore, TemperatureSample};
use tracing::{debug, error, info};

/// State and mode of one actuator as reported to the sensor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RelayStatus {
    pub state: RelayState,
    pub mode: RelayMode,
}

impl From<Option<&RelayRecord>> for RelayStatus {
    fn from(record: Option<&RelayRecord>) -> Self {
        record
            .map(|r| RelayStatus {
                state: r.state,
                mode: r.mode,
            })
            .unwrap_or_default()
    }
}

/// Result of one successful ingestion
#[derive(Debug, Clone, PartialEq)]
pub struct IngestOutcome {
    pub sample: TemperatureSample,
    pub exhaust: RelayStatus,
    pub sprinkler: RelayStatus,
}

/// Turns raw sensor samples into stored readings and relay states
pub struct IngestionPipeline {
    readings: Arc<dyn ReadingStore>,
    relays: Arc<dyn RelayStore>,
    engine: ControlEngine,
    validator: Validator,
    locks: Arc<DeviceLocks>,
    notifier: Arc<dyn Notifier>,
}

impl IngestionPipeline {
    pub fn new(
        readings: Arc<dyn ReadingStore>,
        relays: Arc<dyn RelayStore>,
        engine: ControlEngine,
        validator: Validator,
        locks: Arc<DeviceLocks>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            readings,
            relays,
            engine,
            validator,
            locks,
            notifier,
        }
    }

    /// Ingest one raw temperature.
    ///
    /// Invalid input is rejected before anything is written. If the relay
    /// phase fails the sample stays stored and the error is still returned.
    pub async fn ingest(&self, raw: Option<&Value>) -> Result<IngestOutcome, ServiceError> {
        let result = self.run(raw).await;
        if let Err(e) = &result {
            counter!("polyhouse_ingest_failures_total", "kind" => e.kind()).increment(1);
        }
        result
    }

    async fn run(&self, raw: Option<&Value>) -> Result<IngestOutcome, ServiceError> {
        let temperature = self.validator.parse_temperature(raw)?;

        let mut changes = Vec::new();
        let result = {
            // Held from the timestamp onwards so relay updatedAt never goes backwards
            let _guard = self.locks.lock_many(&[EXHAUST, SPRINKLER]).await;
            let at = now_millis();

            let id = self.readings.record(temperature, at).await?;
            counter!("polyhouse_readings_ingested_total").increment(1);
            debug!("Stored sample {} = {}", id, temperature);

            let sample = TemperatureSample {
                id,
                value: temperature,
                recorded_at: at,
            };
            match self.apply_controls(temperature, at, &mut changes).await {
                Ok((exhaust, sprinkler)) => Ok(IngestOutcome {
                    sample,
                    exhaust,
                    sprinkler,
                }),
                Err(e) => {
                    error!("Sample {} stored but relay update failed: {}", id, e);
                    Err(e)
                }
            }
        };

        // Committed writes are announced even when a later one failed
        for change in &changes {
            info!("Auto control switched {} {} -> {}", change.device, change.previous, change.state);
            deliver(self.notifier.as_ref(), change).await;
        }

        result
    }

    /// Read, evaluate and write both relays. Caller holds their locks.
    async fn apply_controls(
        &self,
        temperature: f64,
        at: DateTime<Utc>,
        changes: &mut Vec<RelayChange>,
    ) -> Result<(RelayStatus, RelayStatus), ServiceError> {
        let current = CurrentRelays {
            exhaust: self.relays.get(EXHAUST).await?,
            sprinkler: self.relays.get(SPRINKLER).await?,
        };
        let evaluation = self.engine.evaluate(temperature, &current);

        let mut exhaust = RelayStatus::from(current.exhaust.as_ref());
        let mut sprinkler = RelayStatus::from(current.sprinkler.as_ref());

        for (target, state) in evaluation.updates {
            let device = target.device();
            let previous = current.state(target);
            let stored = self.relays.upsert(device, state, RelayMode::Auto, at).await?;
            counter!("polyhouse_relay_updates_total", "device" => device, "source" => "auto")
                .increment(1);

            if previous != stored.state {
                changes.push(RelayChange {
                    device: device.to_string(),
                    previous,
                    state: stored.state,
                    mode: stored.mode,
                    source: ChangeSource::Automatic,
                });
            }

            let status = RelayStatus::from(Some(&stored));
            match target {
                ControlTarget::Exhaust => exhaust = status,
                ControlTarget::Sprinkler => sprinkler = status,
            }
        }

        Ok((exhaust, sprinkler))
    }
}
