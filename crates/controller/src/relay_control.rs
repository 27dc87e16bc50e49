//! Manual relay commands

use crate::locks::DeviceLocks;
use crate::notify::{deliver, ChangeSource, Notifier, RelayChange};
use crate::{now_millis, ServiceError};
use data_validator::ValidationError;
use metrics::counter;
use serde::Deserialize;
use std::sync::Arc;
use storage::{RelayMode, RelayRecord, RelayState, RelayStore};
use tracing::{debug, info};

/// Body of a set-relay request; both fields are raw, unvalidated text
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RelayCommand {
    pub state: Option<String>,
    pub mode: Option<String>,
}

impl RelayCommand {
    pub fn manual(state: RelayState) -> Self {
        Self {
            state: Some(state.as_str().to_string()),
            mode: Some(RelayMode::Manual.as_str().to_string()),
        }
    }

    pub fn auto() -> Self {
        Self {
            state: None,
            mode: Some(RelayMode::Auto.as_str().to_string()),
        }
    }
}

/// Applies explicit commands to the relay store
pub struct RelayController {
    relays: Arc<dyn RelayStore>,
    locks: Arc<DeviceLocks>,
    notifier: Arc<dyn Notifier>,
}

impl RelayController {
    pub fn new(
        relays: Arc<dyn RelayStore>,
        locks: Arc<DeviceLocks>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            relays,
            locks,
            notifier,
        }
    }

    /// Set a relay.
    ///
    /// Mode defaults to MANUAL, which requires an ON/OFF state. AUTO keeps the
    /// currently stored state (OFF if none) until the next sample.
    pub async fn set_relay(
        &self,
        device: &str,
        command: &RelayCommand,
    ) -> Result<RelayRecord, ServiceError> {
        if device.trim().is_empty() {
            return Err(ValidationError::MissingField("device").into());
        }

        let mode = match command.mode.as_deref() {
            Some(raw) => raw.parse::<RelayMode>()?,
            None => RelayMode::Manual,
        };
        let requested = match mode {
            RelayMode::Manual => Some(
                command
                    .state
                    .as_deref()
                    .ok_or(ValidationError::MissingField("state"))?
                    .parse::<RelayState>()?,
            ),
            RelayMode::Auto => {
                if command.state.is_some() {
                    debug!("Ignoring explicit state for {} switched to AUTO", device);
                }
                None
            }
        };

        let (stored, previous) = {
            let _guard = self.locks.lock(device).await;
            let previous = self.relays.get(device).await?.map(|r| r.state).unwrap_or_default();
            let state = requested.unwrap_or(previous);
            let stored = self.relays.upsert(device, state, mode, now_millis()).await?;
            (stored, previous)
        };
        counter!("polyhouse_relay_updates_total", "device" => device.to_string(), "source" => "manual")
            .increment(1);
        info!("Relay {} set to {} ({})", device, stored.state, stored.mode);

        if previous != stored.state {
            let change = RelayChange {
                device: device.to_string(),
                previous,
                state: stored.state,
                mode: stored.mode,
                source: ChangeSource::Manual,
            };
            deliver(self.notifier.as_ref(), &change).await;
        }

        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::services;
    use crate::ChangeSource;

    fn command(state: Option<&str>, mode: Option<&str>) -> RelayCommand {
        RelayCommand {
            state: state.map(str::to_string),
            mode: mode.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_manual_set_is_idempotent() {
        let (services, repo, _notifier) = services();
        let cmd = RelayCommand::manual(RelayState::On);

        let first = services.relays.set_relay("exhaust", &cmd).await.unwrap();
        let second = services.relays.set_relay("exhaust", &cmd).await.unwrap();

        assert_eq!((first.state, first.mode), (second.state, second.mode));
        let stored = repo.list().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].state, RelayState::On);
        assert_eq!(stored[0].mode, RelayMode::Manual);
    }

    #[tokio::test]
    async fn test_mode_defaults_to_manual() {
        let (services, _repo, _notifier) = services();
        let record = services
            .relays
            .set_relay("sprinkler", &command(Some("on"), None))
            .await
            .unwrap();
        assert_eq!(record.state, RelayState::On);
        assert_eq!(record.mode, RelayMode::Manual);
    }

    #[tokio::test]
    async fn test_switch_to_auto_keeps_state() {
        let (services, _repo, _notifier) = services();
        services
            .relays
            .set_relay("exhaust", &RelayCommand::manual(RelayState::On))
            .await
            .unwrap();

        let record = services
            .relays
            .set_relay("exhaust", &RelayCommand::auto())
            .await
            .unwrap();
        assert_eq!(record.state, RelayState::On);
        assert_eq!(record.mode, RelayMode::Auto);
    }

    #[tokio::test]
    async fn test_auto_ignores_supplied_state() {
        let (services, _repo, _notifier) = services();
        let record = services
            .relays
            .set_relay("exhaust", &command(Some("ON"), Some("AUTO")))
            .await
            .unwrap();
        // Nothing stored before, so the default OFF is kept
        assert_eq!(record.state, RelayState::Off);
        assert_eq!(record.mode, RelayMode::Auto);
    }

    #[tokio::test]
    async fn test_rejects_bad_input_without_writing() {
        let (services, repo, _notifier) = services();

        let cases = [
            command(Some("DIM"), Some("MANUAL")),
            command(None, Some("MANUAL")),
            command(None, None),
            command(Some("ON"), Some("SEMI")),
        ];
        for cmd in &cases {
            let result = services.relays.set_relay("exhaust", cmd).await;
            assert!(
                matches!(result, Err(ServiceError::InvalidInput(_))),
                "{:?} should be rejected",
                cmd
            );
        }
        assert!(matches!(
            services.relays.set_relay(" ", &RelayCommand::auto()).await,
            Err(ServiceError::InvalidInput(_))
        ));

        assert!(repo.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_arbitrary_devices_are_stored() {
        let (services, _repo, notifier) = services();
        services
            .relays
            .set_relay("grow-light", &RelayCommand::manual(RelayState::On))
            .await
            .unwrap();

        let changes = notifier.take();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].device, "grow-light");
        assert_eq!(changes[0].previous, RelayState::Off);
        assert_eq!(changes[0].source, ChangeSource::Manual);
    }
}
