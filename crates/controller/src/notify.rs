//! Outbound relay change notifications

use async_trait::async_trait;
use storage::{RelayMode, RelayState};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
#[error("Notification failed: {0}")]
pub struct NotifyError(pub String);

/// What triggered a relay write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeSource {
    /// Control engine, on an ingested sample
    Automatic,
    /// Explicit command
    Manual,
}

impl ChangeSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeSource::Automatic => "auto",
            ChangeSource::Manual => "manual",
        }
    }
}

/// A relay whose stored state actually changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayChange {
    pub device: String,
    pub previous: RelayState,
    pub state: RelayState,
    pub mode: RelayMode,
    pub source: ChangeSource,
}

/// Best-effort delivery channel. Errors are logged by the caller and dropped.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn relay_changed(&self, change: &RelayChange) -> Result<(), NotifyError>;
}

/// Writes changes to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn relay_changed(&self, change: &RelayChange) -> Result<(), NotifyError> {
        info!(
            "Relay {} turned {} ({}, {})",
            change.device,
            change.state,
            change.mode,
            change.source.as_str()
        );
        Ok(())
    }
}

/// Deliver a change, logging and swallowing failures
pub(crate) async fn deliver(notifier: &dyn Notifier, change: &RelayChange) {
    if let Err(e) = notifier.relay_changed(change).await {
        warn!("Dropping notification for {}: {}", change.device, e);
    }
}
