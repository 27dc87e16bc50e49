//! Relay Control Routes

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use controller::{RelayCommand, RelaySnapshot};
use serde::Serialize;
use std::sync::Arc;
use storage::{RelayMode, RelayState};

use crate::error::ApiError;
use crate::format::format_timestamp;
use crate::AppState;

/// Result of a set-relay command
#[derive(Debug, Serialize)]
pub struct RelayResponse {
    pub device: String,
    pub state: RelayState,
    pub mode: RelayMode,
}

/// Current relay state
#[derive(Debug, Serialize)]
pub struct RelayView {
    pub device: String,
    pub state: RelayState,
    pub mode: RelayMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl RelayView {
    fn new(snapshot: RelaySnapshot, state: &AppState) -> Self {
        Self {
            timestamp: snapshot
                .updated_at
                .map(|at| format_timestamp(at, &state.offset)),
            device: snapshot.device,
            state: snapshot.state,
            mode: snapshot.mode,
        }
    }
}

/// Switch a relay or hand it back to automatic control
pub async fn set_relay(
    State(state): State<Arc<AppState>>,
    Path(device): Path<String>,
    payload: Result<Json<RelayCommand>, JsonRejection>,
) -> Result<Json<RelayResponse>, ApiError> {
    let Json(command) = payload?;
    let record = state.services.relays.set_relay(&device, &command).await?;

    Ok(Json(RelayResponse {
        device: record.device,
        state: record.state,
        mode: record.mode,
    }))
}

/// Relay state, OFF/AUTO for devices never written
pub async fn get_relay(
    State(state): State<Arc<AppState>>,
    Path(device): Path<String>,
) -> Result<Json<RelayView>, ApiError> {
    let snapshot = state.services.query.relay_state(&device).await?;
    Ok(Json(RelayView::new(snapshot, &state)))
}

/// Every stored relay
pub async fn list_relays(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<RelayView>>, ApiError> {
    let records = state.services.query.relays().await?;
    Ok(Json(
        records
            .into_iter()
            .map(|r| RelayView::new(r.into(), &state))
            .collect(),
    ))
}
