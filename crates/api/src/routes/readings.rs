//! Sensor Reading Routes

use axum::{extract::rejection::JsonRejection, extract::State, Json};
use controller::RelayStatus;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use storage::TemperatureSample;

use crate::error::ApiError;
use crate::format::format_timestamp;
use crate::AppState;

/// Response to an ingested sample
#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub temperature: f64,
    pub exhaust: RelayStatus,
    pub sprinkler: RelayStatus,
}

/// One stored reading
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingView {
    #[serde(rename = "_id")]
    pub id: String,
    pub water_temperature: f64,
    pub timestamp: String,
}

/// Latest reading; all fields null when nothing was recorded yet
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestReadingResponse {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub water_temperature: Option<f64>,
    pub timestamp: Option<String>,
}

impl ReadingView {
    fn new(sample: &TemperatureSample, state: &AppState) -> Self {
        Self {
            id: sample.id.to_string(),
            water_temperature: sample.value,
            timestamp: format_timestamp(sample.recorded_at, &state.offset),
        }
    }
}

/// Receive a temperature sample from the sensor
pub async fn ingest(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<IngestResponse>, ApiError> {
    let Json(body) = payload?;
    let outcome = state
        .services
        .ingestion
        .ingest(body.get("temperature"))
        .await?;

    Ok(Json(IngestResponse {
        temperature: outcome.sample.value,
        exhaust: outcome.exhaust,
        sprinkler: outcome.sprinkler,
    }))
}

/// All readings, most recent first
pub async fn all_readings(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ReadingView>>, ApiError> {
    let samples = state.services.query.all_readings().await?;
    Ok(Json(
        samples
            .iter()
            .map(|s| ReadingView::new(s, &state))
            .collect(),
    ))
}

/// Most recent reading
pub async fn latest(
    State(state): State<Arc<AppState>>,
) -> Result<Json<LatestReadingResponse>, ApiError> {
    let response = match state.services.query.latest_reading().await? {
        Some(sample) => {
            let view = ReadingView::new(&sample, &state);
            LatestReadingResponse {
                id: Some(view.id),
                water_temperature: Some(view.water_temperature),
                timestamp: Some(view.timestamp),
            }
        }
        None => LatestReadingResponse {
            id: None,
            water_temperature: None,
            timestamp: None,
        },
    };
    Ok(Json(response))
}
