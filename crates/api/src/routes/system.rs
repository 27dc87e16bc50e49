//! Service Status Routes

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::AppState;

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub uptime_seconds: u64,
    pub components: ComponentStatus,
    pub metrics: StoreMetrics,
}

/// Component status
#[derive(Debug, Serialize)]
pub struct ComponentStatus {
    pub database: ComponentHealth,
}

/// Individual component health
#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Stored volume
#[derive(Debug, Serialize)]
pub struct StoreMetrics {
    pub reading_count: usize,
    pub relay_count: usize,
}

/// Liveness banner
pub async fn root() -> Json<Value> {
    Json(json!({ "message": "Polyhouse Temperature Monitoring API is running" }))
}

/// Health check handler
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let query = &state.services.query;
    let counts = match (query.reading_count().await, query.relays().await) {
        (Ok(readings), Ok(relays)) => Ok((readings, relays.len())),
        (Err(e), _) | (_, Err(e)) => Err(e.to_string()),
    };

    let (status, database, metrics) = match counts {
        Ok((reading_count, relay_count)) => (
            "healthy",
            ComponentHealth {
                status: "ok".to_string(),
                error: None,
            },
            StoreMetrics {
                reading_count,
                relay_count,
            },
        ),
        Err(e) => (
            "degraded",
            ComponentHealth {
                status: "error".to_string(),
                error: Some(e),
            },
            StoreMetrics {
                reading_count: 0,
                relay_count: 0,
            },
        ),
    };

    let code = if status == "healthy" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: status.to_string(),
        timestamp,
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        components: ComponentStatus { database },
        metrics,
    };

    (code, Json(response))
}

/// Prometheus exposition
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (
            StatusCode::NOT_FOUND,
            "metrics recorder not installed".to_string(),
        ),
    }
}
