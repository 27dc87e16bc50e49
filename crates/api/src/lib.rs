//! Polyhouse API Server
//!
//! REST API for the temperature sensor, the relay control panel and the
//! readings dashboard.

use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use chrono::FixedOffset;
use control_engine::ControlEngine;
use controller::{LogNotifier, Services};
use data_validator::Validator;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use storage::{MemoryRepository, ReadingStore, RelayStore, SqliteRepository};
use tower_governor::GovernorLayer;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

pub mod error;
pub mod format;
pub mod rate_limit;
mod routes;
pub mod settings;

pub use settings::{AppConfig, ConfigError, LoggingConfig, StorageBackend};
pub use error::ApiError;
pub use rate_limit::{create_governor_config, DefaultGovernorConfig, RateLimitConfig};

/// Application state shared across handlers
pub struct AppState {
    /// Ingestion, query and relay services
    pub services: Services,
    /// Offset timestamps are rendered in
    pub offset: FixedOffset,
    /// Prometheus handle, when a recorder is installed
    pub metrics: Option<PrometheusHandle>,
    /// Version string
    pub version: String,
    /// Start time
    pub start_time: std::time::Instant,
}

impl AppState {
    /// Create new application state
    pub fn new(services: Services, offset: FixedOffset) -> Self {
        Self {
            services,
            offset,
            metrics: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: std::time::Instant::now(),
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

/// Create the application router.
///
/// With a governor config the ingest endpoint is rate limited per peer IP,
/// which needs the service built with connect info.
pub fn create_router(
    state: Arc<AppState>,
    governor: Option<Arc<DefaultGovernorConfig>>,
) -> Router {
    let ingest = match governor {
        Some(config) => post(routes::readings::ingest).layer(GovernorLayer { config }),
        None => post(routes::readings::ingest),
    };

    Router::new()
        .route("/", get(routes::system::root))
        .route("/health", get(routes::system::health))
        .route("/metrics", get(routes::system::metrics))
        .route(
            "/sensors/data",
            get(routes::readings::all_readings).merge(ingest),
        )
        .route("/sensors/latest", get(routes::readings::latest))
        .route("/sensors/control", get(routes::relays::list_relays))
        .route(
            "/sensors/control/:device",
            get(routes::relays::get_relay).post(routes::relays::set_relay),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Initialize logging
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let level = Level::from_str(&config.level)
        .with_context(|| format!("invalid log level '{}'", config.level))?;
    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true);

    let result = if config.json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };
    result.context("failed to set tracing subscriber")
}

/// Open the configured store, serve until shutdown, then close the store
pub async fn run_server(config: AppConfig) -> anyhow::Result<()> {
    let metrics = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install metrics recorder")?;

    match config.storage.backend {
        StorageBackend::Memory => {
            let repo = Arc::new(MemoryRepository::new());
            serve(&config, repo.clone(), repo, metrics).await
        }
        StorageBackend::Sqlite => {
            let repo = Arc::new(
                SqliteRepository::connect(
                    &config.storage.database_url,
                    config.storage.max_connections,
                )
                .await
                .context("failed to open database")?,
            );
            let result = serve(&config, repo.clone(), repo.clone(), metrics).await;
            repo.close().await;
            result
        }
    }
}

async fn serve(
    config: &AppConfig,
    readings: Arc<dyn ReadingStore>,
    relays: Arc<dyn RelayStore>,
    metrics: PrometheusHandle,
) -> anyhow::Result<()> {
    let engine = ControlEngine::new(config.control)?;
    let validator = Validator::new(config.validation.clone());
    let services = Services::new(readings, relays, engine, validator, Arc::new(LogNotifier));
    let state = AppState::new(services, config.display.offset()?).with_metrics(metrics);

    let mut app = create_router(
        Arc::new(state),
        create_governor_config(&config.rate_limit),
    );
    if config.server.cors_permissive {
        app = app.layer(CorsLayer::permissive());
    }

    info!("Starting API server on {}", config.server.bind_addr);
    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind_addr))?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("API server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
