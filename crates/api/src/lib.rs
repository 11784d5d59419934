//! Segment Detection API Server
//!
//! HTTP surface over the segment detection engine.

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use sample_source::{MemorySource, SampleSource};
use segment_engine::{Mechanism, SegmentService, SystemClock};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;

pub mod error;
mod routes;
pub mod settings;
pub mod telemetry;

pub use error::ApiError;
pub use settings::Settings;
pub use telemetry::{init_logging, MetricsObserver};

/// Application state shared across handlers
pub struct AppState {
    pub service: SegmentService,
    /// Renders `/metrics`; absent when no recorder is installed
    pub metrics: Option<PrometheusHandle>,
    pub request_timeout: Duration,
    pub version: String,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(service: SegmentService, metrics: Option<PrometheusHandle>, request_timeout: Duration) -> Self {
        Self {
            service,
            metrics,
            request_timeout,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: Instant::now(),
        }
    }
}

/// Health response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: i64,
    pub version: String,
    pub uptime_seconds: u64,
    pub mechanisms: Vec<Mechanism>,
}

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/health", get(health_handler))
        .route("/api/v1/segments", get(routes::segments::get_segments))
        .route("/metrics", get(metrics_handler))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// Health check handler
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().timestamp(),
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        mechanisms: Mechanism::ALL.to_vec(),
    })
}

/// Prometheus text exposition
async fn metrics_handler(State(state): State<Arc<AppState>>) -> String {
    state.metrics.as_ref().map(|h| h.render()).unwrap_or_default()
}

/// Build the sample source the settings ask for
async fn open_source(settings: &Settings) -> anyhow::Result<Arc<dyn SampleSource>> {
    match &settings.fixture_path {
        Some(path) => Ok(Arc::new(MemorySource::from_json_file(path).await?)),
        None => {
            info!("No fixture configured, serving an empty source");
            Ok(Arc::new(MemorySource::new()))
        }
    }
}

/// Run the server until it fails
pub async fn run_server(settings: Settings) -> anyhow::Result<()> {
    let source = open_source(&settings).await?;
    let handle = telemetry::install_recorder()?;
    let service = SegmentService::with_observer(source, Arc::new(SystemClock), Arc::new(MetricsObserver));
    let state = Arc::new(AppState::new(service, Some(handle), settings.request_timeout()));
    let app = create_router(state);

    info!("Starting API server on {}", settings.bind_address);

    let listener = tokio::net::TcpListener::bind(&settings.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
