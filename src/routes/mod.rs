// HTTP + WebSocket read side of the telemetry store

mod http;
mod ws;

use axum::{Router, routing::get};
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};

use crate::models::CycleOutput;
use crate::store::TelemetryStore;
use crate::worker::WorkerStatus;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) cycle_tx: broadcast::Sender<CycleOutput>,
    pub(crate) store: Arc<TelemetryStore>,
    pub(crate) status: Arc<WorkerStatus>,
}

pub fn app(
    cycle_tx: broadcast::Sender<CycleOutput>,
    store: Arc<TelemetryStore>,
    status: Arc<WorkerStatus>,
) -> Router {
    let state = AppState {
        cycle_tx,
        store,
        status,
    };
    Router::new()
        .route("/", get(|| async { "sensorpoll telemetry client" })) // GET /
        .route("/version", get(http::version_handler)) // GET /version
        .route("/api/status", get(http::status_handler)) // GET /api/status
        .route("/api/current", get(http::current_handler)) // GET /api/current
        .route("/api/timeseries", get(http::timeseries_handler)) // GET /api/timeseries
        .route(
            "/api/timeseries/{device_id}",
            get(http::device_timeseries_handler),
        ) // GET /api/timeseries/{device_id}
        .route(
            "/api/settings",
            get(http::settings_handler).put(http::update_settings_handler),
        ) // GET, PUT /api/settings
        .route("/ws/current", get(ws::ws_current)) // WS /ws/current
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}
