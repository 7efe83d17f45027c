// GET/PUT handlers: version, status, store reads, settings

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::{Map, Value};

use super::AppState;
use crate::store::{CURRENT_PATH, TIMESERIES_PATH};
use crate::version::{NAME, VERSION};

type HandlerResult = Result<Json<Value>, (StatusCode, String)>;

fn internal(e: anyhow::Error) -> (StatusCode, String) {
    tracing::warn!(error = %e, "store read failed");
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

/// GET /version — returns service name and version (from Cargo.toml at build time).
pub(super) async fn version_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": NAME,
        "version": VERSION,
    }))
}

/// GET /api/status — worker counters.
pub(super) async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.status.to_json())
}

/// GET /api/current — last published device readings (empty object before the first cycle).
pub(super) async fn current_handler(State(state): State<AppState>) -> HandlerResult {
    let value = state.store.get(CURRENT_PATH).await.map_err(internal)?;
    Ok(Json(value.unwrap_or_else(|| Value::Object(Map::new()))))
}

/// GET /api/timeseries — every published point, device -> sensor -> bucket.
pub(super) async fn timeseries_handler(State(state): State<AppState>) -> HandlerResult {
    let value = state.store.get(TIMESERIES_PATH).await.map_err(internal)?;
    Ok(Json(value.unwrap_or_else(|| Value::Object(Map::new()))))
}

/// GET /api/timeseries/{device_id} — one device's series; 404 when nothing was published.
pub(super) async fn device_timeseries_handler(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> HandlerResult {
    let path = format!("{}/{}", TIMESERIES_PATH, device_id);
    match state.store.get(&path).await.map_err(internal)? {
        Some(v) => Ok(Json(v)),
        None => Err((StatusCode::NOT_FOUND, format!("no timeseries for {}", device_id))),
    }
}

/// GET /api/settings — stored settings as `{key: {name, value}}`.
pub(super) async fn settings_handler(State(state): State<AppState>) -> HandlerResult {
    let settings = state.store.fetch_settings().await.map_err(internal)?;
    let value = serde_json::to_value(settings)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(value))
}

/// PUT /api/settings — merges `{key: value}` or `{key: {name, value}}` into stored settings.
/// Picked up by the worker on the next settings refresh.
pub(super) async fn update_settings_handler(
    State(state): State<AppState>,
    Json(body): Json<Map<String, Value>>,
) -> Result<StatusCode, (StatusCode, String)> {
    if body.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "no settings given".into()));
    }
    state.store.update_settings(&body).await.map_err(internal)?;
    tracing::info!(keys = ?body.keys().collect::<Vec<_>>(), "settings updated over HTTP");
    Ok(StatusCode::NO_CONTENT)
}
