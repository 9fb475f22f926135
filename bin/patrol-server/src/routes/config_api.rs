//! Worker-facing configuration endpoints: platform catalog and device probe.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::Value;
use utoipa::OpenApi;

use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(paths(get_platforms, get_device_status))]
pub struct ConfigApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/config/platforms", get(get_platforms))
        .route("/config/device/status", get(get_device_status))
}

#[utoipa::path(
    get,
    path = "/api/config/platforms",
    tag = "config",
    responses(
        (status = 200, description = "Marketplace catalog (built-in fallback when the worker is down)", body = Value),
    )
)]
pub async fn get_platforms(State(state): State<Arc<AppState>>) -> Json<Value> {
    let platforms = state.orchestrator.platform_catalog().await;
    Json(serde_json::to_value(platforms).unwrap_or(Value::Null))
}

#[utoipa::path(
    get,
    path = "/api/config/device/status",
    tag = "config",
    responses(
        (status = 200, description = "USB device probe result, merged into the fleet", body = Value),
    )
)]
pub async fn get_device_status(State(state): State<Arc<AppState>>) -> Json<Value> {
    let status = state.orchestrator.refresh_device_status().await;
    Json(serde_json::to_value(status).unwrap_or(Value::Null))
}
