//! Device fleet endpoints.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::Value;
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(paths(list_devices, toggle_device))]
pub struct DevicesApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/devices", get(list_devices))
        .route("/devices/{id}/toggle", post(toggle_device))
}

#[utoipa::path(
    get,
    path = "/api/devices",
    tag = "devices",
    responses(
        (status = 200, description = "Known devices with online/selected state", body = Value),
    )
)]
pub async fn list_devices(State(state): State<Arc<AppState>>) -> Json<Value> {
    let devices = state.orchestrator.devices().list().await;
    Json(serde_json::to_value(devices).unwrap_or(Value::Null))
}

#[utoipa::path(
    post,
    path = "/api/devices/{id}/toggle",
    tag = "devices",
    params(("id" = String, Path, description = "Device whose selection to flip")),
    responses(
        (status = 200, description = "Updated device (offline devices are returned unchanged)", body = Value),
        (status = 404, description = "Device not found"),
    )
)]
pub async fn toggle_device(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ServerError> {
    let device = state.orchestrator.devices().toggle_select(&id).await?;
    Ok(Json(serde_json::to_value(device).unwrap_or(Value::Null)))
}
