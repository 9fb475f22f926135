//! Health / heartbeat endpoint.

use std::sync::Arc;

use axum::routing::get;
use axum::{extract::State, Json, Router};
use serde_json::{json, Value};
use utoipa::OpenApi;

use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(paths(get_health))]
pub struct HealthApi;

/// Register health-check routes.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(get_health))
}

/// Heartbeat endpoint.
///
/// Always returns HTTP 200; `worker` reports whether the patrol worker
/// answered a catalog probe, so monitoring can tell the two processes apart.
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Server is healthy", body = Value)
    )
)]
pub async fn get_health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let worker = if state.orchestrator.worker().get_platforms().await.is_ok() {
        "reachable"
    } else {
        "unreachable"
    };
    Json(json!({
        "status":  "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "worker":  worker,
    }))
}
