//! Operator activity log endpoints.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use utoipa::OpenApi;

use crate::schemas::patrol::{LogEntryView, SinceQuery};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(paths(get_activity_log, clear_activity_log))]
pub struct LogsApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/logs", get(get_activity_log).delete(clear_activity_log))
}

#[utoipa::path(
    get,
    path = "/api/logs",
    tag = "logs",
    params(SinceQuery),
    responses(
        (status = 200, description = "Activity log entries from the given index onwards", body = [LogEntryView]),
    )
)]
pub async fn get_activity_log(
    State(state): State<Arc<AppState>>,
    Query(q): Query<SinceQuery>,
) -> Json<Vec<LogEntryView>> {
    let entries = state
        .orchestrator
        .activity()
        .snapshot_since(q.since.unwrap_or(0))
        .await;
    Json(entries.into_iter().map(LogEntryView::from).collect())
}

/// Clearing the log never touches task or whitelist state.
#[utoipa::path(
    delete,
    path = "/api/logs",
    tag = "logs",
    responses(
        (status = 200, description = "Activity log emptied", body = Value),
    )
)]
pub async fn clear_activity_log(State(state): State<Arc<AppState>>) -> Json<Value> {
    let cleared = state.orchestrator.activity().clear().await;
    Json(json!({ "cleared": cleared }))
}
