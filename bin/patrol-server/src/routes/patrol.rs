//! Patrol task endpoints: start, history, snapshot, cancel, per-task logs.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::json;
use utoipa::OpenApi;
use validator::Validate;

use patrol_core::StartRequest;

use crate::error::ServerError;
use crate::schemas::patrol::{
    LimitQuery, LogEntryView, SinceQuery, StartPatrolRequest, StartPatrolResponse, TaskView,
};
use crate::state::AppState;

const DEFAULT_HISTORY_LIMIT: usize = 20;

#[derive(OpenApi)]
#[openapi(
    paths(start_patrol, list_tasks, get_task, cancel_task, get_task_logs, get_new_task_logs),
    components(schemas(StartPatrolRequest, StartPatrolResponse, TaskView, LogEntryView))
)]
pub struct PatrolApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/patrol/start", post(start_patrol))
        .route("/patrol", get(list_tasks))
        .route("/patrol/{task_id}", get(get_task))
        .route("/patrol/{task_id}", delete(cancel_task))
        .route("/patrol/{task_id}/logs", get(get_task_logs))
        .route("/patrol/{task_id}/logs/new", get(get_new_task_logs))
}

#[utoipa::path(
    post,
    path = "/api/patrol/start",
    tag = "patrol",
    request_body = StartPatrolRequest,
    responses(
        (status = 200, description = "Patrol task started", body = StartPatrolResponse),
        (status = 400, description = "Launch precondition failed"),
        (status = 409, description = "A patrol task is already running"),
        (status = 502, description = "Worker unreachable"),
    )
)]
pub async fn start_patrol(
    State(state): State<Arc<AppState>>,
    Json(body): Json<StartPatrolRequest>,
) -> Result<Json<StartPatrolResponse>, ServerError> {
    body.validate()
        .map_err(|e| ServerError::BadRequest(e.to_string()))?;
    let handle = state
        .orchestrator
        .start_patrol(StartRequest {
            platform: body.platform,
            keyword: body.keyword,
            max_items: body.max_items,
            test_mode: body.test_mode,
            device_id: body.device_id,
        })
        .await?;
    Ok(Json(handle.into()))
}

#[utoipa::path(
    get,
    path = "/api/patrol",
    tag = "patrol",
    params(LimitQuery),
    responses(
        (status = 200, description = "Most recent tasks first", body = [TaskView]),
    )
)]
pub async fn list_tasks(
    State(state): State<Arc<AppState>>,
    Query(q): Query<LimitQuery>,
) -> Json<Vec<TaskView>> {
    let tasks = state
        .orchestrator
        .store()
        .recent(q.limit.unwrap_or(DEFAULT_HISTORY_LIMIT))
        .await;
    Json(tasks.into_iter().map(TaskView::from).collect())
}

#[utoipa::path(
    get,
    path = "/api/patrol/{task_id}",
    tag = "patrol",
    params(("task_id" = String, Path, description = "Task to retrieve")),
    responses(
        (status = 200, description = "Stored task snapshot", body = TaskView),
        (status = 404, description = "Task not found"),
    )
)]
pub async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskView>, ServerError> {
    let task = state
        .orchestrator
        .store()
        .get(&task_id)
        .await
        .ok_or_else(|| ServerError::NotFound(format!("task {task_id} not found")))?;
    Ok(Json(task.into()))
}

#[utoipa::path(
    delete,
    path = "/api/patrol/{task_id}",
    tag = "patrol",
    params(("task_id" = String, Path, description = "Task to cancel")),
    responses(
        (status = 200, description = "Cancellation requested", body = serde_json::Value),
        (status = 400, description = "Task already terminal"),
        (status = 404, description = "Task not found"),
    )
)]
pub async fn cancel_task(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<Json<serde_json::Value>, ServerError> {
    state.orchestrator.cancel(&task_id).await?;
    // The status stays non-terminal until the worker confirms; the GUI keeps
    // polling the task until it reports cancelled (or completed, if it raced).
    Ok(Json(json!({ "task_id": task_id, "status": "cancelling" })))
}

#[utoipa::path(
    get,
    path = "/api/patrol/{task_id}/logs",
    tag = "patrol",
    params(
        ("task_id" = String, Path, description = "Task whose logs to read"),
        SinceQuery,
    ),
    responses(
        (status = 200, description = "Log entries from the given index onwards", body = [LogEntryView]),
        (status = 404, description = "Task not found"),
    )
)]
pub async fn get_task_logs(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
    Query(q): Query<SinceQuery>,
) -> Result<Json<Vec<LogEntryView>>, ServerError> {
    let store = state.orchestrator.store();
    if store.get(&task_id).await.is_none() {
        return Err(ServerError::NotFound(format!("task {task_id} not found")));
    }
    let entries = store.logs_since(&task_id, q.since.unwrap_or(0)).await;
    Ok(Json(entries.into_iter().map(LogEntryView::from).collect()))
}

#[utoipa::path(
    get,
    path = "/api/patrol/{task_id}/logs/new",
    tag = "patrol",
    params(("task_id" = String, Path, description = "Task whose new logs to drain")),
    responses(
        (status = 200, description = "Entries appended since the previous drain (consume-once)", body = [LogEntryView]),
        (status = 404, description = "Task not found"),
    )
)]
pub async fn get_new_task_logs(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<Json<Vec<LogEntryView>>, ServerError> {
    let store = state.orchestrator.store();
    if store.get(&task_id).await.is_none() {
        return Err(ServerError::NotFound(format!("task {task_id} not found")));
    }
    let entries = store.take_new_logs(&task_id).await;
    Ok(Json(entries.into_iter().map(LogEntryView::from).collect()))
}
