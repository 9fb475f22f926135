//! Report ledger endpoints.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::Value;
use utoipa::OpenApi;

use crate::schemas::patrol::LimitQuery;
use crate::state::AppState;

const DEFAULT_REPORT_LIMIT: usize = 50;

#[derive(OpenApi)]
#[openapi(paths(list_reports, report_statistics))]
pub struct ReportsApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/reports", get(list_reports))
        .route("/reports/statistics", get(report_statistics))
}

#[utoipa::path(
    get,
    path = "/api/reports",
    tag = "reports",
    params(LimitQuery),
    responses(
        (status = 200, description = "Most recent takedown reports first", body = Value),
    )
)]
pub async fn list_reports(
    State(state): State<Arc<AppState>>,
    Query(q): Query<LimitQuery>,
) -> Json<Value> {
    let records = state
        .orchestrator
        .ledger()
        .recent(q.limit.unwrap_or(DEFAULT_REPORT_LIMIT))
        .await;
    Json(serde_json::to_value(records).unwrap_or(Value::Null))
}

#[utoipa::path(
    get,
    path = "/api/reports/statistics",
    tag = "reports",
    responses(
        (status = 200, description = "Aggregate counters over the ledger", body = Value),
    )
)]
pub async fn report_statistics(State(state): State<Arc<AppState>>) -> Json<Value> {
    let stats = state.orchestrator.ledger().statistics().await;
    Json(serde_json::to_value(stats).unwrap_or(Value::Null))
}
