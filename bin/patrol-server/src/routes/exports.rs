//! Evidence export endpoints.
//!
//! All three run behind one busy gate; a second request while an export is
//! in flight gets HTTP 409 rather than queueing.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::schemas::exports::{DocumentExportRequest, ExportResponse};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(export_ledger, export_evidence, export_document),
    components(schemas(DocumentExportRequest, ExportResponse))
)]
pub struct ExportsApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/exports/ledger", post(export_ledger))
        .route("/exports/evidence", post(export_evidence))
        .route("/exports/document", post(export_document))
}

#[utoipa::path(
    post,
    path = "/api/exports/ledger",
    tag = "exports",
    responses(
        (status = 200, description = "Audit CSV written", body = ExportResponse),
        (status = 409, description = "Another export is in flight"),
    )
)]
pub async fn export_ledger(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ExportResponse>, ServerError> {
    let artifact = state.exporter.export_ledger().await?;
    Ok(Json(artifact.into()))
}

#[utoipa::path(
    post,
    path = "/api/exports/evidence",
    tag = "exports",
    responses(
        (status = 200, description = "Evidence ZIP written", body = ExportResponse),
        (status = 409, description = "Another export is in flight"),
    )
)]
pub async fn export_evidence(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ExportResponse>, ServerError> {
    let artifact = state.exporter.export_evidence().await?;
    Ok(Json(artifact.into()))
}

#[utoipa::path(
    post,
    path = "/api/exports/document",
    tag = "exports",
    request_body = DocumentExportRequest,
    responses(
        (status = 200, description = "PDF summary written", body = ExportResponse),
        (status = 409, description = "Another export is in flight"),
    )
)]
pub async fn export_document(
    State(state): State<Arc<AppState>>,
    Json(body): Json<DocumentExportRequest>,
) -> Result<Json<ExportResponse>, ServerError> {
    let artifact = state.exporter.export_document(body.report_type).await?;
    Ok(Json(artifact.into()))
}
