//! Whitelist (task matrix) endpoints.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::schemas::whitelist::{AddShopRequest, UpdateEntryRequest};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(
        get_whitelist, add_entry, update_entry, remove_entry,
        toggle_select, select_all, clear_all, add_shop, remove_shop
    ),
    components(schemas(UpdateEntryRequest, AddShopRequest))
)]
pub struct WhitelistApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/whitelist", get(get_whitelist).post(add_entry))
        .route("/whitelist/select-all", post(select_all))
        .route("/whitelist/clear-all", post(clear_all))
        .route("/whitelist/{id}", patch(update_entry).delete(remove_entry))
        .route("/whitelist/{id}/select", post(toggle_select))
        .route("/whitelist/{id}/shops", post(add_shop))
        .route("/whitelist/{id}/shops/{index}", delete(remove_shop))
}

#[utoipa::path(
    get,
    path = "/api/whitelist",
    tag = "whitelist",
    responses(
        (status = 200, description = "Entries in display order plus the selected ids", body = Value),
    )
)]
pub async fn get_whitelist(State(state): State<Arc<AppState>>) -> Json<Value> {
    let view = state.orchestrator.whitelist().view().await;
    Json(serde_json::to_value(view).unwrap_or(Value::Null))
}

#[utoipa::path(
    post,
    path = "/api/whitelist",
    tag = "whitelist",
    responses(
        (status = 200, description = "Fresh empty entry appended", body = Value),
    )
)]
pub async fn add_entry(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ServerError> {
    let entry = state.orchestrator.whitelist().add().await?;
    Ok(Json(serde_json::to_value(entry).unwrap_or(Value::Null)))
}

#[utoipa::path(
    patch,
    path = "/api/whitelist/{id}",
    tag = "whitelist",
    params(("id" = String, Path, description = "Entry to update")),
    request_body = UpdateEntryRequest,
    responses(
        (status = 200, description = "Updated entry", body = Value),
        (status = 404, description = "Entry not found"),
    )
)]
pub async fn update_entry(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<UpdateEntryRequest>,
) -> Result<Json<Value>, ServerError> {
    let entry = state
        .orchestrator
        .whitelist()
        .update_field(&id, body.field, body.value)
        .await?;
    Ok(Json(serde_json::to_value(entry).unwrap_or(Value::Null)))
}

#[utoipa::path(
    delete,
    path = "/api/whitelist/{id}",
    tag = "whitelist",
    params(("id" = String, Path, description = "Entry to remove")),
    responses(
        (status = 200, description = "Entry removed, selection cascaded", body = Value),
        (status = 404, description = "Entry not found"),
    )
)]
pub async fn remove_entry(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ServerError> {
    state.orchestrator.whitelist().remove(&id).await?;
    Ok(Json(json!({ "removed": id })))
}

#[utoipa::path(
    post,
    path = "/api/whitelist/{id}/select",
    tag = "whitelist",
    params(("id" = String, Path, description = "Entry whose selection to flip")),
    responses(
        (status = 200, description = "New selection state", body = Value),
        (status = 404, description = "Entry not found"),
    )
)]
pub async fn toggle_select(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ServerError> {
    let selected = state.orchestrator.whitelist().toggle_select(&id).await?;
    Ok(Json(json!({ "id": id, "selected": selected })))
}

#[utoipa::path(
    post,
    path = "/api/whitelist/select-all",
    tag = "whitelist",
    responses(
        (status = 200, description = "Every entry selected", body = Value),
    )
)]
pub async fn select_all(State(state): State<Arc<AppState>>) -> Json<Value> {
    let selected = state.orchestrator.whitelist().select_all().await;
    Json(json!({ "selected": selected }))
}

#[utoipa::path(
    post,
    path = "/api/whitelist/clear-all",
    tag = "whitelist",
    responses(
        (status = 200, description = "Selection emptied", body = Value),
    )
)]
pub async fn clear_all(State(state): State<Arc<AppState>>) -> Json<Value> {
    let deselected = state.orchestrator.whitelist().clear_selection().await;
    Json(json!({ "deselected": deselected }))
}

#[utoipa::path(
    post,
    path = "/api/whitelist/{id}/shops",
    tag = "whitelist",
    params(("id" = String, Path, description = "Entry to add an allowed shop to")),
    request_body = AddShopRequest,
    responses(
        (status = 200, description = "Whether the shop was added (blank input is ignored)", body = Value),
        (status = 404, description = "Entry not found"),
    )
)]
pub async fn add_shop(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<AddShopRequest>,
) -> Result<Json<Value>, ServerError> {
    let added = state
        .orchestrator
        .whitelist()
        .add_shop(&id, &body.shop)
        .await?;
    Ok(Json(json!({ "id": id, "added": added })))
}

#[utoipa::path(
    delete,
    path = "/api/whitelist/{id}/shops/{index}",
    tag = "whitelist",
    params(
        ("id" = String, Path, description = "Entry to remove an allowed shop from"),
        ("index" = usize, Path, description = "Position in the allowed-shop list"),
    ),
    responses(
        (status = 200, description = "Shop removed", body = Value),
        (status = 400, description = "Index out of range"),
        (status = 404, description = "Entry not found"),
    )
)]
pub async fn remove_shop(
    State(state): State<Arc<AppState>>,
    Path((id, index)): Path<(String, usize)>,
) -> Result<Json<Value>, ServerError> {
    state.orchestrator.whitelist().remove_shop(&id, index).await?;
    Ok(Json(json!({ "id": id, "removed_index": index })))
}
