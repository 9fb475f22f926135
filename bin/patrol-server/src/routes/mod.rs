//! Axum router construction.
//!
//! [`build`] assembles the complete application router: middleware layers
//! (CORS, per-request trace-id), the health route, the `/api` surface for
//! the GUI, and the OpenAPI document endpoint (disable with
//! `PATROL_ENABLE_API_DOCS=false`).

pub mod config_api;
pub mod devices;
pub mod doc;
pub mod exports;
pub mod health;
pub mod logs;
pub mod patrol;
pub mod reports;
pub mod whitelist;

use std::sync::Arc;

use axum::routing::get;
use axum::{middleware, Json, Router};
use tower::ServiceBuilder;

use crate::middleware::{cors, trace};
use crate::state::AppState;

/// Build the complete Axum [`Router`] for the application.
pub fn build(state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .merge(patrol::router())
        .merge(whitelist::router())
        .merge(devices::router())
        .merge(reports::router())
        .merge(exports::router())
        .merge(logs::router())
        .merge(config_api::router());

    let mut app = Router::new()
        .merge(health::router())
        .nest("/api", api_router);

    if state.config.enable_api_docs {
        app = app.route(
            "/api-docs/openapi.json",
            get(|| async { Json(doc::get_docs()) }),
        );
    }

    app
        // Outermost layers execute first on the way in.
        .layer(ServiceBuilder::new().layer(cors::cors_layer(state.clone())))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            trace::trace_middleware,
        ))
        .with_state(state)
}

// ── Tests ──────────────────────────────────────────────────────────────────────
