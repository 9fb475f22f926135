//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use patrol_core::Orchestrator;
use patrol_export::Exporter;

use crate::config::ServerConfig;

/// State shared across all HTTP handlers.
///
/// The orchestrator owns the task store, whitelist, device fleet, activity
/// log and report ledger; the exporter shares the ledger and activity log
/// handles with it. Handlers never hold their own mutable state.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration (env-derived).
    pub config: Arc<ServerConfig>,
    /// Patrol session: tasks, whitelist, devices, logs, ledger.
    pub orchestrator: Arc<Orchestrator>,
    /// Evidence export pipeline.
    pub exporter: Arc<Exporter>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
