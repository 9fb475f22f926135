//! Server configuration, loaded from environment variables at startup.

/// HTTP-surface configuration for patrol-server.
///
/// Every field has a default so the server works out of the box; the worker
/// and data-directory settings live in [`patrol_core::CoreConfig`] instead.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP address to bind (default: `"0.0.0.0:8900"`).
    pub bind_address: String,

    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,

    /// Comma-separated CORS origin allow-list; `None` means wildcard
    /// (development default — set `PATROL_CORS_ORIGINS` in production).
    pub cors_allowed_origins: Option<String>,

    /// Serve the OpenAPI document at `/api-docs/openapi.json`. On by
    /// default; disable with `PATROL_ENABLE_API_DOCS=false`.
    pub enable_api_docs: bool,
}

impl ServerConfig {
    /// Build [`ServerConfig`] from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        Self {
            bind_address: env_or("PATROL_BIND", "0.0.0.0:8900"),
            log_level: env_or("PATROL_LOG", "info"),
            log_json: env_bool("PATROL_LOG_JSON", false),
            cors_allowed_origins: std::env::var("PATROL_CORS_ORIGINS").ok(),
            enable_api_docs: env_bool("PATROL_ENABLE_API_DOCS", true),
        }
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}
