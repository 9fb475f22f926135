//! Core runtime configuration, sourced from `PATROL_*` environment
//! variables with sensible defaults for a local worker.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::runtime::coordinator::WatchConfig;

#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Base URL of the patrol worker's HTTP API.
    pub worker_base_url: String,
    /// Per-request timeout against the worker, in seconds.
    pub worker_timeout_secs: u64,
    /// Status/log poll cadence, in seconds.
    pub poll_interval_secs: u64,
    /// Client-side observation window for one task, in seconds.
    pub poll_timeout_secs: u64,
    /// How many recent tasks to merge back from worker history.
    pub history_limit: usize,
    /// Directory for persisted state (whitelist, report ledger).
    pub data_dir: PathBuf,
    /// Directory finished export artifacts land in.
    pub export_dir: PathBuf,
    /// Optional TTF font used for PDF rendering of CJK text.
    pub export_font: Option<PathBuf>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            worker_base_url: "http://127.0.0.1:8000".to_owned(),
            worker_timeout_secs: 30,
            poll_interval_secs: 2,
            poll_timeout_secs: 300,
            history_limit: 20,
            data_dir: PathBuf::from("./data"),
            export_dir: PathBuf::from("./exports"),
            export_font: None,
        }
    }
}

impl CoreConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            worker_base_url: env_or("PATROL_WORKER_URL", &defaults.worker_base_url),
            worker_timeout_secs: parse_env("PATROL_WORKER_TIMEOUT", defaults.worker_timeout_secs),
            poll_interval_secs: parse_env("PATROL_POLL_INTERVAL", defaults.poll_interval_secs),
            poll_timeout_secs: parse_env("PATROL_POLL_TIMEOUT", defaults.poll_timeout_secs),
            history_limit: parse_env("PATROL_HISTORY_LIMIT", defaults.history_limit),
            data_dir: PathBuf::from(env_or("PATROL_DATA_DIR", "./data")),
            export_dir: PathBuf::from(env_or("PATROL_EXPORT_DIR", "./exports")),
            export_font: std::env::var("PATROL_EXPORT_FONT").ok().map(PathBuf::from),
        }
    }

    pub fn worker_timeout(&self) -> Duration {
        Duration::from_secs(self.worker_timeout_secs)
    }

    pub fn watch_config(&self) -> WatchConfig {
        WatchConfig {
            interval: Duration::from_secs(self.poll_interval_secs.max(1)),
            timeout: Duration::from_secs(self.poll_timeout_secs.max(1)),
            history_limit: self.history_limit,
        }
    }

    pub fn whitelist_path(&self) -> PathBuf {
        self.data_dir.join("whitelist.json")
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join("report_history.json")
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn parse_env<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
