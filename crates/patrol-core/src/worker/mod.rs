//! Boundary to the patrol worker. The rest of the crate talks to
//! [`WorkerClient`] only; the concrete HTTP transport lives in [`http`].

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::logs::{LogEntry, LogKind};
use crate::runtime::types::{PatrolParams, PatrolResult, TaskStatus};

pub mod http;

pub use http::HttpWorker;

/// Classified failures of worker calls.
///
/// Transport-level problems (refused connections, timeouts, 5xx) collapse
/// into [`WorkerError::Unavailable`]; callers should treat that as "the
/// worker process is down or unreachable" and keep their own state intact.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("worker unavailable: {reason}")]
    Unavailable { reason: String },
    #[error("task not found on worker: {task_id}")]
    TaskNotFound { task_id: String },
    #[error("worker already has a patrol task running")]
    TaskAlreadyRunning,
    #[error("worker rejected the request: {detail}")]
    Rejected { detail: String },
    #[error("malformed worker response: {detail}")]
    Protocol { detail: String },
}

/// Acknowledgement returned by a successful start call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskHandle {
    pub task_id: String,
    /// Initial wire status, normally `pending`.
    pub status: String,
    /// Operator-facing acknowledgement message from the worker.
    pub message: String,
}

/// One task state observation as reported by the worker.
///
/// The status arrives as a flat string plus sibling fields (`result`,
/// `error_message`); [`TaskSnapshot::parsed_status`] folds them back into
/// the typed [`TaskStatus`]. Timestamps stay raw strings here because the
/// worker emits naive local ISO stamps without an offset.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskSnapshot {
    pub task_id: String,
    pub status: String,
    #[serde(default)]
    pub progress: f32,
    #[serde(default)]
    pub params: Option<PatrolParams>,
    #[serde(default)]
    pub result: Option<PatrolResult>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub completed_at: Option<String>,
}

impl TaskSnapshot {
    /// Typed status, or `None` for a status string this build does not know.
    /// Unknown statuses are skipped by the store rather than guessed at.
    pub fn parsed_status(&self) -> Option<TaskStatus> {
        match self.status.as_str() {
            "pending" => Some(TaskStatus::Pending),
            "running" => Some(TaskStatus::Running),
            "completed" => Some(TaskStatus::Completed {
                result: self.result.clone().unwrap_or_default(),
            }),
            "failed" => Some(TaskStatus::Failed {
                message: self
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "worker reported failure without a message".to_owned()),
            }),
            "cancelled" => Some(TaskStatus::Cancelled),
            other => {
                warn!(task_id = %self.task_id, status = %other, "unknown task status from worker");
                None
            }
        }
    }

    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        self.created_at.as_deref().and_then(parse_worker_timestamp)
    }

    pub fn started_at_utc(&self) -> Option<DateTime<Utc>> {
        self.started_at.as_deref().and_then(parse_worker_timestamp)
    }

    pub fn completed_at_utc(&self) -> Option<DateTime<Utc>> {
        self.completed_at.as_deref().and_then(parse_worker_timestamp)
    }
}

/// Parses worker timestamps, which may or may not carry a UTC offset.
/// Naive stamps are taken as UTC; unparseable ones yield `None` with a log
/// line instead of failing the whole snapshot.
pub(crate) fn parse_worker_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    warn!(timestamp = %raw, "unparseable worker timestamp");
    None
}

/// Raw per-task log line as the worker serializes it.
#[derive(Debug, Clone, Deserialize)]
pub struct RawLogEntry {
    pub id: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(rename = "type", alias = "level", default)]
    pub kind: Option<String>,
    pub message: String,
}

impl From<RawLogEntry> for LogEntry {
    fn from(raw: RawLogEntry) -> Self {
        let kind = raw
            .kind
            .as_deref()
            .map(LogKind::from_wire)
            .unwrap_or_else(|| LogKind::classify(&raw.message));
        LogEntry {
            id: raw.id,
            timestamp: raw
                .timestamp
                .as_deref()
                .and_then(parse_worker_timestamp)
                .unwrap_or_else(Utc::now),
            kind,
            message: raw.message,
        }
    }
}

/// USB automation device state as probed by the worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub connected: bool,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub device_type: Option<String>,
    pub status_message: String,
}

/// Catalog entry describing one marketplace the worker can patrol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformInfo {
    pub key: String,
    pub name: String,
    pub description: String,
    pub supported: bool,
}

/// Async client for the patrol worker.
///
/// Implementations must be safe to call concurrently; the orchestrator
/// shares one instance between the request path and the polling coordinator.
#[async_trait]
pub trait WorkerClient: Send + Sync {
    /// Submits a new patrol task.
    async fn start_patrol(&self, params: &PatrolParams) -> Result<TaskHandle, WorkerError>;

    /// Current state of one task.
    async fn get_status(&self, task_id: &str) -> Result<TaskSnapshot, WorkerError>;

    /// Most recent tasks known to the worker, newest first.
    async fn list_tasks(&self, limit: usize) -> Result<Vec<TaskSnapshot>, WorkerError>;

    /// Requests cooperative cancellation. The task stays non-terminal until
    /// a later snapshot confirms `cancelled` (or `completed`, if it raced).
    async fn cancel(&self, task_id: &str) -> Result<(), WorkerError>;

    /// Full log history of a task from sequence `since` onwards.
    async fn get_logs(&self, task_id: &str, since: usize) -> Result<Vec<LogEntry>, WorkerError>;

    /// Drains log lines emitted since the previous drain. Consume-once: a
    /// second call without new worker output returns an empty batch.
    async fn get_new_logs(&self, task_id: &str) -> Result<Vec<LogEntry>, WorkerError>;

    /// Marketplace catalog.
    async fn get_platforms(&self) -> Result<Vec<PlatformInfo>, WorkerError>;

    /// Probes the USB automation device.
    async fn get_device_status(&self) -> Result<DeviceStatus, WorkerError>;
}
