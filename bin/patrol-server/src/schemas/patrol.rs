//! Wire schemas for the patrol task endpoints.

use chrono::{DateTime, Utc};
use patrol_core::worker::TaskHandle;
use patrol_core::{LogEntry, PatrolTask, Platform};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

/// Body of `POST /api/patrol/start`. The keyword is optional; when absent
/// the first selected whitelist row's product name is used.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct StartPatrolRequest {
    #[schema(value_type = String, example = "xianyu")]
    pub platform: Platform,
    pub keyword: Option<String>,
    #[serde(default = "default_max_items")]
    #[validate(range(min = 1, max = 100, message = "max_items must be between 1 and 100"))]
    pub max_items: u32,
    #[serde(default = "default_test_mode")]
    pub test_mode: bool,
    pub device_id: Option<String>,
}

fn default_max_items() -> u32 {
    10
}

fn default_test_mode() -> bool {
    true
}

/// Worker acknowledgement of an accepted start request.
#[derive(Debug, Serialize, ToSchema)]
pub struct StartPatrolResponse {
    pub task_id: String,
    pub status: String,
    pub message: String,
}

impl From<TaskHandle> for StartPatrolResponse {
    fn from(handle: TaskHandle) -> Self {
        Self {
            task_id: handle.task_id,
            status: handle.status,
            message: handle.message,
        }
    }
}

/// Flat view of a stored task: the status enum is spread back into the
/// `status`/`result`/`error_message` sibling fields the GUI expects.
#[derive(Debug, Serialize, ToSchema)]
pub struct TaskView {
    pub task_id: String,
    pub status: String,
    pub progress: f32,
    #[schema(value_type = String)]
    pub platform: Platform,
    pub keyword: String,
    pub max_items: u32,
    pub test_mode: bool,
    pub device_id: Option<String>,
    pub cancel_requested: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<PatrolTask> for TaskView {
    fn from(task: PatrolTask) -> Self {
        let result = task
            .status
            .result()
            .and_then(|r| serde_json::to_value(r).ok());
        let error_message = task.status.error_message().map(str::to_owned);
        Self {
            task_id: task.task_id,
            status: task.status.as_str().to_owned(),
            progress: task.progress,
            platform: task.params.platform,
            keyword: task.params.keyword,
            max_items: task.params.max_items,
            test_mode: task.params.test_mode,
            device_id: task.params.device_id,
            cancel_requested: task.cancel_requested,
            result,
            error_message,
            created_at: task.created_at,
            started_at: task.started_at,
            completed_at: task.completed_at,
        }
    }
}

/// One log line, task-scoped or session-scoped.
#[derive(Debug, Serialize, ToSchema)]
pub struct LogEntryView {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
}

impl From<LogEntry> for LogEntryView {
    fn from(entry: LogEntry) -> Self {
        Self {
            id: entry.id,
            timestamp: entry.timestamp,
            kind: entry.kind.to_string(),
            message: entry.message,
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct LimitQuery {
    /// Most recent N records (default 20).
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct SinceQuery {
    /// Return entries from this sequence index onwards (default 0).
    pub since: Option<usize>,
}
