use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Marketplace a patrol task runs against.
///
/// The worker owns the authoritative platform catalog (see
/// [`crate::worker::WorkerClient::get_platforms`]); this enum covers the
/// platforms the product dispatches to today. `xiaohongshu` is accepted as a
/// legacy alias for `xhs` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Platform {
    Xianyu,
    #[serde(alias = "xiaohongshu")]
    #[strum(to_string = "xhs", serialize = "xiaohongshu")]
    Xhs,
    Taobao,
}

impl Platform {
    /// Operator-facing display name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Platform::Xianyu => "闲鱼",
            Platform::Xhs => "小红书",
            Platform::Taobao => "淘宝",
        }
    }

    /// Static catalog served when the worker cannot be reached.
    pub fn catalog() -> Vec<crate::worker::PlatformInfo> {
        [
            (Platform::Xianyu, "闲鱼二手交易平台"),
            (Platform::Xhs, "小红书电商平台"),
            (Platform::Taobao, "淘宝电商平台"),
        ]
        .into_iter()
        .map(|(p, description)| crate::worker::PlatformInfo {
            key: p.to_string(),
            name: p.display_name().to_owned(),
            description: description.to_owned(),
            supported: true,
        })
        .collect()
    }
}

/// Immutable parameters a patrol task was started with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatrolParams {
    pub platform: Platform,
    pub keyword: String,
    #[serde(default = "default_max_items")]
    pub max_items: u32,
    #[serde(default = "default_test_mode")]
    pub test_mode: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default = "default_device_type")]
    pub device_type: Option<String>,
}

fn default_max_items() -> u32 {
    10
}

fn default_test_mode() -> bool {
    true
}

fn default_device_type() -> Option<String> {
    Some("adb".to_owned())
}

/// One listing the worker inspected, as reported in a completed result.
/// Read-only once received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub title: String,
    pub shop_name: String,
    pub price: f64,
    pub is_piracy: bool,
    pub confidence: f32,
    #[serde(default)]
    pub reasons: Vec<String>,
    #[serde(default)]
    pub report_status: Option<String>,
}

/// Aggregate outcome of a completed patrol task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatrolResult {
    pub checked_count: u32,
    pub piracy_count: u32,
    pub reported_count: u32,
    #[serde(default)]
    pub details: Vec<DetectionResult>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// High-level lifecycle state of a patrol task.
///
/// `result` is only reachable through [`TaskStatus::Completed`] and the
/// failure message only through [`TaskStatus::Failed`], so a task can never
/// carry a result without being completed (or a failure message without
/// having failed).
#[derive(Debug, Clone, PartialEq)]
pub enum TaskStatus {
    /// Accepted by the worker but not started yet.
    Pending,
    /// The worker is actively scanning.
    Running,
    /// Finished successfully; the worker-reported result is attached.
    Completed { result: PatrolResult },
    /// The worker reported a business failure.
    Failed { message: String },
    /// Cancelled before completing.
    Cancelled,
}

impl TaskStatus {
    /// Returns `true` once no further transition can occur.
    ///
    /// Pollers should use this rather than matching individual variants so a
    /// future terminal variant is handled automatically.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed { .. } | TaskStatus::Failed { .. } | TaskStatus::Cancelled
        )
    }

    /// Flat wire form shared with the worker and the GUI.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed { .. } => "completed",
            TaskStatus::Failed { .. } => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    /// Result payload, present only for [`TaskStatus::Completed`].
    pub fn result(&self) -> Option<&PatrolResult> {
        match self {
            TaskStatus::Completed { result } => Some(result),
            _ => None,
        }
    }

    /// Failure message, present only for [`TaskStatus::Failed`].
    pub fn error_message(&self) -> Option<&str> {
        match self {
            TaskStatus::Failed { message } => Some(message.as_str()),
            _ => None,
        }
    }
}

/// The complete stored record for one patrol task.
///
/// Created when a start request is accepted; afterwards mutated only by the
/// polling coordinator applying worker-reported snapshots (and by explicit
/// cancel bookkeeping). Never deleted — history retrieval is bounded by a
/// `limit` instead.
#[derive(Debug, Clone, PartialEq)]
pub struct PatrolTask {
    pub task_id: String,
    pub params: PatrolParams,
    pub status: TaskStatus,
    /// In `[0, 1]`, monotonically non-decreasing while running.
    pub progress: f32,
    /// Set when the operator has asked for cancellation; the status itself
    /// only changes once the worker confirms.
    pub cancel_requested: bool,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl PatrolTask {
    /// Fresh `pending` record as stored right after a successful start call.
    pub fn new_pending(task_id: impl Into<String>, params: PatrolParams) -> Self {
        Self {
            task_id: task_id.into(),
            params,
            status: TaskStatus::Pending,
            progress: 0.0,
            cancel_requested: false,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }
}
