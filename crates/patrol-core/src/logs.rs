//! Log entries and the operator-facing activity log.
//!
//! Two log streams exist: per-task logs fetched from the worker (stored in
//! the task store) and the session-wide activity log kept here. Both use the
//! same [`LogEntry`] shape so the GUI renders them uniformly.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Rendering category for a log entry. Closed set; anything a worker sends
/// outside of it is folded into a known kind at the boundary
/// ([`LogKind::from_wire`]) so downstream code never branches on strings.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LogKind {
    #[default]
    Info,
    Action,
    Performance,
}

impl LogKind {
    /// Maps a worker-reported log type onto the closed set.
    ///
    /// `warning` and `error` render like performance diagnostics; any value
    /// we have never seen defaults to `info` rather than being dropped.
    pub fn from_wire(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "action" => LogKind::Action,
            "performance" | "warning" | "error" => LogKind::Performance,
            _ => LogKind::Info,
        }
    }

    /// Classifies a free-form message by its content markers, mirroring how
    /// worker console output is bucketed for display.
    pub fn classify(message: &str) -> Self {
        if message.contains("[EXE]") || message.contains("启动") {
            LogKind::Action
        } else if message.contains('❌')
            || message.contains('⚠')
            || message.to_uppercase().contains("ERROR")
        {
            LogKind::Performance
        } else if message.contains('✅') || message.contains("成功") {
            LogKind::Action
        } else {
            LogKind::Info
        }
    }
}

/// A single timestamped log line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Unique within its stream; used for de-duplication on re-delivery.
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: LogKind,
    pub message: String,
}

impl LogEntry {
    pub fn new(kind: LogKind, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            kind,
            message: message.into(),
        }
    }
}

/// Append-only session log of operator-relevant events: launches, export
/// outcomes, validation failures, worker errors. Explicitly clearable, unlike
/// per-task logs which only truncate under memory pressure.
#[derive(Clone, Default)]
pub struct ActivityLog {
    entries: Arc<RwLock<Vec<LogEntry>>>,
}

impl ActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry with an explicit kind and returns it.
    pub async fn record(&self, kind: LogKind, message: impl Into<String>) -> LogEntry {
        let entry = LogEntry::new(kind, message);
        self.entries.write().await.push(entry.clone());
        entry
    }

    /// Appends an entry, deriving its kind from content markers.
    pub async fn record_classified(&self, message: impl Into<String>) -> LogEntry {
        let message = message.into();
        let kind = LogKind::classify(&message);
        self.record(kind, message).await
    }

    /// Entries after position `since` (0 returns everything), oldest first.
    pub async fn snapshot_since(&self, since: usize) -> Vec<LogEntry> {
        let entries = self.entries.read().await;
        if since >= entries.len() {
            return Vec::new();
        }
        entries[since..].to_vec()
    }

    /// Empties the log and returns how many entries were removed.
    pub async fn clear(&self) -> usize {
        let mut entries = self.entries.write().await;
        let n = entries.len();
        entries.clear();
        n
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
