//! In-memory store of patrol tasks and their log buffers.
//!
//! The store is the session's single source of truth for task state. Writes
//! come from two places only: the start/cancel request path and the polling
//! coordinator applying worker snapshots. Everything else reads cloned
//! snapshots, so no caller can observe a half-applied update.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::logs::LogEntry;
use crate::worker::TaskSnapshot;

use super::types::{PatrolTask, TaskStatus};

/// Buffer size at which a task's log history is trimmed.
const LOG_SOFT_CAP: usize = 1000;
/// How many entries survive a trim (the newest ones).
const LOG_KEEP: usize = 500;

struct StoredTask {
    task: PatrolTask,
    /// Monotone insertion sequence, used to break created-at ties.
    seq: u64,
    logs: TaskLogBuffer,
}

#[derive(Default)]
struct TaskLogBuffer {
    entries: Vec<LogEntry>,
    /// Every log id ever accepted, for de-duplication across re-delivery.
    /// Survives trims so a trimmed entry cannot be re-appended.
    seen: HashSet<String>,
    /// Read position for the consume-once "new logs" view.
    cursor: usize,
}

impl TaskLogBuffer {
    /// Appends entries not seen before, preserving arrival order, then trims
    /// the buffer if it outgrew the cap. Returns how many were appended.
    fn append(&mut self, entries: Vec<LogEntry>) -> usize {
        let mut appended = 0;
        for entry in entries {
            if self.seen.insert(entry.id.clone()) {
                self.entries.push(entry);
                appended += 1;
            }
        }
        if self.entries.len() > LOG_SOFT_CAP {
            let dropped = self.entries.len() - LOG_KEEP;
            self.entries.drain(..dropped);
            self.cursor = self.cursor.saturating_sub(dropped);
        }
        appended
    }

    fn take_new(&mut self) -> Vec<LogEntry> {
        let fresh = self.entries[self.cursor..].to_vec();
        self.cursor = self.entries.len();
        fresh
    }

    fn since(&self, since: usize) -> Vec<LogEntry> {
        if since >= self.entries.len() {
            return Vec::new();
        }
        self.entries[since..].to_vec()
    }
}

#[derive(Default)]
struct StoreInner {
    tasks: HashMap<String, StoredTask>,
    next_seq: u64,
}

/// Shared, clonable task store. Clones are views onto the same state.
#[derive(Clone, Default)]
pub struct TaskStore {
    inner: Arc<RwLock<StoreInner>>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a freshly started task, replacing any record under the same
    /// id (worker task ids are unique, so this only matters for tests).
    pub async fn insert(&self, task: PatrolTask) {
        let mut inner = self.inner.write().await;
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.tasks.insert(
            task.task_id.clone(),
            StoredTask { task, seq, logs: TaskLogBuffer::default() },
        );
    }

    /// Merges one worker snapshot into the store and returns the effective
    /// stored status afterwards.
    ///
    /// Guards applied here, in order:
    /// - an unknown status string never overwrites anything;
    /// - a terminal stored status is never replaced by a non-terminal one
    ///   (stale snapshots arrive when polls overlap a completion);
    /// - progress never decreases, and completion forces it to `1.0`;
    /// - tasks we have never seen (worker history) are only inserted when
    ///   the snapshot carries their immutable params and a terminal status;
    ///   a non-terminal first sighting has no watch loop behind it and would
    ///   jam the single-task guard.
    pub async fn apply_snapshot(&self, snap: &TaskSnapshot) -> Option<TaskStatus> {
        let parsed = snap.parsed_status();
        let mut inner = self.inner.write().await;

        if let Some(stored) = inner.tasks.get_mut(&snap.task_id) {
            if let Some(new_status) = parsed {
                if stored.task.status.is_terminal() && !new_status.is_terminal() {
                    debug!(
                        task_id = %snap.task_id,
                        stale = new_status.as_str(),
                        kept = stored.task.status.as_str(),
                        "ignoring stale non-terminal snapshot"
                    );
                } else {
                    stored.task.status = new_status;
                }
            }
            let observed = snap.progress.clamp(0.0, 1.0);
            stored.task.progress = if matches!(stored.task.status, TaskStatus::Completed { .. }) {
                1.0
            } else {
                stored.task.progress.max(observed)
            };
            if let Some(started) = snap.started_at_utc() {
                stored.task.started_at.get_or_insert(started);
            }
            if let Some(completed) = snap.completed_at_utc() {
                stored.task.completed_at.get_or_insert(completed);
            }
            return Some(stored.task.status.clone());
        }

        // First sighting, e.g. from a history merge after completion.
        let Some(params) = snap.params.clone() else {
            warn!(task_id = %snap.task_id, "snapshot for unknown task without params, skipping");
            return None;
        };
        let Some(status) = parsed else {
            return None;
        };
        if !status.is_terminal() {
            debug!(
                task_id = %snap.task_id,
                status = status.as_str(),
                "skipping non-terminal snapshot for a task this session never started"
            );
            return None;
        }
        let progress = if matches!(status, TaskStatus::Completed { .. }) {
            1.0
        } else {
            snap.progress.clamp(0.0, 1.0)
        };
        let task = PatrolTask {
            task_id: snap.task_id.clone(),
            params,
            status: status.clone(),
            progress,
            cancel_requested: false,
            created_at: snap.created_at_utc().unwrap_or_else(Utc::now),
            started_at: snap.started_at_utc(),
            completed_at: snap.completed_at_utc(),
        };
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.tasks.insert(
            snap.task_id.clone(),
            StoredTask { task, seq, logs: TaskLogBuffer::default() },
        );
        Some(status)
    }

    /// Marks cancellation as requested without touching the status. Returns
    /// `false` for an unknown task.
    pub async fn set_cancel_requested(&self, task_id: &str) -> bool {
        let mut inner = self.inner.write().await;
        match inner.tasks.get_mut(task_id) {
            Some(stored) => {
                stored.task.cancel_requested = true;
                true
            }
            None => false,
        }
    }

    pub async fn get(&self, task_id: &str) -> Option<PatrolTask> {
        self.inner
            .read()
            .await
            .tasks
            .get(task_id)
            .map(|stored| stored.task.clone())
    }

    /// Most recent tasks first, bounded by `limit`.
    pub async fn recent(&self, limit: usize) -> Vec<PatrolTask> {
        let inner = self.inner.read().await;
        let mut all: Vec<(&StoredTask, &PatrolTask)> =
            inner.tasks.values().map(|s| (s, &s.task)).collect();
        all.sort_by(|(sa, ta), (sb, tb)| {
            tb.created_at
                .cmp(&ta.created_at)
                .then_with(|| sb.seq.cmp(&sa.seq))
        });
        all.into_iter()
            .take(limit)
            .map(|(_, task)| task.clone())
            .collect()
    }

    /// The non-terminal task with the highest insertion sequence, if any.
    /// Used to enforce the one-active-task-per-session rule.
    pub async fn active_task(&self) -> Option<PatrolTask> {
        let inner = self.inner.read().await;
        inner
            .tasks
            .values()
            .filter(|stored| !stored.task.status.is_terminal())
            .max_by_key(|stored| stored.seq)
            .map(|stored| stored.task.clone())
    }

    /// Appends worker log lines to a task's buffer. De-duplicated by log id;
    /// returns how many entries were actually new.
    pub async fn append_logs(&self, task_id: &str, entries: Vec<LogEntry>) -> usize {
        let mut inner = self.inner.write().await;
        match inner.tasks.get_mut(task_id) {
            Some(stored) => stored.logs.append(entries),
            None => {
                warn!(task_id = %task_id, "dropping logs for unknown task");
                0
            }
        }
    }

    /// Log entries from sequence `since` onwards (0 returns all retained).
    pub async fn logs_since(&self, task_id: &str, since: usize) -> Vec<LogEntry> {
        let inner = self.inner.read().await;
        inner
            .tasks
            .get(task_id)
            .map(|stored| stored.logs.since(since))
            .unwrap_or_default()
    }

    /// Consume-once view: entries appended since the previous call. A second
    /// call without new appends returns an empty batch.
    pub async fn take_new_logs(&self, task_id: &str) -> Vec<LogEntry> {
        let mut inner = self.inner.write().await;
        inner
            .tasks
            .get_mut(task_id)
            .map(|stored| stored.logs.take_new())
            .unwrap_or_default()
    }

    pub async fn log_count(&self, task_id: &str) -> usize {
        let inner = self.inner.read().await;
        inner
            .tasks
            .get(task_id)
            .map(|stored| stored.logs.entries.len())
            .unwrap_or(0)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.tasks.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.tasks.is_empty()
    }
}
