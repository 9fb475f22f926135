//! Polling coordinator: drives one started task to a terminal state.
//!
//! A watch loop ticks on a fixed interval, drains new worker logs, merges the
//! latest status snapshot into the store and stops once the stored status is
//! terminal, the observation window elapses, or a stop signal arrives. Worker
//! errors never end the loop early; the worker may come back on a later tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::logs::{ActivityLog, LogKind};
use crate::worker::WorkerClient;

use super::store::TaskStore;
use super::types::TaskStatus;

/// Tuning for a watch loop.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Poll cadence for status and logs.
    pub interval: Duration,
    /// Client-side observation window. Elapsing it stops polling but does
    /// not fail the task; a later snapshot can still complete it.
    pub timeout: Duration,
    /// How many recent tasks to merge back after a completion.
    pub history_limit: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            timeout: Duration::from_secs(300),
            history_limit: 20,
        }
    }
}

/// Why a watch loop ended.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchOutcome {
    /// The stored status became terminal.
    Terminal(TaskStatus),
    /// The observation window elapsed with the task still non-terminal.
    TimedOut,
    /// Stop signal received (session shutdown).
    Stopped,
}

pub(crate) async fn watch_task(
    task_id: String,
    worker: Arc<dyn WorkerClient>,
    store: TaskStore,
    activity: ActivityLog,
    cfg: WatchConfig,
    mut stop_rx: watch::Receiver<bool>,
) -> WatchOutcome {
    let deadline = Instant::now() + cfg.timeout;
    let mut ticker = interval(cfg.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    debug!(task_id = %task_id, "watch loop stopped");
                    return WatchOutcome::Stopped;
                }
                continue;
            }
        }

        // Logs before status: lines emitted right before a terminal report
        // must land while the GUI still sees the task as active.
        drain_logs(&task_id, worker.as_ref(), &store).await;

        match worker.get_status(&task_id).await {
            Ok(snapshot) => {
                if let Some(status) = store.apply_snapshot(&snapshot).await {
                    if status.is_terminal() {
                        // One more drain for lines trailing the final status.
                        drain_logs(&task_id, worker.as_ref(), &store).await;
                        announce_terminal(&task_id, &status, &activity).await;
                        if matches!(status, TaskStatus::Completed { .. }) {
                            refresh_history(worker.as_ref(), &store, cfg.history_limit).await;
                        }
                        return WatchOutcome::Terminal(status);
                    }
                }
            }
            Err(err) => {
                warn!(task_id = %task_id, error = %err, "status poll failed, retrying next tick");
            }
        }

        if Instant::now() >= deadline {
            warn!(task_id = %task_id, "patrol task exceeded the observation window");
            activity
                .record(
                    LogKind::Performance,
                    format!(
                        "⚠️ 巡查任务超时（{} 秒未完成），已停止状态轮询",
                        cfg.timeout.as_secs()
                    ),
                )
                .await;
            return WatchOutcome::TimedOut;
        }
    }
}

async fn drain_logs(task_id: &str, worker: &dyn WorkerClient, store: &TaskStore) {
    match worker.get_new_logs(task_id).await {
        Ok(batch) if !batch.is_empty() => {
            let appended = store.append_logs(task_id, batch).await;
            debug!(task_id = %task_id, appended, "drained worker logs");
        }
        Ok(_) => {}
        Err(err) => {
            debug!(task_id = %task_id, error = %err, "log drain failed");
        }
    }
}

async fn announce_terminal(task_id: &str, status: &TaskStatus, activity: &ActivityLog) {
    info!(task_id = %task_id, status = status.as_str(), "patrol task finished");
    match status {
        TaskStatus::Completed { result } => {
            activity
                .record(
                    LogKind::Action,
                    format!(
                        "✅ 巡查任务完成: 检查 {} 个商品，发现 {} 个疑似盗版，举报 {} 个",
                        result.checked_count, result.piracy_count, result.reported_count
                    ),
                )
                .await;
        }
        TaskStatus::Failed { message } => {
            activity
                .record(LogKind::Performance, format!("❌ 巡查任务失败: {message}"))
                .await;
        }
        TaskStatus::Cancelled => {
            activity.record(LogKind::Info, "巡查任务已取消").await;
        }
        // Non-terminal statuses never reach here.
        _ => {}
    }
}

/// Pulls the worker's recent task list back into the store so history views
/// include tasks this session did not start.
async fn refresh_history(worker: &dyn WorkerClient, store: &TaskStore, limit: usize) {
    match worker.list_tasks(limit).await {
        Ok(snapshots) => {
            for snapshot in &snapshots {
                store.apply_snapshot(snapshot).await;
            }
            debug!(count = snapshots.len(), "refreshed task history from worker");
        }
        Err(err) => {
            warn!(error = %err, "history refresh failed");
        }
    }
}
