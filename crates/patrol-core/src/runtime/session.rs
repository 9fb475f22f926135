//! Operator session orchestrator.
//!
//! One [`Orchestrator`] exists per server process. It owns the task store,
//! whitelist, device fleet, activity log and report ledger, shares a single
//! worker client with the polling coordinator, and enforces that at most one
//! patrol task is in flight at a time.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::CoreConfig;
use crate::devices::DeviceRegistry;
use crate::ledger::ReportLedger;
use crate::logs::{ActivityLog, LogKind};
use crate::whitelist::WhitelistManager;
use crate::worker::{
    DeviceStatus, PlatformInfo, TaskHandle, TaskSnapshot, WorkerClient, WorkerError,
};

use super::coordinator::{self, WatchConfig, WatchOutcome};
use super::store::TaskStore;
use super::types::{PatrolParams, PatrolResult, PatrolTask, Platform, TaskStatus};

/// Launch preconditions checked before any worker call. Each failure carries
/// its own operator-facing diagnostic so the GUI can say what to fix.
#[derive(Debug, Error, PartialEq)]
pub enum LaunchError {
    #[error("请先在任务矩阵中勾选至少一个监控商品")]
    EmptySelection,
    #[error("没有在线且选中的设备，无法下发巡查任务")]
    NoActiveDevice,
    #[error("搜索关键词为空，请输入关键词或选择包含商品名的白名单行")]
    EmptyKeyword,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Launch(#[from] LaunchError),
    #[error("已有巡查任务正在运行，请等待完成或取消后重试")]
    TaskAlreadyRunning { task_id: Option<String> },
    #[error("任务不存在: {task_id}")]
    TaskNotFound { task_id: String },
    #[error("任务已结束（{status}），无法取消")]
    AlreadyTerminal { task_id: String, status: &'static str },
    #[error(transparent)]
    Worker(WorkerError),
}

/// A start request as it arrives from the GUI. The keyword is optional; when
/// absent the first selected whitelist row's product name is used.
#[derive(Debug, Clone)]
pub struct StartRequest {
    pub platform: Platform,
    pub keyword: Option<String>,
    pub max_items: u32,
    pub test_mode: bool,
    pub device_id: Option<String>,
}

struct ActiveWatch {
    task_id: String,
    stop_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

pub struct Orchestrator {
    worker: Arc<dyn WorkerClient>,
    store: TaskStore,
    activity: ActivityLog,
    whitelist: WhitelistManager,
    devices: DeviceRegistry,
    ledger: ReportLedger,
    watch_cfg: WatchConfig,
    active: Arc<Mutex<Option<ActiveWatch>>>,
}

impl Orchestrator {
    /// Builds a session, loading whitelist and ledger state from disk.
    pub async fn new(config: &CoreConfig, worker: Arc<dyn WorkerClient>) -> anyhow::Result<Self> {
        let whitelist = WhitelistManager::load(config.whitelist_path()).await?;
        let ledger = ReportLedger::load(config.ledger_path()).await?;
        Ok(Self {
            worker,
            store: TaskStore::new(),
            activity: ActivityLog::new(),
            whitelist,
            devices: DeviceRegistry::with_default_fleet(),
            ledger,
            watch_cfg: config.watch_config(),
            active: Arc::new(Mutex::new(None)),
        })
    }

    /// Overrides the poll tuning. Mostly useful for tests that need sub-second
    /// ticks.
    pub fn with_watch_config(mut self, cfg: WatchConfig) -> Self {
        self.watch_cfg = cfg;
        self
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    pub fn activity(&self) -> &ActivityLog {
        &self.activity
    }

    pub fn whitelist(&self) -> &WhitelistManager {
        &self.whitelist
    }

    pub fn devices(&self) -> &DeviceRegistry {
        &self.devices
    }

    pub fn ledger(&self) -> &ReportLedger {
        &self.ledger
    }

    pub fn worker(&self) -> &Arc<dyn WorkerClient> {
        &self.worker
    }

    /// Validates launch preconditions and resolves the effective parameters.
    /// Returns the params plus the selection and active-device counts for the
    /// launch log line.
    async fn resolve_launch(
        &self,
        req: &StartRequest,
    ) -> Result<(PatrolParams, usize, usize), LaunchError> {
        let selection = self.whitelist.selected_entries().await;
        if selection.is_empty() {
            return Err(LaunchError::EmptySelection);
        }
        let active_devices = self.devices.selected_online().await;
        if active_devices.is_empty() {
            return Err(LaunchError::NoActiveDevice);
        }
        let keyword = req
            .keyword
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_owned)
            .or_else(|| {
                let fallback = selection[0].product_name.trim();
                (!fallback.is_empty()).then(|| fallback.to_owned())
            })
            .ok_or(LaunchError::EmptyKeyword)?;
        let device_id = req
            .device_id
            .clone()
            .or_else(|| active_devices.first().map(|d| d.id.clone()));
        let params = PatrolParams {
            platform: req.platform,
            keyword,
            max_items: req.max_items,
            test_mode: req.test_mode,
            device_id,
            device_type: Some("adb".to_owned()),
        };
        Ok((params, selection.len(), active_devices.len()))
    }

    /// Starts a patrol task and begins watching it.
    ///
    /// Order matters: preconditions and the single-task guard run before the
    /// worker sees anything, so a rejected launch leaves the worker untouched.
    pub async fn start_patrol(&self, req: StartRequest) -> Result<TaskHandle, SessionError> {
        let (params, selected, active_devices) = match self.resolve_launch(&req).await {
            Ok(resolved) => resolved,
            Err(err) => {
                self.activity
                    .record(LogKind::Performance, format!("❌ 无法启动巡查: {err}"))
                    .await;
                return Err(err.into());
            }
        };

        if let Some(current) = self.store.active_task().await {
            // A stored non-terminal task with no live watch loop (the
            // observation window elapsed) may have settled worker-side since
            // polling stopped; re-check it before rejecting the launch.
            let blocking = if self.is_watched(&current.task_id) {
                Some(current)
            } else {
                self.reconcile_unwatched(&current.task_id).await
            };
            if let Some(current) = blocking {
                self.activity
                    .record(
                        LogKind::Performance,
                        format!("❌ 已有巡查任务进行中: {}", current.task_id),
                    )
                    .await;
                return Err(SessionError::TaskAlreadyRunning { task_id: Some(current.task_id) });
            }
        }

        let handle = match self.worker.start_patrol(&params).await {
            Ok(handle) => handle,
            Err(err) => {
                self.activity
                    .record(LogKind::Performance, format!("❌ 启动巡查失败: {err}"))
                    .await;
                return Err(match err {
                    WorkerError::TaskAlreadyRunning => {
                        SessionError::TaskAlreadyRunning { task_id: None }
                    }
                    other => SessionError::Worker(other),
                });
            }
        };

        self.store
            .insert(PatrolTask::new_pending(handle.task_id.clone(), params.clone()))
            .await;
        self.activity
            .record(
                LogKind::Action,
                format!(
                    "[EXE] 启动自动搜索: 平台={}, 任务数={}, 活跃设备={}, 条数={}",
                    params.platform, selected, active_devices, params.max_items
                ),
            )
            .await;
        info!(task_id = %handle.task_id, platform = %params.platform, keyword = %params.keyword, "patrol task started");
        self.spawn_watch(handle.task_id.clone());
        Ok(handle)
    }

    /// Requests cooperative cancellation.
    ///
    /// The local record is never forced to `cancelled` here; the watch loop
    /// keeps polling until the worker confirms a terminal status, which may
    /// legitimately turn out to be `completed` if cancellation raced the end
    /// of the scan. Local bookkeeping happens before the worker call so the
    /// GUI immediately renders the pending cancellation.
    pub async fn cancel(&self, task_id: &str) -> Result<(), SessionError> {
        let task = self
            .store
            .get(task_id)
            .await
            .ok_or_else(|| SessionError::TaskNotFound { task_id: task_id.to_owned() })?;
        if task.status.is_terminal() {
            return Err(SessionError::AlreadyTerminal {
                task_id: task_id.to_owned(),
                status: task.status.as_str(),
            });
        }

        self.store.set_cancel_requested(task_id).await;
        self.activity
            .record(LogKind::Info, format!("正在取消巡查任务: {task_id}"))
            .await;

        match self.worker.cancel(task_id).await {
            Ok(()) => {
                if !self.is_watched(task_id) {
                    // The watch loop stopped when the observation window
                    // elapsed; resume it so the worker's confirmation can
                    // still settle the record.
                    self.spawn_watch(task_id.to_owned());
                }
                Ok(())
            }
            Err(WorkerError::Rejected { detail }) => {
                // Worker-side the task already finished; the next poll settles it.
                warn!(task_id = %task_id, detail = %detail, "cancel rejected by worker");
                Ok(())
            }
            Err(err) => {
                self.activity
                    .record(LogKind::Performance, format!("❌ 取消任务失败: {err}"))
                    .await;
                Err(SessionError::Worker(err))
            }
        }
    }

    /// Marketplace catalog, served from the worker when reachable and from
    /// the built-in fallback otherwise.
    pub async fn platform_catalog(&self) -> Vec<PlatformInfo> {
        match self.worker.get_platforms().await {
            Ok(platforms) => platforms,
            Err(err) => {
                warn!(error = %err, "platform catalog fetch failed, serving fallback");
                Platform::catalog()
            }
        }
    }

    /// Probes the worker for USB device state and folds it into the fleet.
    /// An unreachable worker reads as "no device", not as a request failure.
    pub async fn refresh_device_status(&self) -> DeviceStatus {
        let status = match self.worker.get_device_status().await {
            Ok(status) => status,
            Err(err) => {
                warn!(error = %err, "device probe failed");
                DeviceStatus {
                    connected: false,
                    device_id: None,
                    device_type: None,
                    status_message: "巡查服务不可用，无法检测设备".to_owned(),
                }
            }
        };
        self.devices.apply_probe(&status).await;
        status
    }

    /// Stops the active watch loop, if any, and waits briefly for it to wind
    /// down. Worker-side tasks are left running; this is a client shutdown,
    /// not a cancellation.
    pub async fn shutdown(&self) {
        let active = match self.active.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };
        if let Some(active) = active {
            let task_id = active.task_id.clone();
            let _ = active.stop_tx.send(true);
            if tokio::time::timeout(Duration::from_secs(5), active.join)
                .await
                .is_err()
            {
                warn!(task_id = %task_id, "watch loop did not stop in time");
            }
        }
    }

    /// Whether a live watch loop currently owns `task_id`.
    fn is_watched(&self, task_id: &str) -> bool {
        self.active
            .lock()
            .map(|slot| slot.as_ref().is_some_and(|w| w.task_id == task_id))
            .unwrap_or(false)
    }

    /// Re-checks a stored non-terminal task whose watch loop is gone against
    /// the worker. Such a record would otherwise block every future launch.
    ///
    /// The worker's current status is applied to the store; a completion is
    /// still fed to the ledger, and a task the worker no longer tracks is
    /// settled as failed. Returns the task if it remains non-terminal, with
    /// its watch loop resumed so a late terminal status is eventually seen.
    async fn reconcile_unwatched(&self, task_id: &str) -> Option<PatrolTask> {
        match self.worker.get_status(task_id).await {
            Ok(snapshot) => {
                if let Some(TaskStatus::Completed { result }) =
                    self.store.apply_snapshot(&snapshot).await
                {
                    feed_ledger(&self.store, &self.ledger, &self.activity, task_id, &result)
                        .await;
                }
            }
            Err(WorkerError::TaskNotFound { .. }) => {
                let lost = TaskSnapshot {
                    task_id: task_id.to_owned(),
                    status: "failed".to_owned(),
                    error_message: Some("巡查服务已不再跟踪该任务".to_owned()),
                    ..TaskSnapshot::default()
                };
                self.store.apply_snapshot(&lost).await;
                self.activity
                    .record(
                        LogKind::Performance,
                        format!("⚠️ 任务 {task_id} 已在巡查服务端丢失，已标记失败"),
                    )
                    .await;
            }
            Err(err) => {
                warn!(task_id = %task_id, error = %err, "stale task re-check failed");
            }
        }

        let task = self.store.get(task_id).await?;
        if task.status.is_terminal() {
            info!(task_id = %task_id, status = task.status.as_str(), "stale task settled");
            None
        } else {
            self.spawn_watch(task_id.to_owned());
            Some(task)
        }
    }

    fn spawn_watch(&self, task_id: String) {
        let (stop_tx, stop_rx) = watch::channel(false);
        let worker = Arc::clone(&self.worker);
        let store = self.store.clone();
        let activity = self.activity.clone();
        let ledger = self.ledger.clone();
        let cfg = self.watch_cfg.clone();
        let active = Arc::clone(&self.active);
        let watched = task_id.clone();

        let join = tokio::spawn(async move {
            let outcome = coordinator::watch_task(
                watched.clone(),
                worker,
                store.clone(),
                activity.clone(),
                cfg,
                stop_rx,
            )
            .await;

            if let WatchOutcome::Terminal(TaskStatus::Completed { result }) = &outcome {
                feed_ledger(&store, &ledger, &activity, &watched, result).await;
            }

            if let Ok(mut slot) = active.lock() {
                if slot.as_ref().is_some_and(|w| w.task_id == watched) {
                    *slot = None;
                }
            }
        });

        if let Ok(mut slot) = self.active.lock() {
            *slot = Some(ActiveWatch { task_id, stop_tx, join });
        }
    }
}

/// Appends a completed task's detections to the report ledger and mirrors
/// the outcome into the activity log.
async fn feed_ledger(
    store: &TaskStore,
    ledger: &ReportLedger,
    activity: &ActivityLog,
    task_id: &str,
    result: &PatrolResult,
) {
    let Some(task) = store.get(task_id).await else {
        return;
    };
    let completed_at = task.completed_at.unwrap_or_else(Utc::now);
    match ledger.ingest_result(&task.params, result, completed_at).await {
        Ok(created) if !created.is_empty() => {
            activity
                .record(LogKind::Action, format!("✅ 已登记 {} 条举报记录", created.len()))
                .await;
        }
        Ok(_) => {}
        Err(err) => {
            warn!(task_id = %task_id, error = %err, "report ledger write failed");
            activity
                .record(LogKind::Performance, format!("❌ 举报记录写入失败: {err}"))
                .await;
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let watching = self
            .active
            .lock()
            .map(|slot| slot.as_ref().map(|w| w.task_id.clone()))
            .unwrap_or(None);
        write!(f, "Orchestrator(watching: {watching:?})")
    }
}
