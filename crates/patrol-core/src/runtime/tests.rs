//! Runtime behaviour tests against a scripted worker.
//!
//! The scripted worker replays a fixed sequence of status snapshots and log
//! batches, which lets these tests pin down the ordering rules: terminal
//! stickiness, monotone progress, consume-once log drains, the single-task
//! guard and cooperative cancellation.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{sleep, timeout};
use tracing_test::traced_test;
use uuid::Uuid;

use crate::config::CoreConfig;
use crate::logs::{LogEntry, LogKind};
use crate::worker::{
    DeviceStatus, PlatformInfo, TaskHandle, TaskSnapshot, WorkerClient, WorkerError,
};

use super::coordinator::WatchConfig;
use super::session::{LaunchError, Orchestrator, SessionError, StartRequest};
use super::store::TaskStore;
use super::types::{DetectionResult, PatrolParams, PatrolResult, PatrolTask, Platform, TaskStatus};

const GRACE: Duration = Duration::from_secs(5);

// ── scripted worker ─────────────────────────────────────────────────────────

#[derive(Default)]
struct ScriptedWorker {
    /// Snapshots returned by `get_status` in order; the last one repeats.
    /// An empty script makes `get_status` fail.
    script: Mutex<VecDeque<TaskSnapshot>>,
    /// One batch per `get_new_logs` call; exhausted batches yield empty.
    log_batches: Mutex<VecDeque<Vec<LogEntry>>>,
    history: Mutex<Vec<TaskSnapshot>>,
    starts: AtomicUsize,
    cancels: AtomicUsize,
}

impl ScriptedWorker {
    fn new(script: Vec<TaskSnapshot>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            ..Default::default()
        })
    }

    fn push_snapshot(&self, snap: TaskSnapshot) {
        self.script.lock().unwrap().push_back(snap);
    }

    fn push_logs(&self, batch: Vec<LogEntry>) {
        self.log_batches.lock().unwrap().push_back(batch);
    }

    fn set_history(&self, snaps: Vec<TaskSnapshot>) {
        *self.history.lock().unwrap() = snaps;
    }
}

#[async_trait]
impl WorkerClient for ScriptedWorker {
    async fn start_patrol(&self, _params: &PatrolParams) -> Result<TaskHandle, WorkerError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(TaskHandle {
            task_id: "task-1".into(),
            status: "pending".into(),
            message: "巡查任务已启动，任务ID: task-1".into(),
        })
    }

    async fn get_status(&self, task_id: &str) -> Result<TaskSnapshot, WorkerError> {
        let mut script = self.script.lock().unwrap();
        if script.len() > 1 {
            Ok(script.pop_front().unwrap())
        } else {
            script
                .front()
                .cloned()
                .ok_or(WorkerError::TaskNotFound { task_id: task_id.to_owned() })
        }
    }

    async fn list_tasks(&self, _limit: usize) -> Result<Vec<TaskSnapshot>, WorkerError> {
        Ok(self.history.lock().unwrap().clone())
    }

    async fn cancel(&self, _task_id: &str) -> Result<(), WorkerError> {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_logs(&self, _task_id: &str, _since: usize) -> Result<Vec<LogEntry>, WorkerError> {
        Ok(Vec::new())
    }

    async fn get_new_logs(&self, _task_id: &str) -> Result<Vec<LogEntry>, WorkerError> {
        Ok(self
            .log_batches
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default())
    }

    async fn get_platforms(&self) -> Result<Vec<PlatformInfo>, WorkerError> {
        Ok(Platform::catalog())
    }

    async fn get_device_status(&self) -> Result<DeviceStatus, WorkerError> {
        Ok(DeviceStatus {
            connected: true,
            device_id: Some("emulator-5554".into()),
            device_type: Some("adb".into()),
            status_message: "设备已连接".into(),
        })
    }
}

/// Worker that can never be reached, for fallback paths.
struct UnreachableWorker;

#[async_trait]
impl WorkerClient for UnreachableWorker {
    async fn start_patrol(&self, _params: &PatrolParams) -> Result<TaskHandle, WorkerError> {
        Err(unreachable_err())
    }
    async fn get_status(&self, _task_id: &str) -> Result<TaskSnapshot, WorkerError> {
        Err(unreachable_err())
    }
    async fn list_tasks(&self, _limit: usize) -> Result<Vec<TaskSnapshot>, WorkerError> {
        Err(unreachable_err())
    }
    async fn cancel(&self, _task_id: &str) -> Result<(), WorkerError> {
        Err(unreachable_err())
    }
    async fn get_logs(&self, _task_id: &str, _since: usize) -> Result<Vec<LogEntry>, WorkerError> {
        Err(unreachable_err())
    }
    async fn get_new_logs(&self, _task_id: &str) -> Result<Vec<LogEntry>, WorkerError> {
        Err(unreachable_err())
    }
    async fn get_platforms(&self) -> Result<Vec<PlatformInfo>, WorkerError> {
        Err(unreachable_err())
    }
    async fn get_device_status(&self) -> Result<DeviceStatus, WorkerError> {
        Err(unreachable_err())
    }
}

fn unreachable_err() -> WorkerError {
    WorkerError::Unavailable { reason: "connection refused".into() }
}

// ── fixtures ────────────────────────────────────────────────────────────────

fn test_params() -> PatrolParams {
    PatrolParams {
        platform: Platform::Xianyu,
        keyword: "2025法考全套资料".into(),
        max_items: 10,
        test_mode: true,
        device_id: Some("dev-001".into()),
        device_type: Some("adb".into()),
    }
}

fn snap(task_id: &str, status: &str, progress: f32) -> TaskSnapshot {
    TaskSnapshot {
        task_id: task_id.into(),
        status: status.into(),
        progress,
        params: Some(test_params()),
        ..Default::default()
    }
}

fn completed_snap(task_id: &str, result: PatrolResult) -> TaskSnapshot {
    let mut s = snap(task_id, "completed", 1.0);
    s.result = Some(result);
    s
}

fn detection(title: &str, shop: &str, price: f64, is_piracy: bool, status: Option<&str>) -> DetectionResult {
    DetectionResult {
        title: title.into(),
        shop_name: shop.into(),
        price,
        is_piracy,
        confidence: if is_piracy { 0.92 } else { 0.1 },
        reasons: if is_piracy { vec!["价格远低于正版".into()] } else { Vec::new() },
        report_status: status.map(str::to_owned),
    }
}

fn patrol_result() -> PatrolResult {
    PatrolResult {
        checked_count: 10,
        piracy_count: 3,
        reported_count: 2,
        details: vec![
            detection("盗版法考资料U盘版", "小鱼书摊", 9.9, true, Some("success")),
            detection("法考全套PDF低价", "阿飞资料铺", 19.9, true, Some("failed")),
            detection("2025法考资料网盘", "学习小站", 5.0, true, None),
            detection("2025法考全套资料 正版", "官方旗舰店", 299.0, false, None),
        ],
        ..Default::default()
    }
}

fn log_entry(id: &str, message: &str) -> LogEntry {
    LogEntry {
        id: id.into(),
        timestamp: chrono::Utc::now(),
        kind: LogKind::Info,
        message: message.into(),
    }
}

fn fast_watch() -> WatchConfig {
    WatchConfig {
        interval: Duration::from_millis(10),
        timeout: Duration::from_secs(5),
        history_limit: 10,
    }
}

fn start_request() -> StartRequest {
    StartRequest {
        platform: Platform::Xianyu,
        keyword: None,
        max_items: 10,
        test_mode: true,
        device_id: None,
    }
}

/// Removes the session's scratch data directory on drop.
struct TempData(PathBuf);

impl Drop for TempData {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

async fn test_session(worker: Arc<dyn WorkerClient>) -> (Orchestrator, TempData) {
    let data_dir = std::env::temp_dir().join(format!("patrol-runtime-{}", Uuid::new_v4()));
    let config = CoreConfig {
        data_dir: data_dir.clone(),
        ..CoreConfig::default()
    };
    let session = Orchestrator::new(&config, worker)
        .await
        .unwrap()
        .with_watch_config(fast_watch());
    (session, TempData(data_dir))
}

async fn wait_for_status(
    store: &TaskStore,
    task_id: &str,
    pred: impl Fn(&TaskStatus) -> bool,
) -> PatrolTask {
    timeout(GRACE, async {
        loop {
            if let Some(task) = store.get(task_id).await {
                if pred(&task.status) {
                    return task;
                }
            }
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("task did not reach the expected status in time")
}

// ── lifecycle ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn completed_task_settles_with_result_and_feeds_the_ledger() {
    let worker = ScriptedWorker::new(vec![
        snap("task-1", "running", 0.3),
        completed_snap("task-1", patrol_result()),
    ]);
    worker.push_logs(vec![
        log_entry("task-1_1", "开始巡查关键词: 2025法考全套资料"),
        log_entry("task-1_2", "✅ 第一个商品检查完成"),
    ]);
    let (session, _data) = test_session(worker.clone()).await;

    let handle = session.start_patrol(start_request()).await.unwrap();
    assert_eq!(handle.task_id, "task-1");

    let task = wait_for_status(session.store(), "task-1", TaskStatus::is_terminal).await;
    let result = task.status.result().expect("completed status carries a result");
    assert_eq!(result.checked_count, 10);
    assert_eq!(result.piracy_count, 3);
    assert_eq!(task.progress, 1.0);

    // Three piracy detections land in the ledger (the legitimate one does not).
    timeout(GRACE, async {
        while session.ledger().len().await != 3 {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("ledger was not fed in time");

    let messages: Vec<String> = session
        .activity()
        .snapshot_since(0)
        .await
        .into_iter()
        .map(|e| e.message)
        .collect();
    assert!(messages.iter().any(|m| m.contains("[EXE] 启动自动搜索")));
    assert!(messages.iter().any(|m| m.contains("✅ 巡查任务完成")));

    assert_eq!(session.store().logs_since("task-1", 0).await.len(), 2);
}

#[tokio::test]
async fn failed_task_keeps_the_worker_message() {
    let mut failed = snap("task-1", "failed", 0.4);
    failed.error_message = Some("adb device disconnected".into());
    let worker = ScriptedWorker::new(vec![snap("task-1", "running", 0.2), failed]);
    let (session, _data) = test_session(worker).await;

    session.start_patrol(start_request()).await.unwrap();
    let task = wait_for_status(session.store(), "task-1", TaskStatus::is_terminal).await;
    assert_eq!(task.status.error_message(), Some("adb device disconnected"));
    assert!(session.ledger().is_empty().await);
}

#[tokio::test]
async fn start_records_pending_before_any_snapshot_moves_it() {
    let worker = ScriptedWorker::new(vec![snap("task-1", "pending", 0.0)]);
    let (session, _data) = test_session(worker).await;

    session.start_patrol(start_request()).await.unwrap();
    let task = session.store().get("task-1").await.unwrap();
    assert_eq!(task.status, TaskStatus::Pending);
    assert!(!task.cancel_requested);
    assert_eq!(task.params.keyword, "2025法考全套资料");

    session.shutdown().await;
}

// ── store guards ────────────────────────────────────────────────────────────

#[tokio::test]
async fn terminal_status_is_never_overwritten_by_stale_snapshots() {
    let store = TaskStore::new();
    store
        .insert(PatrolTask::new_pending("task-1", test_params()))
        .await;

    store
        .apply_snapshot(&completed_snap("task-1", patrol_result()))
        .await;
    let effective = store.apply_snapshot(&snap("task-1", "running", 0.6)).await;

    assert!(matches!(effective, Some(TaskStatus::Completed { .. })));
    let task = store.get("task-1").await.unwrap();
    assert!(task.status.is_terminal());
    assert_eq!(task.progress, 1.0);
}

#[tokio::test]
async fn progress_is_monotone_and_clamped() {
    let store = TaskStore::new();
    store
        .insert(PatrolTask::new_pending("task-1", test_params()))
        .await;

    store.apply_snapshot(&snap("task-1", "running", 0.5)).await;
    store.apply_snapshot(&snap("task-1", "running", 0.3)).await;
    assert_eq!(store.get("task-1").await.unwrap().progress, 0.5);

    store.apply_snapshot(&snap("task-1", "running", 7.0)).await;
    assert_eq!(store.get("task-1").await.unwrap().progress, 1.0);
}

#[traced_test]
#[tokio::test]
async fn unknown_status_strings_change_nothing() {
    let store = TaskStore::new();
    store
        .insert(PatrolTask::new_pending("task-1", test_params()))
        .await;
    store.apply_snapshot(&snap("task-1", "running", 0.4)).await;

    let effective = store.apply_snapshot(&snap("task-1", "paused", 0.9)).await;
    assert!(matches!(effective, Some(TaskStatus::Running)));
    // Progress still advances from the snapshot even when its status is unknown.
    assert_eq!(store.get("task-1").await.unwrap().progress, 0.9);

    // An unknown task with an unknown status is not inserted at all.
    assert!(store.apply_snapshot(&snap("task-9", "paused", 0.1)).await.is_none());
    assert!(store.get("task-9").await.is_none());

    assert!(logs_contain("unknown task status"));
}

#[tokio::test]
async fn history_merge_never_inserts_non_terminal_strangers() {
    let store = TaskStore::new();

    // A running task this session never started has no watch loop behind it;
    // inserting it would permanently occupy the single-task slot.
    assert!(store.apply_snapshot(&snap("task-7", "running", 0.4)).await.is_none());
    assert!(store.get("task-7").await.is_none());
    assert!(store.active_task().await.is_none());

    // Terminal strangers are still merged, e.g. from a history refresh.
    let effective = store
        .apply_snapshot(&completed_snap("task-7", patrol_result()))
        .await;
    assert!(matches!(effective, Some(TaskStatus::Completed { .. })));
    assert_eq!(store.get("task-7").await.unwrap().progress, 1.0);
}

#[tokio::test]
async fn log_drain_is_consume_once_and_deduplicated() {
    let store = TaskStore::new();
    store
        .insert(PatrolTask::new_pending("task-1", test_params()))
        .await;

    let appended = store
        .append_logs(
            "task-1",
            vec![
                log_entry("task-1_1", "a"),
                log_entry("task-1_2", "b"),
                log_entry("task-1_1", "a re-delivered"),
            ],
        )
        .await;
    assert_eq!(appended, 2);

    assert_eq!(store.take_new_logs("task-1").await.len(), 2);
    assert!(store.take_new_logs("task-1").await.is_empty());

    store
        .append_logs("task-1", vec![log_entry("task-1_3", "c")])
        .await;
    let fresh = store.take_new_logs("task-1").await;
    assert_eq!(fresh.len(), 1);
    assert_eq!(fresh[0].message, "c");

    // The full view is unaffected by drains.
    assert_eq!(store.logs_since("task-1", 0).await.len(), 3);
    assert_eq!(store.logs_since("task-1", 2).await.len(), 1);
}

#[tokio::test]
async fn log_buffer_truncates_but_keeps_the_newest_entries() {
    let store = TaskStore::new();
    store
        .insert(PatrolTask::new_pending("task-1", test_params()))
        .await;

    let entries: Vec<LogEntry> = (0..1001)
        .map(|i| log_entry(&format!("task-1_{i}"), &format!("line {i}")))
        .collect();
    store.append_logs("task-1", entries).await;

    assert_eq!(store.log_count("task-1").await, 500);
    let retained = store.logs_since("task-1", 0).await;
    assert_eq!(retained.first().unwrap().message, "line 501");
    assert_eq!(retained.last().unwrap().message, "line 1000");

    // Trimmed ids stay deduplicated: re-delivering an old line is a no-op.
    let appended = store
        .append_logs("task-1", vec![log_entry("task-1_0", "line 0")])
        .await;
    assert_eq!(appended, 0);
}

// ── single-task rule ────────────────────────────────────────────────────────

#[tokio::test]
async fn second_start_is_rejected_while_a_task_is_active() {
    let worker = ScriptedWorker::new(vec![snap("task-1", "running", 0.1)]);
    let (session, _data) = test_session(worker.clone()).await;

    session.start_patrol(start_request()).await.unwrap();
    let err = session.start_patrol(start_request()).await.unwrap_err();
    assert!(matches!(err, SessionError::TaskAlreadyRunning { .. }));

    // The worker only ever saw one start; no second record exists.
    assert_eq!(worker.starts.load(Ordering::SeqCst), 1);
    assert_eq!(session.store().len().await, 1);

    session.shutdown().await;
}

// ── launch preconditions ────────────────────────────────────────────────────

#[tokio::test]
async fn each_launch_precondition_has_its_own_diagnostic() {
    let worker = ScriptedWorker::new(vec![]);
    let (session, _data) = test_session(worker.clone()).await;

    session.whitelist().clear_selection().await;
    let err = session.start_patrol(start_request()).await.unwrap_err();
    assert!(matches!(err, SessionError::Launch(LaunchError::EmptySelection)));

    session.whitelist().select_all().await;
    session.devices().toggle_select("dev-001").await.unwrap();
    session.devices().toggle_select("dev-002").await.unwrap();
    let err = session.start_patrol(start_request()).await.unwrap_err();
    assert!(matches!(err, SessionError::Launch(LaunchError::NoActiveDevice)));

    session.devices().toggle_select("dev-001").await.unwrap();
    session
        .whitelist()
        .update_field("1", crate::whitelist::WhitelistField::ProductName, "  ".into())
        .await
        .unwrap();
    let err = session.start_patrol(start_request()).await.unwrap_err();
    assert!(matches!(err, SessionError::Launch(LaunchError::EmptyKeyword)));

    // No worker call was made for any rejected launch, and each rejection
    // left a diagnostic in the activity log.
    assert_eq!(worker.starts.load(Ordering::SeqCst), 0);
    let entries = session.activity().snapshot_since(0).await;
    assert_eq!(
        entries
            .iter()
            .filter(|e| e.kind == LogKind::Performance && e.message.contains("无法启动巡查"))
            .count(),
        3
    );
}

#[tokio::test]
async fn keyword_falls_back_to_the_first_selected_row() {
    let worker = ScriptedWorker::new(vec![snap("task-1", "pending", 0.0)]);
    let (session, _data) = test_session(worker).await;

    let mut req = start_request();
    req.keyword = Some("   ".into());
    session.start_patrol(req).await.unwrap();
    let task = session.store().get("task-1").await.unwrap();
    assert_eq!(task.params.keyword, "2025法考全套资料");
    assert_eq!(task.params.device_id.as_deref(), Some("dev-001"));

    session.shutdown().await;
}

// ── cancellation ────────────────────────────────────────────────────────────

#[tokio::test]
async fn cancel_is_cooperative_and_waits_for_the_worker() {
    let worker = ScriptedWorker::new(vec![
        snap("task-1", "running", 0.2),
        snap("task-1", "running", 0.2),
        snap("task-1", "cancelled", 0.2),
    ]);
    let (session, _data) = test_session(worker.clone()).await;

    session.start_patrol(start_request()).await.unwrap();
    session.cancel("task-1").await.unwrap();

    // Intent is recorded immediately, status only once the worker confirms.
    let task = session.store().get("task-1").await.unwrap();
    assert!(task.cancel_requested);

    let task = wait_for_status(session.store(), "task-1", TaskStatus::is_terminal).await;
    assert_eq!(task.status, TaskStatus::Cancelled);
    assert_eq!(worker.cancels.load(Ordering::SeqCst), 1);

    // Cancelling a settled task is rejected with the terminal status.
    let err = session.cancel("task-1").await.unwrap_err();
    assert!(matches!(err, SessionError::AlreadyTerminal { status: "cancelled", .. }));

    let err = session.cancel("task-404").await.unwrap_err();
    assert!(matches!(err, SessionError::TaskNotFound { .. }));
}

// ── observation window ──────────────────────────────────────────────────────

#[tokio::test]
async fn elapsed_observation_window_stops_polling_without_failing_the_task() {
    let worker = ScriptedWorker::new(vec![snap("task-1", "running", 0.5)]);
    let (session, _data) = test_session(worker).await;
    let session = session.with_watch_config(WatchConfig {
        interval: Duration::from_millis(10),
        timeout: Duration::from_millis(60),
        history_limit: 5,
    });

    session.start_patrol(start_request()).await.unwrap();
    timeout(GRACE, async {
        loop {
            let noisy = session
                .activity()
                .snapshot_since(0)
                .await
                .iter()
                .any(|e| e.message.contains("超时"));
            if noisy {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("timeout diagnostic never appeared");

    // The task is not failed locally, and a late terminal report still lands.
    let task = session.store().get("task-1").await.unwrap();
    assert_eq!(task.status, TaskStatus::Running);

    let effective = session
        .store()
        .apply_snapshot(&completed_snap("task-1", patrol_result()))
        .await;
    assert!(matches!(effective, Some(TaskStatus::Completed { .. })));
}

#[tokio::test]
async fn late_completion_unblocks_the_next_launch_after_a_timeout() {
    let worker = ScriptedWorker::new(vec![snap("task-1", "running", 0.5)]);
    let (session, _data) = test_session(worker.clone()).await;
    let session = session.with_watch_config(WatchConfig {
        interval: Duration::from_millis(10),
        timeout: Duration::from_millis(60),
        history_limit: 5,
    });

    session.start_patrol(start_request()).await.unwrap();
    timeout(GRACE, async {
        loop {
            let noisy = session
                .activity()
                .snapshot_since(0)
                .await
                .iter()
                .any(|e| e.message.contains("超时"));
            if noisy {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("timeout diagnostic never appeared");
    // Give the watch loop a moment to wind down after its diagnostic.
    sleep(Duration::from_millis(50)).await;

    // The worker finishes the task after polling stopped; the stored record
    // still says `running`.
    {
        let mut script = worker.script.lock().unwrap();
        script.clear();
        script.push_back(completed_snap("task-1", patrol_result()));
    }
    assert_eq!(session.store().get("task-1").await.unwrap().status, TaskStatus::Running);

    // The next launch re-checks the stale record against the worker instead
    // of rejecting on it forever.
    session
        .start_patrol(start_request())
        .await
        .expect("launch after a worker-side completion");
    assert_eq!(worker.starts.load(Ordering::SeqCst), 2);

    session.shutdown().await;
}

#[tokio::test]
async fn worker_forgetting_a_timed_out_task_does_not_block_launches() {
    let worker = ScriptedWorker::new(vec![snap("task-1", "running", 0.5)]);
    let (session, _data) = test_session(worker.clone()).await;
    let session = session.with_watch_config(WatchConfig {
        interval: Duration::from_millis(10),
        timeout: Duration::from_millis(60),
        history_limit: 5,
    });

    session.start_patrol(start_request()).await.unwrap();
    timeout(GRACE, async {
        loop {
            let noisy = session
                .activity()
                .snapshot_since(0)
                .await
                .iter()
                .any(|e| e.message.contains("超时"));
            if noisy {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("timeout diagnostic never appeared");
    sleep(Duration::from_millis(50)).await;

    // The worker dropped the task entirely; every status probe now fails
    // with task-not-found.
    worker.script.lock().unwrap().clear();

    session
        .start_patrol(start_request())
        .await
        .expect("launch after the worker lost the task");
    assert_eq!(worker.starts.load(Ordering::SeqCst), 2);
    assert!(session
        .activity()
        .snapshot_since(0)
        .await
        .iter()
        .any(|e| e.message.contains("已在巡查服务端丢失")));

    session.shutdown().await;
}

#[tokio::test]
async fn cancel_after_a_timeout_resumes_polling_until_confirmation() {
    let worker = ScriptedWorker::new(vec![snap("task-1", "running", 0.5)]);
    let (session, _data) = test_session(worker.clone()).await;
    let session = session.with_watch_config(WatchConfig {
        interval: Duration::from_millis(10),
        timeout: Duration::from_millis(60),
        history_limit: 5,
    });

    session.start_patrol(start_request()).await.unwrap();
    timeout(GRACE, async {
        loop {
            let noisy = session
                .activity()
                .snapshot_since(0)
                .await
                .iter()
                .any(|e| e.message.contains("超时"));
            if noisy {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("timeout diagnostic never appeared");
    sleep(Duration::from_millis(50)).await;

    {
        let mut script = worker.script.lock().unwrap();
        script.clear();
        script.push_back(snap("task-1", "cancelled", 0.5));
    }
    session.cancel("task-1").await.unwrap();

    // Cancellation resumes the watch so the worker's confirmation settles
    // the record even though the original loop is gone.
    let task = wait_for_status(session.store(), "task-1", TaskStatus::is_terminal).await;
    assert_eq!(task.status, TaskStatus::Cancelled);
    assert_eq!(worker.cancels.load(Ordering::SeqCst), 1);
}

// ── resilience and history ──────────────────────────────────────────────────

#[tokio::test]
async fn poll_errors_do_not_kill_the_watch_loop() {
    // An empty script makes every status poll fail until we feed one.
    let worker = ScriptedWorker::new(vec![]);
    let (session, _data) = test_session(worker.clone()).await;

    session.start_patrol(start_request()).await.unwrap();
    sleep(Duration::from_millis(50)).await;
    assert_eq!(session.store().get("task-1").await.unwrap().status, TaskStatus::Pending);

    worker.push_snapshot(completed_snap("task-1", patrol_result()));
    let task = wait_for_status(session.store(), "task-1", TaskStatus::is_terminal).await;
    assert!(matches!(task.status, TaskStatus::Completed { .. }));
}

#[tokio::test]
async fn completion_merges_worker_history_into_the_store() {
    let worker = ScriptedWorker::new(vec![completed_snap("task-1", patrol_result())]);
    let mut older = completed_snap("task-0", PatrolResult::default());
    older.created_at = Some("2026-08-20T08:00:00".into());
    worker.set_history(vec![completed_snap("task-1", patrol_result()), older]);
    let (session, _data) = test_session(worker).await;

    session.start_patrol(start_request()).await.unwrap();
    wait_for_status(session.store(), "task-1", TaskStatus::is_terminal).await;

    timeout(GRACE, async {
        while session.store().len().await != 2 {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("history merge never happened");

    let recent = session.store().recent(10).await;
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].task_id, "task-1");
    assert_eq!(recent[1].task_id, "task-0");
}

// ── worker-derived views ────────────────────────────────────────────────────

#[tokio::test]
async fn platform_catalog_falls_back_when_worker_is_down() {
    let (session, _data) = test_session(Arc::new(UnreachableWorker)).await;
    let catalog = session.platform_catalog().await;
    assert_eq!(catalog.len(), 3);
    assert!(catalog.iter().any(|p| p.key == "xianyu" && p.name == "闲鱼"));

    let status = session.refresh_device_status().await;
    assert!(!status.connected);
    assert!(status.status_message.contains("巡查服务不可用"));
}

#[tokio::test]
async fn device_probe_is_folded_into_the_fleet() {
    let worker = ScriptedWorker::new(vec![]);
    let (session, _data) = test_session(worker).await;

    let status = session.refresh_device_status().await;
    assert!(status.connected);
    assert!(session
        .devices()
        .list()
        .await
        .iter()
        .any(|d| d.id == "emulator-5554"));
}
