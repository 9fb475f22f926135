//! HTTP transport for the patrol worker's REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use tracing::debug;

use crate::logs::LogEntry;
use crate::runtime::types::PatrolParams;

use super::{
    DeviceStatus, PlatformInfo, RawLogEntry, TaskHandle, TaskSnapshot, WorkerClient, WorkerError,
};

const USER_AGENT: &str = concat!("patrol-core/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// [`WorkerClient`] over the worker's HTTP API.
///
/// Holds a single pooled [`Client`]; cloning is cheap and shares the pool.
#[derive(Debug, Clone)]
pub struct HttpWorker {
    base: String,
    client: Client,
}

impl HttpWorker {
    /// `base_url` is the worker root, e.g. `http://127.0.0.1:8000`.
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            base: base_url.trim_end_matches('/').to_owned(),
            client,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// Folds a transport error into the worker error taxonomy. Anything that
    /// prevents an HTTP exchange counts as the worker being unavailable.
    fn transport_error(err: reqwest::Error) -> WorkerError {
        WorkerError::Unavailable { reason: err.to_string() }
    }

    /// Maps a non-success status to a [`WorkerError`]. `task_id` scopes 404s
    /// to the task-not-found case on per-task endpoints.
    fn status_error(status: StatusCode, detail: String, task_id: Option<&str>) -> WorkerError {
        match status {
            StatusCode::NOT_FOUND => match task_id {
                Some(task_id) => WorkerError::TaskNotFound { task_id: task_id.to_owned() },
                None => WorkerError::Rejected { detail },
            },
            StatusCode::CONFLICT => WorkerError::TaskAlreadyRunning,
            s if s.is_client_error() => WorkerError::Rejected { detail },
            s => WorkerError::Unavailable { reason: format!("worker returned {s}: {detail}") },
        }
    }

    /// Extracts the FastAPI-style `{"detail": ...}` message, falling back to
    /// the raw body text.
    async fn read_detail(response: Response) -> String {
        let text = response.text().await.unwrap_or_default();
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&text) {
            if let Some(detail) = value.get("detail").and_then(|d| d.as_str()) {
                return detail.to_owned();
            }
        }
        let trimmed = text.trim();
        if trimmed.is_empty() {
            "no detail".to_owned()
        } else {
            trimmed.to_owned()
        }
    }

    async fn check(
        response: Response,
        task_id: Option<&str>,
    ) -> Result<Response, WorkerError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let detail = Self::read_detail(response).await;
        debug!(%status, %detail, "worker call rejected");
        Err(Self::status_error(status, detail, task_id))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        task_id: Option<&str>,
    ) -> Result<T, WorkerError> {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(Self::transport_error)?;
        let response = Self::check(response, task_id).await?;
        response
            .json()
            .await
            .map_err(|e| WorkerError::Protocol { detail: e.to_string() })
    }

    async fn fetch_raw_logs(
        &self,
        path: &str,
        task_id: &str,
    ) -> Result<Vec<LogEntry>, WorkerError> {
        let raw: Vec<RawLogEntry> = self.get_json(path, Some(task_id)).await?;
        Ok(raw.into_iter().map(LogEntry::from).collect())
    }
}

#[async_trait]
impl WorkerClient for HttpWorker {
    async fn start_patrol(&self, params: &PatrolParams) -> Result<TaskHandle, WorkerError> {
        let response = self
            .client
            .post(self.url("/api/patrol/start"))
            .json(params)
            .send()
            .await
            .map_err(Self::transport_error)?;
        let response = Self::check(response, None).await?;
        response
            .json()
            .await
            .map_err(|e| WorkerError::Protocol { detail: e.to_string() })
    }

    async fn get_status(&self, task_id: &str) -> Result<TaskSnapshot, WorkerError> {
        self.get_json(&format!("/api/patrol/{task_id}"), Some(task_id))
            .await
    }

    async fn list_tasks(&self, limit: usize) -> Result<Vec<TaskSnapshot>, WorkerError> {
        self.get_json(&format!("/api/patrol/?limit={limit}"), None)
            .await
    }

    async fn cancel(&self, task_id: &str) -> Result<(), WorkerError> {
        let response = self
            .client
            .delete(self.url(&format!("/api/patrol/{task_id}")))
            .send()
            .await
            .map_err(Self::transport_error)?;
        Self::check(response, Some(task_id)).await?;
        Ok(())
    }

    async fn get_logs(&self, task_id: &str, since: usize) -> Result<Vec<LogEntry>, WorkerError> {
        self.fetch_raw_logs(&format!("/api/patrol/{task_id}/logs?since={since}"), task_id)
            .await
    }

    async fn get_new_logs(&self, task_id: &str) -> Result<Vec<LogEntry>, WorkerError> {
        self.fetch_raw_logs(&format!("/api/patrol/{task_id}/logs/new"), task_id)
            .await
    }

    async fn get_platforms(&self) -> Result<Vec<PlatformInfo>, WorkerError> {
        self.get_json("/api/config/platforms", None).await
    }

    async fn get_device_status(&self) -> Result<DeviceStatus, WorkerError> {
        self.get_json("/api/config/device/status", None).await
    }
}
