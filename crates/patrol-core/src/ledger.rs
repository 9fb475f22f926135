//! Ledger of takedown reports produced by completed patrols.
//!
//! Every piracy detection in a completed result becomes one ledger record.
//! Records persist to a JSON file and feed both the GUI history views and
//! the export pipeline.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::runtime::types::{PatrolParams, PatrolResult, Platform};

/// Submission state of a takedown report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ReportStatus {
    #[default]
    Pending,
    Success,
    Failed,
}

impl ReportStatus {
    fn from_wire(raw: Option<&str>) -> Self {
        match raw {
            Some("success") => ReportStatus::Success,
            Some("failed") => ReportStatus::Failed,
            _ => ReportStatus::Pending,
        }
    }
}

/// One filed takedown report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRecord {
    pub id: String,
    /// Operator-facing number, `RP-YYYYMMDD-NNN`, sequenced per local day.
    pub report_number: String,
    pub platform: Platform,
    pub merchant_name: String,
    pub product_name: String,
    pub price: f64,
    /// Estimated revenue protected by the takedown.
    #[serde(default)]
    pub loss_prevented: f64,
    pub reason: String,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub status: ReportStatus,
    /// Evidence references: http(s) URLs or local file paths.
    #[serde(default)]
    pub screenshots: Vec<String>,
}

/// Aggregate counters over the ledger.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportStatistics {
    pub total_reports: u64,
    pub successful_reports: u64,
    pub failed_reports: u64,
    pub pending_reports: u64,
    pub by_platform: BTreeMap<String, u64>,
    pub by_status: BTreeMap<String, u64>,
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("failed to persist report ledger: {0}")]
    Persist(String),
}

/// Shared, clonable report ledger backed by a JSON file.
#[derive(Clone)]
pub struct ReportLedger {
    records: Arc<RwLock<Vec<ReportRecord>>>,
    path: Arc<PathBuf>,
}

impl ReportLedger {
    /// Loads the ledger from `path`; a missing file starts empty.
    pub async fn load(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let records = if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            let bytes = tokio::fs::read(&path).await?;
            let records: Vec<ReportRecord> = serde_json::from_slice(&bytes)?;
            info!(path = %path.display(), records = records.len(), "loaded report ledger");
            records
        } else {
            Vec::new()
        };
        Ok(Self {
            records: Arc::new(RwLock::new(records)),
            path: Arc::new(path),
        })
    }

    async fn save(&self, records: &[ReportRecord]) -> Result<(), LedgerError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LedgerError::Persist(e.to_string()))?;
        }
        let bytes = serde_json::to_vec_pretty(records)
            .map_err(|e| LedgerError::Persist(e.to_string()))?;
        tokio::fs::write(self.path.as_ref(), bytes)
            .await
            .map_err(|e| LedgerError::Persist(e.to_string()))
    }

    /// Turns the piracy detections of a completed result into ledger records
    /// and returns the ones created.
    ///
    /// Non-piracy detections are skipped. Reports are numbered per local day
    /// in arrival order; the loss estimate is the listing price (one avoided
    /// sale per takedown).
    pub async fn ingest_result(
        &self,
        params: &PatrolParams,
        result: &PatrolResult,
        completed_at: DateTime<Utc>,
    ) -> Result<Vec<ReportRecord>, LedgerError> {
        let mut records = self.records.write().await;
        let mut created = Vec::new();
        for detail in result.details.iter().filter(|d| d.is_piracy) {
            let reason = if detail.reasons.is_empty() {
                "疑似盗版".to_owned()
            } else {
                detail.reasons.join("; ")
            };
            let record = ReportRecord {
                id: Uuid::new_v4().to_string(),
                report_number: next_report_number(&records, completed_at),
                platform: params.platform,
                merchant_name: detail.shop_name.clone(),
                product_name: detail.title.clone(),
                price: detail.price,
                loss_prevented: detail.price,
                reason,
                date: completed_at,
                status: ReportStatus::from_wire(detail.report_status.as_deref()),
                screenshots: Vec::new(),
            };
            records.push(record.clone());
            created.push(record);
        }
        if !created.is_empty() {
            self.save(&records).await?;
            info!(created = created.len(), "ingested patrol detections into ledger");
        }
        Ok(created)
    }

    /// Appends a single record, e.g. one filed manually by the operator.
    pub async fn add(&self, record: ReportRecord) -> Result<(), LedgerError> {
        let mut records = self.records.write().await;
        records.push(record);
        self.save(&records).await
    }

    /// Most recent records first, bounded by `limit`.
    pub async fn recent(&self, limit: usize) -> Vec<ReportRecord> {
        let records = self.records.read().await;
        let mut sorted: Vec<ReportRecord> = records.clone();
        sorted.sort_by(|a, b| b.date.cmp(&a.date));
        sorted.truncate(limit);
        sorted
    }

    pub async fn all(&self) -> Vec<ReportRecord> {
        self.records.read().await.clone()
    }

    pub async fn statistics(&self) -> ReportStatistics {
        let records = self.records.read().await;
        let mut stats = ReportStatistics {
            total_reports: records.len() as u64,
            ..Default::default()
        };
        for record in records.iter() {
            match record.status {
                ReportStatus::Success => stats.successful_reports += 1,
                ReportStatus::Failed => stats.failed_reports += 1,
                ReportStatus::Pending => stats.pending_reports += 1,
            }
            *stats
                .by_platform
                .entry(record.platform.to_string())
                .or_default() += 1;
            *stats
                .by_status
                .entry(record.status.to_string())
                .or_default() += 1;
        }
        stats
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

/// Next `RP-YYYYMMDD-NNN` number for the given day, sequenced by how many
/// records already carry that day's prefix.
fn next_report_number(records: &[ReportRecord], date: DateTime<Utc>) -> String {
    let day = date.with_timezone(&Local).format("%Y%m%d").to_string();
    let prefix = format!("RP-{day}-");
    let next = records
        .iter()
        .filter(|r| r.report_number.starts_with(&prefix))
        .count()
        + 1;
    format!("{prefix}{next:03}")
}
