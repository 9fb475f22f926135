//! Export facade: one entry point per artifact kind.
//!
//! The facade owns the shared busy gate, stages artifacts into the export
//! directory and mirrors every outcome (including rejections) into the
//! operator activity log. Document rendering goes through a scratch
//! directory that is removed on every path; the finished file is renamed
//! into place so a crashed export never leaves a half-written artifact.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use patrol_core::config::CoreConfig;
use patrol_core::{ActivityLog, LogKind, ReportLedger};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::archive::{archive_filename, EvidenceArchive, EvidenceSource, HttpEvidenceSource};
use crate::csv::{ledger_csv, ledger_csv_filename};
use crate::document::{document_filename, DocumentRenderer, ReportKind};
use crate::guard::{ExportGate, ExportTicket};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("已有导出任务进行中，请稍后再试")]
    Busy,
    #[error("export I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("archive encoding failed: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("document rendering failed: {0}")]
    Pdf(String),
}

/// A finished export artifact on disk.
#[derive(Debug, Clone)]
pub struct ExportArtifact {
    pub filename: String,
    pub path: PathBuf,
    pub bytes: u64,
}

/// Runs the three export operations against the report ledger.
pub struct Exporter {
    gate: ExportGate,
    archive: EvidenceArchive,
    renderer: DocumentRenderer,
    export_dir: PathBuf,
    ledger: ReportLedger,
    activity: ActivityLog,
}

impl Exporter {
    pub fn new(config: &CoreConfig, ledger: ReportLedger, activity: ActivityLog) -> Self {
        let source: Arc<dyn EvidenceSource> =
            Arc::new(HttpEvidenceSource::new(config.worker_timeout()));
        Self::with_source(config, ledger, activity, source)
    }

    /// Same as [`Exporter::new`] with an explicit evidence source, used by
    /// tests and by deployments serving evidence from a local cache.
    pub fn with_source(
        config: &CoreConfig,
        ledger: ReportLedger,
        activity: ActivityLog,
        source: Arc<dyn EvidenceSource>,
    ) -> Self {
        Self {
            gate: ExportGate::new(),
            archive: EvidenceArchive::new(source),
            renderer: DocumentRenderer::new(config.export_font.clone()),
            export_dir: config.export_dir.clone(),
            ledger,
            activity,
        }
    }

    /// Busy indicator for the GUI.
    pub fn gate(&self) -> &ExportGate {
        &self.gate
    }

    /// Serializes the full ledger into the audit CSV.
    pub async fn export_ledger(&self) -> Result<ExportArtifact, ExportError> {
        let _ticket = self.claim("审计报表").await?;
        let outcome = self.build_ledger().await;
        self.log_outcome("审计报表", &outcome).await;
        outcome
    }

    /// Assembles the time-bucketed evidence ZIP.
    pub async fn export_evidence(&self) -> Result<ExportArtifact, ExportError> {
        let _ticket = self.claim("证据包").await?;
        let outcome = self.build_evidence().await;
        self.log_outcome("证据包", &outcome).await;
        outcome
    }

    /// Renders the weekly/monthly PDF summary.
    pub async fn export_document(&self, kind: ReportKind) -> Result<ExportArtifact, ExportError> {
        let label = kind.title_label();
        let _ticket = self.claim(label).await?;
        let outcome = self.build_document(kind).await;
        self.log_outcome(label, &outcome).await;
        outcome
    }

    async fn claim(&self, label: &str) -> Result<ExportTicket, ExportError> {
        match self.gate.try_acquire() {
            Some(ticket) => Ok(ticket),
            None => {
                self.activity
                    .record(
                        LogKind::Performance,
                        format!("❌ 无法导出{label}: 已有导出任务进行中"),
                    )
                    .await;
                Err(ExportError::Busy)
            }
        }
    }

    async fn build_ledger(&self) -> Result<ExportArtifact, ExportError> {
        let records = self.ledger.all().await;
        let csv = ledger_csv(&records);
        self.write_artifact(ledger_csv_filename(Local::now()), csv.into_bytes())
            .await
    }

    async fn build_evidence(&self) -> Result<ExportArtifact, ExportError> {
        let records = self.ledger.all().await;
        let (bytes, summary) = self.archive.build(&records).await?;
        let artifact = self
            .write_artifact(archive_filename(Local::now()), bytes)
            .await?;
        info!(
            reports = summary.reports,
            images = summary.images,
            placeholders = summary.placeholders,
            filename = %artifact.filename,
            "evidence archive exported"
        );
        Ok(artifact)
    }

    async fn build_document(&self, kind: ReportKind) -> Result<ExportArtifact, ExportError> {
        let stats = self.ledger.statistics().await;
        let records = self.ledger.all().await;
        let generated_at = Local::now();
        let bytes = self.renderer.render(kind, &stats, &records, generated_at)?;
        let filename = document_filename(kind, generated_at);

        // Stage in a scratch dir under the export dir so the final rename
        // stays on one filesystem. The guard removes the scratch dir on
        // every path out of this function.
        tokio::fs::create_dir_all(&self.export_dir).await?;
        let scratch = ScratchDir::create(&self.export_dir).await?;
        let staged = scratch.path().join(&filename);
        tokio::fs::write(&staged, &bytes).await?;

        let path = self.export_dir.join(&filename);
        tokio::fs::rename(&staged, &path).await?;
        Ok(ExportArtifact { filename, path, bytes: bytes.len() as u64 })
    }

    async fn write_artifact(
        &self,
        filename: String,
        data: Vec<u8>,
    ) -> Result<ExportArtifact, ExportError> {
        tokio::fs::create_dir_all(&self.export_dir).await?;
        let path = self.export_dir.join(&filename);
        tokio::fs::write(&path, &data).await?;
        Ok(ExportArtifact { filename, path, bytes: data.len() as u64 })
    }

    async fn log_outcome(&self, label: &str, outcome: &Result<ExportArtifact, ExportError>) {
        match outcome {
            Ok(artifact) => {
                self.activity
                    .record(
                        LogKind::Action,
                        format!(
                            "✅ {label}导出完成: {} ({} 字节)",
                            artifact.filename, artifact.bytes
                        ),
                    )
                    .await;
            }
            Err(err) => {
                self.activity
                    .record(LogKind::Performance, format!("❌ {label}导出失败: {err}"))
                    .await;
            }
        }
    }
}

/// Scratch rendering area removed on drop, success or not.
struct ScratchDir(PathBuf);

impl ScratchDir {
    async fn create(parent: &Path) -> std::io::Result<Self> {
        let dir = parent.join(format!(".render-{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self(dir))
    }

    fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use async_trait::async_trait;
    use bytes::Bytes;
    use chrono::Utc;
    use patrol_core::{
        DetectionResult, PatrolParams, PatrolResult, Platform,
    };

    struct EmptySource;

    #[async_trait]
    impl EvidenceSource for EmptySource {
        async fn fetch(&self, reference: &str) -> anyhow::Result<Bytes> {
            anyhow::bail!("no evidence for {reference}")
        }
    }

    fn test_config(root: &Path) -> CoreConfig {
        CoreConfig {
            data_dir: root.join("data"),
            export_dir: root.join("exports"),
            ..CoreConfig::default()
        }
    }

    async fn exporter_with(root: &Path, seed_reports: usize) -> (Exporter, ActivityLog) {
        let config = test_config(root);
        let ledger = ReportLedger::load(config.ledger_path()).await.unwrap();
        if seed_reports > 0 {
            let params = PatrolParams {
                platform: Platform::Xianyu,
                keyword: "法考资料".into(),
                max_items: 10,
                test_mode: true,
                device_id: None,
                device_type: Some("adb".into()),
            };
            let result = PatrolResult {
                details: (0..seed_reports)
                    .map(|n| DetectionResult {
                        title: format!("盗版资料 {n}"),
                        shop_name: "某某书屋".into(),
                        price: 9.9,
                        is_piracy: true,
                        confidence: 0.9,
                        reasons: vec!["价格异常".into()],
                        report_status: None,
                    })
                    .collect(),
                ..Default::default()
            };
            ledger.ingest_result(&params, &result, Utc::now()).await.unwrap();
        }
        let activity = ActivityLog::new();
        let exporter =
            Exporter::with_source(&config, ledger, activity.clone(), Arc::new(EmptySource));
        (exporter, activity)
    }

    fn temp_root() -> PathBuf {
        std::env::temp_dir().join(format!("patrol-export-{}", Uuid::new_v4()))
    }

    #[tokio::test]
    async fn empty_ledger_exports_header_only_csv() {
        let root = temp_root();
        let (exporter, activity) = exporter_with(&root, 0).await;

        let artifact = exporter.export_ledger().await.unwrap();
        let content = std::fs::read_to_string(&artifact.path).unwrap();
        assert_eq!(
            content.trim_start_matches('\u{feff}'),
            "单号,违规商家,涉及商品,违规判定理由,日期,状态"
        );

        let logged = activity.snapshot_since(0).await;
        assert_eq!(logged.len(), 1);
        assert!(logged[0].message.contains("✅ 审计报表导出完成"));

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn second_export_is_rejected_while_one_is_in_flight() {
        let root = temp_root();
        let (exporter, activity) = exporter_with(&root, 1).await;

        let held = exporter.gate().try_acquire().unwrap();
        match exporter.export_ledger().await {
            Err(ExportError::Busy) => {}
            other => panic!("expected busy rejection, got {other:?}"),
        }
        let logged = activity.snapshot_since(0).await;
        assert!(logged.iter().any(|e| e.message.contains("已有导出任务进行中")));

        drop(held);
        assert!(exporter.export_ledger().await.is_ok());
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn evidence_export_tolerates_missing_screenshots() {
        let root = temp_root();
        let (exporter, _activity) = exporter_with(&root, 2).await;

        let artifact = exporter.export_evidence().await.unwrap();
        assert!(artifact.filename.starts_with("Batch_Evidence_"));
        assert!(artifact.bytes > 0);
        assert!(artifact.path.exists());
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn document_export_cleans_its_scratch_area() {
        let root = temp_root();
        let (exporter, activity) = exporter_with(&root, 3).await;

        let artifact = exporter.export_document(ReportKind::Weekly).await.unwrap();
        assert!(artifact.filename.starts_with("report_weekly_"));
        assert!(artifact.path.exists());

        // Nothing but finished artifacts remains in the export dir.
        let leftovers: Vec<_> = std::fs::read_dir(root.join("exports"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".render-"))
            .collect();
        assert!(leftovers.is_empty());

        let logged = activity.snapshot_since(0).await;
        assert!(logged.iter().any(|e| e.message.contains("✅ 周报导出完成")));
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn exports_run_sequentially_after_each_other() {
        let root = temp_root();
        let (exporter, _activity) = exporter_with(&root, 1).await;

        exporter.export_ledger().await.unwrap();
        exporter.export_evidence().await.unwrap();
        exporter.export_document(ReportKind::Monthly).await.unwrap();
        assert!(!exporter.gate().is_busy());

        let names: HashMap<String, u64> = std::fs::read_dir(root.join("exports"))
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| {
                (
                    e.file_name().to_string_lossy().into_owned(),
                    e.metadata().map(|m| m.len()).unwrap_or(0),
                )
            })
            .collect();
        assert_eq!(names.len(), 3);
        assert!(names.values().all(|&len| len > 0));
        let _ = std::fs::remove_dir_all(&root);
    }
}
