//! Wire schemas for the export endpoints.

use patrol_export::{ExportArtifact, ReportKind};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Body of `POST /api/exports/document`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct DocumentExportRequest {
    #[schema(value_type = String, example = "weekly")]
    pub report_type: ReportKind,
}

/// A finished artifact: where it landed and how large it is.
#[derive(Debug, Serialize, ToSchema)]
pub struct ExportResponse {
    pub filename: String,
    pub path: String,
    pub bytes: u64,
}

impl From<ExportArtifact> for ExportResponse {
    fn from(artifact: ExportArtifact) -> Self {
        Self {
            filename: artifact.filename,
            path: artifact.path.display().to_string(),
            bytes: artifact.bytes,
        }
    }
}
