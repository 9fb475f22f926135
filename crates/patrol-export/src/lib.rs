//! Evidence export pipeline for the anti-piracy patrol product.
//!
//! Three artifact kinds, all pure functions of the report ledger: the audit
//! CSV, the time-bucketed evidence ZIP and the rendered PDF summary. The
//! [`Exporter`] facade serializes them behind one busy gate and mirrors
//! every outcome into the operator activity log.

pub mod archive;
pub mod csv;
pub mod document;
pub mod guard;
pub mod pipeline;

pub use archive::{ArchiveSummary, EvidenceArchive, EvidenceSource, HttpEvidenceSource};
pub use csv::{ledger_csv, ledger_csv_filename, LEDGER_CSV_HEADER};
pub use document::{DocumentRenderer, ReportKind};
pub use guard::{ExportGate, ExportTicket};
pub use pipeline::{ExportArtifact, ExportError, Exporter};
