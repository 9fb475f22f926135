//! Audit ledger CSV serialization.
//!
//! The format is fixed by the downstream audit tooling: UTF-8 with a BOM so
//! spreadsheet software detects the encoding, a Chinese header row, and no
//! quoting. Free-text fields are sanitized by replacing the delimiter and
//! line breaks with spaces, so re-parsing always yields one row per record.

use chrono::{DateTime, Local};
use patrol_core::ReportRecord;

/// Header row, in column order.
pub const LEDGER_CSV_HEADER: [&str; 6] =
    ["单号", "违规商家", "涉及商品", "违规判定理由", "日期", "状态"];

/// Status column value; every exported row represents a submitted takedown.
const STATUS_SUBMITTED: &str = "已提交下架";

/// Serializes ledger records into the audit CSV, in the order given. The
/// BOM and header are always present, even with zero records.
pub fn ledger_csv(records: &[ReportRecord]) -> String {
    let mut out = String::from("\u{feff}");
    out.push_str(&LEDGER_CSV_HEADER.join(","));
    for record in records {
        out.push('\n');
        let row = [
            record.report_number.clone(),
            sanitize_field(&record.merchant_name),
            sanitize_field(&record.product_name),
            sanitize_field(&record.reason),
            record.date.with_timezone(&Local).format("%Y-%m-%d").to_string(),
            STATUS_SUBMITTED.to_owned(),
        ];
        out.push_str(&row.join(","));
    }
    out
}

/// `audit-ledger_<date>.csv`, dated in local time.
pub fn ledger_csv_filename(now: DateTime<Local>) -> String {
    format!("audit-ledger_{}.csv", now.format("%Y-%m-%d"))
}

/// Replaces the delimiter and line breaks with spaces. Lossy on purpose:
/// the format has no quoting, and field text must never change the row or
/// column count.
fn sanitize_field(field: &str) -> String {
    field.replace(['\r', '\n', ','], " ")
}
