//! PDF summary document rendering.
//!
//! The document opens with the report counters, then tabulates the ledger
//! across as many A4 pages as needed. Chinese text needs an external TTF
//! (see `PATROL_EXPORT_FONT`); without one the built-in Helvetica is used
//! and CJK glyphs render lossily, which keeps the export usable on a bare
//! machine.

use std::path::PathBuf;

use chrono::{DateTime, Local};
use patrol_core::{ReportRecord, ReportStatistics, ReportStatus};
use printpdf::{
    BuiltinFont, IndirectFontRef, Line, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference,
    Point,
};
use serde::{Deserialize, Serialize};
use strum::Display;
use tracing::warn;

use crate::pipeline::ExportError;

/// Reporting period of a summary document. The kind labels the document;
/// the full ledger is tabulated either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ReportKind {
    Weekly,
    Monthly,
}

impl ReportKind {
    pub fn title_label(&self) -> &'static str {
        match self {
            ReportKind::Weekly => "周报",
            ReportKind::Monthly => "月报",
        }
    }
}

/// `report_<kind>_<date>.pdf`, dated in local time.
pub fn document_filename(kind: ReportKind, now: DateTime<Local>) -> String {
    format!("report_{}_{}.pdf", kind, now.format("%Y-%m-%d"))
}

// A4 geometry, in millimetres.
const PAGE_W: f32 = 210.0;
const PAGE_H: f32 = 297.0;
const MARGIN: f32 = 10.0;
const ROW_H: f32 = 7.0;

/// Column left edges: number, merchant, product, date, status.
const COL_X: [f32; 5] = [10.0, 48.0, 95.0, 160.0, 185.0];
const COL_HEADERS: [&str; 5] = ["单号", "违规商家", "涉及商品", "日期", "状态"];
/// Character budget per column before clipping.
const COL_CLIP: [usize; 5] = [18, 14, 20, 10, 4];

struct DocFonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
}

pub struct DocumentRenderer {
    font_path: Option<PathBuf>,
}

impl DocumentRenderer {
    pub fn new(font_path: Option<PathBuf>) -> Self {
        Self { font_path }
    }

    /// Renders the summary document and returns the serialized PDF bytes.
    pub fn render(
        &self,
        kind: ReportKind,
        stats: &ReportStatistics,
        records: &[ReportRecord],
        generated_at: DateTime<Local>,
    ) -> Result<Vec<u8>, ExportError> {
        let title = format!("巡查审计报告（{}）", kind.title_label());
        let (doc, first_page, first_layer) =
            PdfDocument::new(&title, mm(PAGE_W), mm(PAGE_H), "content");
        let fonts = self.load_fonts(&doc)?;
        let mut layer = doc.get_page(first_page).get_layer(first_layer);

        draw_text(&layer, &title, 16.0, MARGIN, PAGE_H - 20.0, &fonts.bold);
        draw_text(
            &layer,
            format!("生成时间: {}", generated_at.format("%Y-%m-%d %H:%M")),
            9.0,
            MARGIN,
            PAGE_H - 28.0,
            &fonts.regular,
        );

        let counters = [
            ("总举报", stats.total_reports),
            ("提交成功", stats.successful_reports),
            ("提交失败", stats.failed_reports),
            ("待处理", stats.pending_reports),
        ];
        for (i, (label, value)) in counters.iter().enumerate() {
            let x = MARGIN + i as f32 * 48.0;
            draw_text(&layer, value.to_string(), 14.0, x, PAGE_H - 42.0, &fonts.bold);
            draw_text(&layer, *label, 8.0, x, PAGE_H - 48.0, &fonts.regular);
        }

        let mut y = draw_table_header(&layer, PAGE_H - 60.0, &fonts);
        for record in records {
            if y < MARGIN + ROW_H {
                let (page, page_layer) = doc.add_page(mm(PAGE_W), mm(PAGE_H), "content");
                layer = doc.get_page(page).get_layer(page_layer);
                y = draw_table_header(&layer, PAGE_H - 15.0, &fonts);
            }
            draw_row(&layer, record, y, &fonts.regular);
            y -= ROW_H;
        }

        doc.save_to_bytes().map_err(|e| ExportError::Pdf(e.to_string()))
    }

    fn load_fonts(&self, doc: &PdfDocumentReference) -> Result<DocFonts, ExportError> {
        if let Some(path) = &self.font_path {
            match std::fs::File::open(path) {
                Ok(file) => match doc.add_external_font(file) {
                    Ok(font) => {
                        return Ok(DocFonts { regular: font.clone(), bold: font });
                    }
                    Err(err) => {
                        warn!(path = %path.display(), error = %err, "external font rejected, using Helvetica");
                    }
                },
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "font file unreadable, using Helvetica");
                }
            }
        }
        let regular = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| ExportError::Pdf(e.to_string()))?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| ExportError::Pdf(e.to_string()))?;
        Ok(DocFonts { regular, bold })
    }
}

/// Draws the column headers with an underline and returns the y of the
/// first table row beneath them.
fn draw_table_header(layer: &PdfLayerReference, y: f32, fonts: &DocFonts) -> f32 {
    for (header, x) in COL_HEADERS.iter().zip(COL_X) {
        draw_text(layer, *header, 9.0, x, y, &fonts.bold);
    }
    rule(layer, MARGIN, PAGE_W - MARGIN, y - 2.0);
    y - ROW_H
}

fn draw_row(layer: &PdfLayerReference, record: &ReportRecord, y: f32, font: &IndirectFontRef) {
    let date = record.date.with_timezone(&Local).format("%Y-%m-%d").to_string();
    let cells = [
        record.report_number.as_str(),
        record.merchant_name.as_str(),
        record.product_name.as_str(),
        date.as_str(),
        status_label(record.status),
    ];
    for ((cell, x), max) in cells.iter().zip(COL_X).zip(COL_CLIP) {
        draw_text(layer, clip(cell, max), 8.0, x, y, font);
    }
}

fn status_label(status: ReportStatus) -> &'static str {
    match status {
        ReportStatus::Pending => "待处理",
        ReportStatus::Success => "成功",
        ReportStatus::Failed => "失败",
    }
}

fn draw_text(
    layer: &PdfLayerReference,
    text: impl Into<String>,
    size: f32,
    x: f32,
    y: f32,
    font: &IndirectFontRef,
) {
    layer.use_text(text, size.into(), mm(x), mm(y), font);
}

fn rule(layer: &PdfLayerReference, x1: f32, x2: f32, y: f32) {
    layer.set_outline_thickness(0.4);
    layer.add_line(Line {
        points: vec![
            (Point::new(mm(x1), mm(y)), false),
            (Point::new(mm(x2), mm(y)), false),
        ],
        is_closed: false,
    });
}

fn mm(v: f32) -> Mm {
    Mm(v.into())
}

/// Clips to a character budget, ending clipped text with an ellipsis.
fn clip(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_owned();
    }
    let mut out: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}
