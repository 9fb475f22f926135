//! Evidence archive (ZIP) assembly.
//!
//! Reports are grouped into three-hour capture buckets by their local
//! timestamp, one folder per report inside each bucket. Screenshots are
//! normalized to PNG; anything that cannot be fetched or decoded becomes a
//! placeholder text file so the archive structure itself never depends on
//! evidence availability.

use std::collections::BTreeMap;
use std::io::{Cursor, Write};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Local, NaiveDate, Timelike};
use patrol_core::ReportRecord;
use tracing::{debug, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::pipeline::ExportError;

const PLACEHOLDER_TEXT: &str = "Placeholder content";
const PNG_MAGIC: [u8; 4] = [0x89, b'P', b'N', b'G'];

/// Where evidence bytes come from. References are http(s) URLs or local
/// file paths; sources may support either or both.
#[async_trait]
pub trait EvidenceSource: Send + Sync {
    async fn fetch(&self, reference: &str) -> anyhow::Result<Bytes>;
}

/// Default source: URLs over HTTP, anything else read from the filesystem.
pub struct HttpEvidenceSource {
    client: reqwest::Client,
}

impl HttpEvidenceSource {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("patrol-export/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

#[async_trait]
impl EvidenceSource for HttpEvidenceSource {
    async fn fetch(&self, reference: &str) -> anyhow::Result<Bytes> {
        if reference.starts_with("http://") || reference.starts_with("https://") {
            let response = self.client.get(reference).send().await?.error_for_status()?;
            Ok(response.bytes().await?)
        } else {
            Ok(Bytes::from(tokio::fs::read(reference).await?))
        }
    }
}

/// Start hour of the three-hour capture bucket containing `hour`.
fn bucket_start(hour: u32) -> u32 {
    3 * (hour / 3)
}

/// Folder name for a capture bucket, e.g. `2026-08-22_06h-09h`.
pub fn bucket_folder(date: NaiveDate, hour: u32) -> String {
    let start = bucket_start(hour);
    format!("{}_{:02}h-{:02}h", date.format("%Y-%m-%d"), start, start + 3)
}

/// `Batch_Evidence_<date>.zip`, dated in local time.
pub fn archive_filename(now: DateTime<Local>) -> String {
    format!("Batch_Evidence_{}.zip", now.format("%Y-%m-%d"))
}

/// What went into an assembled archive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArchiveSummary {
    pub reports: usize,
    pub images: usize,
    pub placeholders: usize,
}

pub struct EvidenceArchive {
    source: Arc<dyn EvidenceSource>,
}

impl EvidenceArchive {
    pub fn new(source: Arc<dyn EvidenceSource>) -> Self {
        Self { source }
    }

    /// Assembles the archive in memory and returns its bytes plus a summary.
    /// Zero records produce a valid empty archive.
    pub async fn build(
        &self,
        records: &[ReportRecord],
    ) -> Result<(Vec<u8>, ArchiveSummary), ExportError> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut summary = ArchiveSummary::default();

        // BTreeMap keeps bucket order deterministic across runs.
        let mut buckets: BTreeMap<(NaiveDate, u32), Vec<&ReportRecord>> = BTreeMap::new();
        for record in records {
            let local = record.date.with_timezone(&Local);
            buckets
                .entry((local.date_naive(), bucket_start(local.hour())))
                .or_default()
                .push(record);
        }

        for ((date, start), bucket) in buckets {
            let folder = bucket_folder(date, start);
            for record in bucket {
                summary.reports += 1;
                let report_dir = format!("{folder}/{}", record.report_number);
                if record.screenshots.is_empty() {
                    zip.start_file(format!("{report_dir}/evidence_01.txt"), options)?;
                    zip.write_all(PLACEHOLDER_TEXT.as_bytes())?;
                    summary.placeholders += 1;
                    continue;
                }
                for (index, reference) in record.screenshots.iter().enumerate() {
                    let seq = index + 1;
                    match self.fetch_png(reference).await {
                        Ok(png) => {
                            zip.start_file(format!("{report_dir}/evidence_{seq:02}.png"), options)?;
                            zip.write_all(&png)?;
                            summary.images += 1;
                        }
                        Err(err) => {
                            warn!(
                                reference = %reference,
                                error = %err,
                                "evidence unavailable, writing placeholder"
                            );
                            zip.start_file(format!("{report_dir}/evidence_{seq:02}.txt"), options)?;
                            zip.write_all(PLACEHOLDER_TEXT.as_bytes())?;
                            summary.placeholders += 1;
                        }
                    }
                }
            }
        }

        let cursor = zip.finish()?;
        debug!(
            reports = summary.reports,
            images = summary.images,
            placeholders = summary.placeholders,
            "evidence archive assembled"
        );
        Ok((cursor.into_inner(), summary))
    }

    async fn fetch_png(&self, reference: &str) -> anyhow::Result<Vec<u8>> {
        let bytes = self.source.fetch(reference).await?;
        normalize_png(&bytes)
    }
}

/// Returns PNG bytes: pass-through when already PNG, re-encoded otherwise.
/// Fails when the bytes decode as no supported image.
fn normalize_png(bytes: &[u8]) -> anyhow::Result<Vec<u8>> {
    if bytes.starts_with(&PNG_MAGIC) {
        return Ok(bytes.to_vec());
    }
    let decoded = image::load_from_memory(bytes)?;
    let mut out = Cursor::new(Vec::new());
    decoded.write_to(&mut out, image::ImageFormat::Png)?;
    Ok(out.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Read;

    use chrono::{TimeZone, Utc};
    use patrol_core::{Platform, ReportStatus};
    use zip::ZipArchive;

    struct StaticSource(HashMap<String, Vec<u8>>);

    #[async_trait]
    impl EvidenceSource for StaticSource {
        async fn fetch(&self, reference: &str) -> anyhow::Result<Bytes> {
            self.0
                .get(reference)
                .cloned()
                .map(Bytes::from)
                .ok_or_else(|| anyhow::anyhow!("missing evidence: {reference}"))
        }
    }

    fn png_bytes() -> Vec<u8> {
        let img = image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
            2,
            2,
            image::Rgb([200, 16, 16]),
        ));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn jpeg_bytes() -> Vec<u8> {
        let img = image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
            2,
            2,
            image::Rgb([16, 16, 200]),
        ));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Jpeg).unwrap();
        out.into_inner()
    }

    fn record(report_number: &str, screenshots: Vec<&str>) -> ReportRecord {
        ReportRecord {
            id: report_number.to_owned(),
            report_number: report_number.to_owned(),
            platform: Platform::Xianyu,
            merchant_name: "书摊".to_owned(),
            product_name: "法考资料".to_owned(),
            price: 9.9,
            loss_prevented: 9.9,
            reason: "价格异常".to_owned(),
            date: Utc.with_ymd_and_hms(2026, 8, 22, 6, 30, 0).unwrap(),
            status: ReportStatus::Pending,
            screenshots: screenshots.into_iter().map(str::to_owned).collect(),
        }
    }

    #[test]
    fn buckets_are_three_hours_wide() {
        let date = NaiveDate::from_ymd_opt(2026, 8, 22).unwrap();
        assert_eq!(bucket_folder(date, 0), "2026-08-22_00h-03h");
        assert_eq!(bucket_folder(date, 2), "2026-08-22_00h-03h");
        assert_eq!(bucket_folder(date, 14), "2026-08-22_12h-15h");
        assert_eq!(bucket_folder(date, 23), "2026-08-22_21h-24h");
    }

    #[tokio::test]
    async fn archive_layout_and_placeholders() {
        let mut evidence = HashMap::new();
        evidence.insert("shot-a.png".to_owned(), png_bytes());
        evidence.insert("shot-b.jpg".to_owned(), jpeg_bytes());
        let archive = EvidenceArchive::new(Arc::new(StaticSource(evidence)));

        let records = vec![
            record("RP-20260822-001", vec!["shot-a.png", "shot-b.jpg"]),
            record("RP-20260822-002", vec!["gone.png"]),
            record("RP-20260822-003", vec![]),
        ];
        let (bytes, summary) = archive.build(&records).await.unwrap();
        assert_eq!(summary, ArchiveSummary { reports: 3, images: 2, placeholders: 2 });

        let local = records[0].date.with_timezone(&Local);
        let folder = bucket_folder(local.date_naive(), local.hour());

        let mut zip = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let names: Vec<String> = (0..zip.len())
            .map(|i| zip.by_index(i).unwrap().name().to_owned())
            .collect();
        assert!(names.contains(&format!("{folder}/RP-20260822-001/evidence_01.png")));
        assert!(names.contains(&format!("{folder}/RP-20260822-001/evidence_02.png")));
        assert!(names.contains(&format!("{folder}/RP-20260822-002/evidence_01.txt")));
        assert!(names.contains(&format!("{folder}/RP-20260822-003/evidence_01.txt")));

        // The JPEG screenshot was re-encoded: everything stored is PNG.
        let mut converted = zip
            .by_name(&format!("{folder}/RP-20260822-001/evidence_02.png"))
            .unwrap();
        let mut head = [0u8; 4];
        converted.read_exact(&mut head).unwrap();
        assert_eq!(head, PNG_MAGIC);
    }

    #[tokio::test]
    async fn empty_ledger_yields_a_valid_empty_archive() {
        let archive = EvidenceArchive::new(Arc::new(StaticSource(HashMap::new())));
        let (bytes, summary) = archive.build(&[]).await.unwrap();
        assert_eq!(summary, ArchiveSummary::default());

        let zip = ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(zip.len(), 0);
    }

    #[test]
    fn normalize_rejects_non_images() {
        assert!(normalize_png(b"definitely not an image").is_err());
        let png = png_bytes();
        assert_eq!(normalize_png(&png).unwrap(), png);
    }
}
