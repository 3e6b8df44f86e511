//! Embedded capture-date extraction from EXIF containers and XMP packets.

use crate::config::{ExtractionConfig, YearRange};
use crate::models::FileRecord;
use anyhow::Context;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::BTreeMap;
use std::fs;
use std::io::{IsTerminal, Read};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

const XMP_OPEN: &[u8] = b"<x:xmpmeta";
const XMP_CLOSE: &[u8] = b"</x:xmpmeta>";

/// XMP properties that carry a capture date, by preference.
const XMP_DATE_PROPERTIES: &[(&str, usize)] = &[
    ("exif:DateTimeOriginal", 0),
    ("photoshop:DateCreated", 0),
    ("exif:DateTimeDigitized", 1),
    ("xmp:CreateDate", 1),
    ("tiff:DateTime", 2),
    ("xmp:ModifyDate", 2),
];

#[derive(Debug, Clone)]
pub struct MetadataExtractor {
    range: YearRange,
    max_xmp_bytes: usize,
}

impl MetadataExtractor {
    pub fn new(config: &ExtractionConfig, range: YearRange) -> Self {
        Self {
            range,
            max_xmp_bytes: config.max_xmp_bytes,
        }
    }

    /// Tries the EXIF reader, then the XMP reader. `Ok(None)` when neither
    /// yields an in-range year; `Err` only when the file cannot be read.
    pub fn capture_year(&self, path: &Path) -> anyhow::Result<Option<i32>> {
        if let Some(year) = self.exif_year(path)? {
            return Ok(Some(year));
        }
        self.xmp_year(path)
    }

    #[cfg(feature = "exif")]
    fn exif_year(&self, path: &Path) -> anyhow::Result<Option<i32>> {
        use exif::{In, Tag, Value};

        let file = fs::File::open(path).with_context(|| format!("open {}", path.display()))?;
        let mut reader = std::io::BufReader::new(file);
        let Ok(data) = exif::Reader::new().read_from_container(&mut reader) else {
            return Ok(None);
        };
        for tag in [Tag::DateTimeOriginal, Tag::DateTimeDigitized, Tag::DateTime] {
            let Some(field) = data.get_field(tag, In::PRIMARY) else {
                continue;
            };
            if let Value::Ascii(ref values) = field.value {
                let year = values
                    .first()
                    .and_then(|raw| exif::DateTime::from_ascii(raw).ok())
                    .map(|dt| i32::from(dt.year))
                    .filter(|y| self.range.contains(*y));
                if year.is_some() {
                    return Ok(year);
                }
            }
        }
        Ok(None)
    }

    #[cfg(not(feature = "exif"))]
    fn exif_year(&self, _path: &Path) -> anyhow::Result<Option<i32>> {
        Ok(None)
    }

    fn xmp_year(&self, path: &Path) -> anyhow::Result<Option<i32>> {
        let file = fs::File::open(path).with_context(|| format!("open {}", path.display()))?;
        let mut head = Vec::new();
        file.take(self.max_xmp_bytes as u64)
            .read_to_end(&mut head)
            .with_context(|| format!("read {}", path.display()))?;
        Ok(find_xmp_packet(&head).and_then(|packet| xmp_packet_year(&packet, self.range)))
    }
}

fn find_xmp_packet(bytes: &[u8]) -> Option<String> {
    let start = find(bytes, XMP_OPEN)?;
    let end = find(&bytes[start..], XMP_CLOSE)? + start + XMP_CLOSE.len();
    Some(String::from_utf8_lossy(&bytes[start..end]).into_owned())
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn date_rank(name: &[u8]) -> Option<usize> {
    XMP_DATE_PROPERTIES
        .iter()
        .find(|(prop, _)| prop.as_bytes() == name)
        .map(|(_, rank)| *rank)
}

fn leading_year(value: &str, range: YearRange) -> Option<i32> {
    let head = value.trim().get(..4)?;
    if !head.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    head.parse().ok().filter(|y| range.contains(*y))
}

fn offer(best: &mut Option<(usize, i32)>, rank: usize, value: &str, range: YearRange) {
    let Some(year) = leading_year(value, range) else {
        return;
    };
    if best.map_or(true, |(current, _)| rank < current) {
        *best = Some((rank, year));
    }
}

fn offer_attributes(start: &BytesStart, best: &mut Option<(usize, i32)>, range: YearRange) {
    for attr in start.attributes().flatten() {
        if let Some(rank) = date_rank(attr.key.as_ref()) {
            if let Ok(value) = attr.unescape_value() {
                offer(best, rank, &value, range);
            }
        }
    }
}

/// Best in-range year from an XMP packet. Dates may be element text or
/// attributes on `rdf:Description`. Malformed XML ends the scan with
/// whatever was found so far.
pub fn xmp_packet_year(packet: &str, range: YearRange) -> Option<i32> {
    let mut reader = Reader::from_str(packet);
    let mut best: Option<(usize, i32)> = None;
    let mut open: Option<usize> = None;
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                open = date_rank(e.name().as_ref());
                offer_attributes(&e, &mut best, range);
            }
            Ok(Event::Empty(e)) => offer_attributes(&e, &mut best, range),
            Ok(Event::Text(t)) => {
                if let (Some(rank), Ok(text)) = (open, t.unescape()) {
                    offer(&mut best, rank, &text, range);
                }
            }
            Ok(Event::End(_)) => open = None,
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
    }
    best.map(|(_, year)| year)
}

#[derive(Debug, Clone, Default)]
pub struct ExtractionSummary {
    pub years: BTreeMap<String, i32>,
    pub scanned: usize,
    pub failures: usize,
}

impl ExtractionSummary {
    fn record(&mut self, path: String, outcome: anyhow::Result<Option<i32>>) {
        self.scanned += 1;
        match outcome {
            Ok(Some(year)) => {
                self.years.insert(path, year);
            }
            Ok(None) => {}
            Err(e) => {
                debug!("metadata extraction failed for {}: {:#}", path, e);
                self.failures += 1;
            }
        }
    }
}

/// True when both stdin and stdout are attached to a terminal.
pub fn is_interactive() -> bool {
    std::io::stdin().is_terminal() && std::io::stdout().is_terminal()
}

/// Records worth opening for an embedded capture date.
pub fn extraction_targets(records: &[FileRecord]) -> Vec<String> {
    records
        .iter()
        .filter(|r| r.is_image())
        .map(|r| r.path.clone())
        .collect()
}

/// Extracts capture years for `paths`. Interactive runs use a bounded pool
/// of blocking workers; otherwise files are read one at a time with periodic
/// progress logs. Per-file failures are counted, never returned.
pub async fn extract_capture_years(
    paths: Vec<String>,
    extractor: MetadataExtractor,
    config: &ExtractionConfig,
    interactive: bool,
) -> anyhow::Result<ExtractionSummary> {
    let total = paths.len();
    info!("extracting embedded dates from {} files", total);

    let summary = if interactive {
        run_pool(paths, extractor, config.workers.max(1)).await?
    } else {
        run_sequential(paths, &extractor, config.progress_every.max(1))
    };

    if summary.failures > 0 {
        warn!("{} files could not be read for metadata", summary.failures);
    }
    info!(
        "found embedded dates for {} of {} files",
        summary.years.len(),
        total
    );
    Ok(summary)
}

async fn run_pool(
    paths: Vec<String>,
    extractor: MetadataExtractor,
    workers: usize,
) -> anyhow::Result<ExtractionSummary> {
    let semaphore = Arc::new(Semaphore::new(workers));
    let extractor = Arc::new(extractor);
    let mut tasks = JoinSet::new();

    for path in paths {
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .context("extraction pool closed")?;
        let extractor = extractor.clone();
        tasks.spawn_blocking(move || {
            let _permit = permit;
            let outcome = extractor.capture_year(Path::new(&path));
            (path, outcome)
        });
    }

    let mut summary = ExtractionSummary::default();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((path, outcome)) => summary.record(path, outcome),
            Err(e) => {
                debug!("extraction task panicked: {}", e);
                summary.scanned += 1;
                summary.failures += 1;
            }
        }
    }
    Ok(summary)
}

fn run_sequential(
    paths: Vec<String>,
    extractor: &MetadataExtractor,
    progress_every: usize,
) -> ExtractionSummary {
    let total = paths.len();
    let mut summary = ExtractionSummary::default();
    for (i, path) in paths.into_iter().enumerate() {
        let outcome = extractor.capture_year(Path::new(&path));
        summary.record(path, outcome);
        if (i + 1) % progress_every == 0 {
            info!("metadata progress: {}/{}", i + 1, total);
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    const RANGE: YearRange = YearRange {
        min: 1980,
        max: 2030,
    };

    fn extractor() -> MetadataExtractor {
        MetadataExtractor::new(&ExtractionConfig::default(), RANGE)
    }

    fn packet(body: &str) -> String {
        format!(
            r#"<x:xmpmeta xmlns:x="adobe:ns:meta/"><rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#">{}</rdf:RDF></x:xmpmeta>"#,
            body
        )
    }

    #[test]
    fn xmp_prefers_original_over_modify_date() {
        let xmp = packet(
            r#"<rdf:Description xmp:ModifyDate="2021-02-02T10:00:00" xmp:CreateDate="2019-05-05T10:00:00"/>
               <rdf:Description><exif:DateTimeOriginal>2014-07-04T12:00:00</exif:DateTimeOriginal></rdf:Description>"#,
        );
        assert_eq!(xmp_packet_year(&xmp, RANGE), Some(2014));
    }

    #[test]
    fn xmp_out_of_range_values_are_absent() {
        let xmp = packet(
            r#"<rdf:Description exif:DateTimeOriginal="1904-01-01T00:00:00" xmp:ModifyDate="2011-01-01"/>"#,
        );
        assert_eq!(xmp_packet_year(&xmp, RANGE), Some(2011));
        let none = packet(r#"<rdf:Description exif:DateTimeOriginal="0000:00:00"/>"#);
        assert_eq!(xmp_packet_year(&none, RANGE), None);
    }

    #[test]
    fn embedded_packet_is_found_in_binary_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.jpg");
        let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE1, 0x00, 0x10];
        bytes.extend_from_slice(
            packet(r#"<rdf:Description photoshop:DateCreated="2009-09-09"/>"#).as_bytes(),
        );
        bytes.extend_from_slice(&[0u8; 64]);
        fs::write(&path, bytes).unwrap();

        assert_eq!(extractor().capture_year(&path).unwrap(), Some(2009));
    }

    #[test]
    fn plain_file_has_no_year_and_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.jpg");
        fs::write(&path, b"not really a jpeg").unwrap();
        assert_eq!(extractor().capture_year(&path).unwrap(), None);
        assert!(extractor().capture_year(&dir.path().join("gone.jpg")).is_err());
    }

    fn fixture() -> (tempfile::TempDir, Vec<String>) {
        let dir = tempfile::tempdir().unwrap();
        let dated = dir.path().join("a.jpg");
        fs::write(
            &dated,
            packet(r#"<rdf:Description exif:DateTimeOriginal="2016-03-03T00:00:00"/>"#),
        )
        .unwrap();
        let plain = dir.path().join("b.jpg");
        fs::write(&plain, b"plain").unwrap();
        let missing = dir.path().join("c.jpg");
        let paths = [dated, plain, missing]
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        (dir, paths)
    }

    #[tokio::test]
    async fn pool_and_sequential_modes_agree() {
        let (_dir, paths) = fixture();
        let config = ExtractionConfig {
            workers: 2,
            progress_every: 1,
            ..ExtractionConfig::default()
        };

        let pooled = extract_capture_years(paths.clone(), extractor(), &config, true)
            .await
            .unwrap();
        let sequential = extract_capture_years(paths.clone(), extractor(), &config, false)
            .await
            .unwrap();

        for summary in [&pooled, &sequential] {
            assert_eq!(summary.scanned, 3);
            assert_eq!(summary.failures, 1);
            assert_eq!(summary.years.get(&paths[0]), Some(&2016));
            assert_eq!(summary.years.len(), 1);
        }
    }

    #[test]
    fn only_images_are_targets() {
        let records = vec![
            FileRecord::new("/a.jpg", "x", 1, "2020-01-01", "", "image/jpeg"),
            FileRecord::new("/b.pdf", "x", 1, "2020-01-01", "", "application/pdf"),
        ];
        assert_eq!(extraction_targets(&records), vec!["/a.jpg".to_string()]);
    }
}
