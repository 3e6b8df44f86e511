//! File records and the decision records derived from them.

use crate::error::{ManifestError, RecordError};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;
use tracing::{info, warn};

pub const FALLBACK_MIME: &str = "application/octet-stream";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: String,
    pub source: String,
    pub filename: String,
    pub extension: String,
    pub size: u64,
    pub mtime: String,
    pub content_hash: String,
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture_year: Option<i32>,
}

impl FileRecord {
    /// Builds a record, deriving filename and extension from `path`.
    pub fn new(
        path: impl Into<String>,
        source: impl Into<String>,
        size: u64,
        mtime: impl Into<String>,
        content_hash: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Self {
        let path = path.into();
        let filename = filename_of(&path);
        let extension = extension_of(&filename);
        Self {
            path,
            source: source.into(),
            filename,
            extension,
            size,
            mtime: mtime.into(),
            content_hash: content_hash.into(),
            mime_type: mime_type.into(),
            capture_year: None,
        }
    }

    pub fn with_capture_year(mut self, year: Option<i32>) -> Self {
        self.capture_year = year;
        self
    }

    pub fn has_hash(&self) -> bool {
        !self.content_hash.is_empty()
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }

    fn from_raw(index: usize, raw: RawRecord) -> Result<Self, RecordError> {
        let path = raw
            .path
            .filter(|p| !p.is_empty())
            .ok_or(RecordError::MissingField {
                index,
                field: "path",
            })?;
        let size = raw.size.ok_or(RecordError::MissingField {
            index,
            field: "size",
        })?;
        let mtime = raw
            .mtime
            .filter(|m| !m.is_empty())
            .ok_or(RecordError::MissingField {
                index,
                field: "mtime",
            })?;

        let filename = raw
            .filename
            .filter(|f| !f.is_empty())
            .unwrap_or_else(|| filename_of(&path));
        let extension = raw
            .extension
            .map(|e| e.trim_start_matches('.').to_lowercase())
            .unwrap_or_else(|| extension_of(&filename));
        let mime_type = [raw.mime_type, raw.mime]
            .into_iter()
            .flatten()
            .find(|m| !m.is_empty())
            .unwrap_or_else(|| FALLBACK_MIME.to_string());

        Ok(Self {
            path,
            source: raw.source.unwrap_or_else(|| "unknown".to_string()),
            filename,
            extension,
            size,
            mtime,
            content_hash: [raw.content_hash, raw.md5, raw.hash]
                .into_iter()
                .flatten()
                .find(|h| !h.is_empty())
                .unwrap_or_default(),
            mime_type,
            capture_year: raw.capture_year,
        })
    }
}

/// Loosely-typed manifest entry. Every field is optional here so that a
/// single bad entry is rejected on its own instead of failing the document.
#[derive(Debug, Default, Deserialize)]
struct RawRecord {
    path: Option<String>,
    source: Option<String>,
    filename: Option<String>,
    extension: Option<String>,
    size: Option<u64>,
    mtime: Option<String>,
    /// Preferred over `md5`, then `hash`.
    content_hash: Option<String>,
    md5: Option<String>,
    hash: Option<String>,
    mime_type: Option<String>,
    mime: Option<String>,
    capture_year: Option<i32>,
}

pub fn filename_of(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

pub fn extension_of(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// The read-only record set a classification run works on.
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    records: Vec<FileRecord>,
}

impl Inventory {
    /// Keeps the first record for every path; later duplicates are reported.
    pub fn from_records(records: Vec<FileRecord>) -> (Self, Vec<RecordError>) {
        Self::from_indexed(records.into_iter().enumerate())
    }

    /// Like [`Inventory::from_records`], reporting duplicates by their manifest index.
    fn from_indexed(
        records: impl IntoIterator<Item = (usize, FileRecord)>,
    ) -> (Self, Vec<RecordError>) {
        let mut seen = HashSet::new();
        let mut kept = Vec::new();
        let mut rejected = Vec::new();
        for (index, record) in records {
            if seen.insert(record.path.clone()) {
                kept.push(record);
            } else {
                rejected.push(RecordError::DuplicatePath {
                    index,
                    path: record.path,
                });
            }
        }
        (Self { records: kept }, rejected)
    }

    pub fn from_json_str(json: &str) -> Result<(Self, Vec<RecordError>), ManifestError> {
        let doc: serde_json::Value = serde_json::from_str(json)?;
        let items = doc
            .get("files")
            .and_then(|f| f.as_array())
            .ok_or(ManifestError::MissingFiles)?;

        let mut records = Vec::with_capacity(items.len());
        let mut rejected = Vec::new();
        for (index, item) in items.iter().enumerate() {
            let parsed = serde_json::from_value::<RawRecord>(item.clone())
                .map_err(|e| RecordError::Malformed {
                    index,
                    message: e.to_string(),
                })
                .and_then(|raw| FileRecord::from_raw(index, raw));
            match parsed {
                Ok(record) => records.push((index, record)),
                Err(e) => rejected.push(e),
            }
        }

        let (inventory, duplicates) = Self::from_indexed(records);
        rejected.extend(duplicates);
        Ok((inventory, rejected))
    }

    pub fn records(&self) -> &[FileRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn total_size(&self) -> u64 {
        self.records.iter().map(|r| r.size).sum()
    }

    /// Returns a new inventory where each record found in `years` carries that capture year.
    pub fn with_capture_years(&self, years: &BTreeMap<String, i32>) -> Self {
        let records = self
            .records
            .iter()
            .map(|r| match years.get(&r.path) {
                Some(year) => r.clone().with_capture_year(Some(*year)),
                None => r.clone(),
            })
            .collect();
        Self { records }
    }
}

/// Reads a manifest from disk. Rejected entries are logged and skipped.
pub fn load_inventory(path: &Path) -> anyhow::Result<Inventory> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read manifest {}", path.display()))?;
    let (inventory, rejected) = Inventory::from_json_str(&json)
        .with_context(|| format!("failed to parse manifest {}", path.display()))?;
    for err in &rejected {
        warn!("skipping manifest entry: {}", err);
    }
    info!(
        "loaded {} records from {} ({} rejected)",
        inventory.len(),
        path.display(),
        rejected.len()
    );
    Ok(inventory)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeleteReason {
    ExactDuplicate { keep: String },
    Junk,
}

impl fmt::Display for DeleteReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeleteReason::ExactDuplicate { keep } => write!(f, "exact duplicate of {}", keep),
            DeleteReason::Junk => write!(f, "junk/temp file"),
        }
    }
}

/// What should happen to a file as far as duplicate analysis is concerned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum DuplicateDecision {
    Keep,
    Delete { reason: DeleteReason },
    Review { canonical: String },
}

impl DuplicateDecision {
    /// Free-text reason in the fixed templates downstream tooling matches on.
    pub fn reason(&self) -> Option<String> {
        match self {
            DuplicateDecision::Keep => None,
            DuplicateDecision::Delete { reason } => Some(reason.to_string()),
            DuplicateDecision::Review { canonical } => {
                Some(format!("possible variant: {}", canonical))
            }
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, DuplicateDecision::Delete { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryAssignment {
    pub path: String,
    pub proposed_category: String,
    pub content_type: String,
    pub year: Option<i32>,
    pub reasoning_tags: Vec<String>,
    /// Up to three matching significant clusters, most specific first.
    pub semantic_hints: Vec<String>,
    pub size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_parse_drops_bad_records_and_ignores_unknown_fields() {
        let json = r#"{
            "generated_at": "2024-01-01T00:00:00",
            "files": [
                {"path": "/a/Report.PDF", "source": "gdrive", "size": 10,
                 "mtime": "2023-04-01T10:00:00", "md5": "abc",
                 "mime_type": "application/pdf", "owner": "someone"},
                {"path": "/a/missing-size.txt", "mtime": "2023-04-01T10:00:00"},
                {"path": "/a/bad-size.txt", "size": "large", "mtime": "2023"},
                {"path": "/a/Report.PDF", "size": 1, "mtime": "2023-04-01T10:00:00"}
            ]
        }"#;

        let (inventory, rejected) = Inventory::from_json_str(json).unwrap();
        assert_eq!(inventory.len(), 1);
        assert_eq!(rejected.len(), 3);

        let record = &inventory.records()[0];
        assert_eq!(record.filename, "Report.PDF");
        assert_eq!(record.extension, "pdf");
        assert_eq!(record.content_hash, "abc");
        assert!(matches!(
            rejected[0],
            RecordError::MissingField { field: "size", .. }
        ));
        assert!(matches!(rejected[2], RecordError::DuplicatePath { .. }));
    }

    #[test]
    fn overlapping_hash_and_mime_fields_pick_one_source() {
        let json = r#"{"files": [
            {"path": "/a/x.jpg", "size": 1, "mtime": "2020-01-01T00:00:00",
             "md5": "from-md5", "hash": "from-hash", "mime": "image/png", "mime_type": "image/jpeg"},
            {"path": "/a/y.jpg", "size": 1, "mtime": "2020-01-01T00:00:00",
             "content_hash": "", "hash": "from-hash", "mime": "image/png"}
        ]}"#;
        let (inventory, rejected) = Inventory::from_json_str(json).unwrap();
        assert!(rejected.is_empty(), "{:?}", rejected);
        let x = &inventory.records()[0];
        assert_eq!(x.content_hash, "from-md5");
        assert_eq!(x.mime_type, "image/jpeg");
        let y = &inventory.records()[1];
        assert_eq!(y.content_hash, "from-hash");
        assert_eq!(y.mime_type, "image/png");
    }

    #[test]
    fn duplicate_paths_report_their_manifest_index() {
        let json = r#"{"files": [
            {"path": "/a/missing-mtime.txt", "size": 1},
            {"path": "/a/b.txt", "size": 1, "mtime": "2020-01-01T00:00:00"},
            {"path": "/a/b.txt", "size": 2, "mtime": "2020-01-01T00:00:00"}
        ]}"#;
        let (inventory, rejected) = Inventory::from_json_str(json).unwrap();
        assert_eq!(inventory.len(), 1);
        assert!(matches!(
            rejected[1],
            RecordError::DuplicatePath { index: 2, .. }
        ));
    }

    #[test]
    fn defaults_fill_optional_fields() {
        let json = r#"{"files": [{"path": "/x/notes", "size": 0, "mtime": "2020-01-01T00:00:00"}]}"#;
        let (inventory, rejected) = Inventory::from_json_str(json).unwrap();
        assert!(rejected.is_empty());
        let record = &inventory.records()[0];
        assert_eq!(record.source, "unknown");
        assert_eq!(record.extension, "");
        assert_eq!(record.mime_type, FALLBACK_MIME);
        assert!(!record.has_hash());
    }

    #[test]
    fn document_without_files_array_is_fatal() {
        let err = Inventory::from_json_str(r#"{"entries": []}"#).unwrap_err();
        assert!(matches!(err, ManifestError::MissingFiles));
    }

    #[test]
    fn decision_reasons_follow_fixed_templates() {
        let delete = DuplicateDecision::Delete {
            reason: DeleteReason::ExactDuplicate {
                keep: "/a/b.pdf".into(),
            },
        };
        assert_eq!(delete.reason().unwrap(), "exact duplicate of /a/b.pdf");
        let junk = DuplicateDecision::Delete {
            reason: DeleteReason::Junk,
        };
        assert_eq!(junk.reason().unwrap(), "junk/temp file");
        let review = DuplicateDecision::Review {
            canonical: "document.pdf".into(),
        };
        assert_eq!(review.reason().unwrap(), "possible variant: document.pdf");
        assert_eq!(DuplicateDecision::Keep.reason(), None);
    }

    #[test]
    fn capture_years_merge_into_a_new_inventory() {
        let (inventory, _) = Inventory::from_records(vec![
            FileRecord::new("/p/a.jpg", "x", 1, "2020-01-01T00:00:00", "h1", "image/jpeg"),
            FileRecord::new("/p/b.jpg", "x", 1, "2020-01-01T00:00:00", "h2", "image/jpeg"),
        ]);
        let years = BTreeMap::from([("/p/a.jpg".to_string(), 2011)]);
        let merged = inventory.with_capture_years(&years);
        assert_eq!(merged.records()[0].capture_year, Some(2011));
        assert_eq!(merged.records()[1].capture_year, None);
        assert_eq!(inventory.records()[0].capture_year, None);
    }
}
