//! Exact-duplicate grouping, keep/delete scoring, junk sweep and
//! filename-variant review.

use crate::config::DedupeConfig;
use crate::models::{DeleteReason, DuplicateDecision, FileRecord};
use crate::patterns;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Sort key for modification times.
///
/// Timestamps that parse compare as instants. Anything else ranks below every
/// parsed timestamp and compares lexically among its peers, which keeps the
/// ordering total.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum MtimeKey {
    Unparsed(String),
    Parsed(NaiveDateTime),
}

impl MtimeKey {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
            return MtimeKey::Parsed(dt.naive_utc());
        }
        for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
            if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, fmt) {
                return MtimeKey::Parsed(dt);
            }
        }
        if let Some(dt) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
        {
            return MtimeKey::Parsed(dt);
        }
        MtimeKey::Unparsed(trimmed.to_string())
    }
}

/// Keep priority; higher is better. Field order is comparison order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct KeepScore {
    pub not_junk: bool,
    pub not_copy: bool,
    pub mtime: MtimeKey,
    pub name_len: usize,
    pub source_priority: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct DuplicateGroup {
    pub content_hash: String,
    /// Best first.
    members: Vec<FileRecord>,
}

impl DuplicateGroup {
    pub fn keep(&self) -> &FileRecord {
        &self.members[0]
    }

    pub fn delete(&self) -> &[FileRecord] {
        &self.members[1..]
    }

    pub fn members(&self) -> &[FileRecord] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn reclaimable_bytes(&self) -> u64 {
        self.delete().iter().map(|f| f.size).sum()
    }
}

#[derive(Debug, Clone)]
pub struct DuplicateGrouper {
    source_priority: BTreeMap<String, i32>,
}

impl DuplicateGrouper {
    pub fn new(config: &DedupeConfig) -> Self {
        let source_priority = config
            .source_priority
            .iter()
            .map(|(k, v)| (k.to_lowercase(), *v))
            .collect();
        Self { source_priority }
    }

    pub fn source_priority(&self, source: &str) -> i32 {
        self.source_priority
            .get(&source.to_lowercase())
            .copied()
            .unwrap_or(0)
    }

    pub fn score(&self, record: &FileRecord) -> KeepScore {
        KeepScore {
            not_junk: !patterns::is_junk(&record.filename),
            not_copy: !patterns::is_copy_variant(&record.filename),
            mtime: MtimeKey::parse(&record.mtime),
            name_len: record.filename.chars().count(),
            source_priority: self.source_priority(&record.source),
        }
    }

    /// Groups of two or more records sharing a non-empty hash, ordered by hash.
    pub fn group(&self, records: &[FileRecord]) -> Vec<DuplicateGroup> {
        let mut by_hash: BTreeMap<&str, Vec<&FileRecord>> = BTreeMap::new();
        for record in records.iter().filter(|r| r.has_hash()) {
            by_hash.entry(&record.content_hash).or_default().push(record);
        }

        by_hash
            .into_iter()
            .filter(|(_, files)| files.len() > 1)
            .map(|(hash, files)| {
                let mut scored: Vec<(KeepScore, &FileRecord)> =
                    files.into_iter().map(|f| (self.score(f), f)).collect();
                // stable: equal scores keep input order
                scored.sort_by(|a, b| b.0.cmp(&a.0));
                DuplicateGroup {
                    content_hash: hash.to_string(),
                    members: scored.into_iter().map(|(_, f)| f.clone()).collect(),
                }
            })
            .collect()
    }
}

/// Files that look like copies of the same name, plus the original when present.
#[derive(Debug, Clone, Serialize)]
pub struct VariantGroup {
    /// Lower-cased canonical filename.
    pub canonical: String,
    pub extension: String,
    pub members: Vec<FileRecord>,
}

impl VariantGroup {
    pub fn key(&self) -> String {
        format!("{}|{}", self.canonical, self.extension)
    }
}

pub fn find_near_duplicates(records: &[FileRecord]) -> Vec<VariantGroup> {
    let mut variants: BTreeMap<(String, String), Vec<&FileRecord>> = BTreeMap::new();
    for record in records {
        if let Some(canonical) = patterns::canonical_name(&record.filename) {
            variants
                .entry((canonical.to_lowercase(), record.extension.clone()))
                .or_default()
                .push(record);
        }
    }

    let mut by_name: HashMap<String, Vec<&FileRecord>> = HashMap::new();
    for record in records {
        by_name
            .entry(record.filename.to_lowercase())
            .or_default()
            .push(record);
    }

    variants
        .into_iter()
        .filter_map(|((canonical, extension), copies)| {
            let originals = by_name.get(&canonical).cloned().unwrap_or_default();
            if originals.is_empty() && copies.len() < 2 {
                return None;
            }
            let members = originals
                .into_iter()
                .chain(copies)
                .cloned()
                .collect::<Vec<_>>();
            Some(VariantGroup {
                canonical,
                extension,
                members,
            })
        })
        .collect()
}

pub fn find_junk(records: &[FileRecord]) -> Vec<FileRecord> {
    records
        .iter()
        .filter(|r| patterns::is_junk(&r.filename))
        .cloned()
        .collect()
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DuplicateSummary {
    pub total_files: usize,
    pub exact_duplicate_groups: usize,
    pub exact_duplicates_to_delete: usize,
    pub exact_duplicate_size_bytes: u64,
    pub junk_files: usize,
    pub near_duplicate_groups: usize,
    pub files_for_review: usize,
}

#[derive(Debug, Clone)]
pub struct DuplicateAnalysis {
    pub exact: Vec<DuplicateGroup>,
    pub junk: Vec<FileRecord>,
    pub variants: Vec<VariantGroup>,
    /// One decision per input path.
    pub decisions: BTreeMap<String, DuplicateDecision>,
    pub summary: DuplicateSummary,
}

impl DuplicateAnalysis {
    pub fn decision(&self, path: &str) -> Option<&DuplicateDecision> {
        self.decisions.get(path)
    }

    /// Paths that are not deleted. Files under review stay here until a human decides.
    pub fn kept_paths(&self) -> impl Iterator<Item = &str> {
        self.decisions
            .iter()
            .filter(|(_, d)| !d.is_delete())
            .map(|(p, _)| p.as_str())
    }

    pub fn deleted(&self) -> impl Iterator<Item = (&str, &DuplicateDecision)> {
        self.decisions
            .iter()
            .filter(|(_, d)| d.is_delete())
            .map(|(p, d)| (p.as_str(), d))
    }

    pub fn reviewed(&self) -> impl Iterator<Item = (&str, &DuplicateDecision)> {
        self.decisions
            .iter()
            .filter(|(_, d)| matches!(d, DuplicateDecision::Review { .. }))
            .map(|(p, d)| (p.as_str(), d))
    }
}

/// Runs exact grouping, the junk sweep and variant review, and folds them into
/// one decision per file. Delete beats review, review beats keep.
pub fn analyze(records: &[FileRecord], grouper: &DuplicateGrouper) -> DuplicateAnalysis {
    let exact = grouper.group(records);
    let junk = find_junk(records);
    let variants = find_near_duplicates(records);

    let mut deletes: BTreeMap<String, DeleteReason> = BTreeMap::new();
    let mut group_keepers: HashSet<&str> = HashSet::new();
    for group in &exact {
        group_keepers.insert(group.keep().path.as_str());
        for dup in group.delete() {
            deletes.insert(
                dup.path.clone(),
                DeleteReason::ExactDuplicate {
                    keep: group.keep().path.clone(),
                },
            );
        }
    }
    for j in &junk {
        deletes
            .entry(j.path.clone())
            .or_insert(DeleteReason::Junk);
    }

    let mut reviews: BTreeMap<String, String> = BTreeMap::new();
    for group in &variants {
        let unhandled: Vec<&FileRecord> = group
            .members
            .iter()
            .filter(|f| !deletes.contains_key(&f.path) && !group_keepers.contains(f.path.as_str()))
            .collect();
        if unhandled.len() > 1 {
            for f in unhandled {
                reviews
                    .entry(f.path.clone())
                    .or_insert_with(|| group.canonical.clone());
            }
        }
    }

    let decisions: BTreeMap<String, DuplicateDecision> = records
        .iter()
        .map(|r| {
            let decision = if let Some(reason) = deletes.get(&r.path) {
                DuplicateDecision::Delete {
                    reason: reason.clone(),
                }
            } else if let Some(canonical) = reviews.get(&r.path) {
                DuplicateDecision::Review {
                    canonical: canonical.clone(),
                }
            } else {
                DuplicateDecision::Keep
            };
            (r.path.clone(), decision)
        })
        .collect();

    let summary = DuplicateSummary {
        total_files: records.len(),
        exact_duplicate_groups: exact.len(),
        exact_duplicates_to_delete: exact.iter().map(|g| g.delete().len()).sum(),
        exact_duplicate_size_bytes: exact.iter().map(|g| g.reclaimable_bytes()).sum(),
        junk_files: junk.len(),
        near_duplicate_groups: variants.len(),
        files_for_review: reviews.len(),
    };

    DuplicateAnalysis {
        exact,
        junk,
        variants,
        decisions,
        summary,
    }
}
