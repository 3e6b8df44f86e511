//! Corpus statistics and the taxonomy run that ties clusters, dates, shards
//! and category assignment together.

use crate::classifier::CategoryAssigner;
use crate::clusters::{self, discover_clusters, top_counts, ClusterSet};
use crate::config::TaxonomyConfig;
use crate::dates::DateResolver;
use crate::models::{CategoryAssignment, FileRecord};
use crate::patterns;
use crate::shards::detect_shard;
use crate::tree::CategoryTree;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

const NO_EXTENSION: &str = "(none)";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CountSize {
    pub count: usize,
    pub size: u64,
}

impl CountSize {
    pub fn add(&mut self, size: u64) {
        self.count += 1;
        self.size += size;
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExtensionStats {
    pub count: usize,
    pub size: u64,
    pub mime_types: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MimeStats {
    pub count: usize,
    pub size: u64,
    pub extensions: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ContentTypeStats {
    pub count: usize,
    pub size: u64,
    pub subtypes: Vec<(String, usize)>,
    pub extensions: Vec<(String, usize)>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FolderStats {
    pub count: usize,
    pub size: u64,
    /// Deepest position the folder name was seen at, 0 being the first component.
    pub depth: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FolderAnalysis {
    pub folders: BTreeMap<String, FolderStats>,
    pub tokens: Vec<(String, usize)>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DatePatterns {
    pub by_year: BTreeMap<i32, CountSize>,
    pub by_year_month: BTreeMap<String, CountSize>,
    pub date_folders: Vec<(String, usize)>,
}

fn ext_key(record: &FileRecord) -> &str {
    if record.extension.is_empty() {
        NO_EXTENSION
    } else {
        &record.extension
    }
}

pub fn analyze_extensions(records: &[FileRecord]) -> BTreeMap<String, ExtensionStats> {
    let mut stats: BTreeMap<String, ExtensionStats> = BTreeMap::new();
    for r in records {
        let entry = stats.entry(ext_key(r).to_string()).or_default();
        entry.count += 1;
        entry.size += r.size;
        *entry.mime_types.entry(r.mime_type.clone()).or_default() += 1;
    }
    stats
}

pub fn analyze_mime_types(records: &[FileRecord]) -> BTreeMap<String, MimeStats> {
    let mut stats: BTreeMap<String, MimeStats> = BTreeMap::new();
    for r in records {
        let entry = stats.entry(r.mime_type.clone()).or_default();
        entry.count += 1;
        entry.size += r.size;
        *entry.extensions.entry(ext_key(r).to_string()).or_default() += 1;
    }
    stats
}

/// Groups by MIME prefix; a MIME string without `/` is its own group.
pub fn discover_content_types(records: &[FileRecord]) -> BTreeMap<String, ContentTypeStats> {
    let mut groups: BTreeMap<String, (CountSize, BTreeMap<String, usize>, BTreeMap<String, usize>)> =
        BTreeMap::new();
    for r in records {
        let prefix = r
            .mime_type
            .split_once('/')
            .map(|(p, _)| p)
            .unwrap_or(&r.mime_type);
        let (totals, subtypes, extensions) = groups.entry(prefix.to_string()).or_default();
        totals.add(r.size);
        *subtypes.entry(r.mime_type.clone()).or_default() += 1;
        *extensions.entry(ext_key(r).to_string()).or_default() += 1;
    }
    groups
        .into_iter()
        .map(|(prefix, (totals, subtypes, extensions))| {
            (
                prefix,
                ContentTypeStats {
                    count: totals.count,
                    size: totals.size,
                    subtypes: top_counts(subtypes, 10),
                    extensions: top_counts(extensions, 10),
                },
            )
        })
        .collect()
}

pub fn analyze_folders(records: &[FileRecord]) -> FolderAnalysis {
    let mut folders: BTreeMap<String, FolderStats> = BTreeMap::new();
    let mut tokens: BTreeMap<String, usize> = BTreeMap::new();
    for r in records {
        for (depth, folder) in clusters::folder_names(&r.path).iter().enumerate() {
            let entry = folders.entry(folder.to_lowercase()).or_default();
            entry.count += 1;
            entry.size += r.size;
            entry.depth = entry.depth.max(depth);
            for token in clusters::tokenize(folder) {
                *tokens.entry(token).or_default() += 1;
            }
        }
    }
    FolderAnalysis {
        folders,
        tokens: top_counts(tokens, 100),
    }
}

pub fn detect_date_patterns(records: &[FileRecord], resolver: &DateResolver) -> DatePatterns {
    let mut patterns_found = DatePatterns::default();
    let mut date_folders: BTreeMap<String, usize> = BTreeMap::new();
    for r in records {
        if let Some(year) = resolver.path_year(&r.path) {
            patterns_found.by_year.entry(year).or_default().add(r.size);
        }
        for key in patterns::year_months(&r.path) {
            patterns_found.by_year_month.entry(key).or_default().add(r.size);
        }
        for folder in clusters::folder_names(&r.path) {
            if folder.len() == 4 && resolver.path_year(&folder).is_some() {
                *date_folders.entry(folder).or_default() += 1;
            }
        }
    }
    patterns_found.date_folders = top_counts(date_folders, 50);
    patterns_found
}

#[derive(Debug, Clone)]
pub struct CorpusAnalysis {
    pub extensions: BTreeMap<String, ExtensionStats>,
    pub mime_types: BTreeMap<String, MimeStats>,
    pub content_types: BTreeMap<String, ContentTypeStats>,
    pub folders: FolderAnalysis,
    pub date_patterns: DatePatterns,
    pub clusters: ClusterSet,
}

/// Everything a taxonomy run derives from an inventory.
#[derive(Debug, Clone)]
pub struct TaxonomyReport {
    pub total_files: usize,
    pub analysis: CorpusAnalysis,
    /// One per input record, in input order.
    pub assignments: Vec<CategoryAssignment>,
    pub categories: BTreeMap<String, CountSize>,
}

impl TaxonomyReport {
    /// Categories ordered by file count descending, then name.
    pub fn ranked_categories(&self) -> Vec<(&str, CountSize)> {
        let mut ranked: Vec<(&str, CountSize)> = self
            .categories
            .iter()
            .map(|(k, v)| (k.as_str(), *v))
            .collect();
        ranked.sort_by(|a, b| b.1.count.cmp(&a.1.count).then_with(|| a.0.cmp(b.0)));
        ranked
    }

    pub fn tree(&self) -> CategoryTree {
        let mut tree = CategoryTree::new("Proposed Structure");
        for (category, stats) in &self.categories {
            tree.insert(category, stats.count, stats.size);
        }
        tree.sort();
        tree
    }
}

pub fn analyze_corpus(records: &[FileRecord], config: &TaxonomyConfig) -> CorpusAnalysis {
    let resolver = DateResolver::new(config);
    let analysis = CorpusAnalysis {
        extensions: analyze_extensions(records),
        mime_types: analyze_mime_types(records),
        content_types: discover_content_types(records),
        folders: analyze_folders(records),
        date_patterns: detect_date_patterns(records, &resolver),
        clusters: discover_clusters(records, config.min_cluster_support),
    };
    info!(
        "analyzed {} files: {} extensions, {} mime types, {} content types, {} folders, {} years, {} clusters",
        records.len(),
        analysis.extensions.len(),
        analysis.mime_types.len(),
        analysis.content_types.len(),
        analysis.folders.folders.len(),
        analysis.date_patterns.by_year.len(),
        analysis.clusters.len()
    );
    analysis
}

pub fn classify(records: &[FileRecord], config: &TaxonomyConfig) -> TaxonomyReport {
    let analysis = analyze_corpus(records, config);
    let resolver = DateResolver::new(config);
    let assigner = CategoryAssigner::new(&analysis.clusters, config.category_cluster_support);

    let assignments: Vec<CategoryAssignment> = records
        .iter()
        .map(|r| assigner.assign(r, detect_shard(&r.path), resolver.best_year(r)))
        .collect();

    let mut categories: BTreeMap<String, CountSize> = BTreeMap::new();
    for a in &assignments {
        categories
            .entry(a.proposed_category.clone())
            .or_default()
            .add(a.size);
    }
    info!(
        "proposed {} categories for {} files",
        categories.len(),
        records.len()
    );

    TaxonomyReport {
        total_files: records.len(),
        analysis,
        assignments,
        categories,
    }
}
