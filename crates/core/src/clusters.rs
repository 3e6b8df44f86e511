//! Folder-name tokenizing and corpus-relative "semantic" cluster discovery.
//!
//! A cluster is nothing more than a folder token shared by enough files to not
//! be noise. There is no dictionary or model involved.

use crate::models::FileRecord;
use crate::patterns;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Component, Path};

/// Lower-cases a folder name and splits it on whitespace, `_`, `-` and `.` runs.
/// Single-character tokens are dropped.
pub fn tokenize(folder_name: &str) -> Vec<String> {
    let lowered = folder_name.to_lowercase();
    patterns::split_tokens(&lowered)
        .filter(|t| t.chars().count() > 1)
        .map(str::to_string)
        .collect()
}

/// Names of every ancestor folder of `path`, root first. Backslashes count
/// as separators.
pub fn folder_names(path: &str) -> Vec<String> {
    let normalized = path.replace('\\', "/");
    Path::new(&normalized)
        .parent()
        .map(|parent| {
            parent
                .components()
                .filter_map(|c| match c {
                    Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Distinct tokens across all ancestor folders of `path`.
pub fn path_tokens(path: &str) -> BTreeSet<String> {
    folder_names(path)
        .iter()
        .flat_map(|folder| tokenize(folder))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SemanticCluster {
    pub token: String,
    pub count: usize,
    pub size: u64,
    pub top_extensions: Vec<(String, usize)>,
    pub sample_paths: Vec<String>,
    #[serde(skip)]
    pub files: Vec<String>,
}

/// Clusters ordered by descending file count, ties by token.
#[derive(Debug, Clone, Default)]
pub struct ClusterSet {
    clusters: Vec<SemanticCluster>,
    index: HashMap<String, usize>,
}

impl ClusterSet {
    fn from_sorted(clusters: Vec<SemanticCluster>) -> Self {
        let index = clusters
            .iter()
            .enumerate()
            .map(|(i, c)| (c.token.clone(), i))
            .collect();
        Self { clusters, index }
    }

    pub fn get(&self, token: &str) -> Option<&SemanticCluster> {
        self.index.get(token).map(|&i| &self.clusters[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &SemanticCluster> {
        self.clusters.iter()
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// The subset with at least `min_support` files, order preserved.
    pub fn with_min_support(&self, min_support: usize) -> Self {
        Self::from_sorted(
            self.clusters
                .iter()
                .filter(|c| c.count >= min_support)
                .cloned()
                .collect(),
        )
    }
}

pub fn discover_clusters(records: &[FileRecord], min_support: usize) -> ClusterSet {
    let mut token_files: BTreeMap<String, Vec<&FileRecord>> = BTreeMap::new();

    for record in records {
        // path_tokens is a set, so a token counts once per file
        for token in path_tokens(&record.path) {
            token_files.entry(token).or_default().push(record);
        }
    }

    let mut clusters: Vec<SemanticCluster> = token_files
        .into_iter()
        .filter(|(_, files)| files.len() >= min_support)
        .map(|(token, files)| build_cluster(token, &files))
        .collect();
    clusters.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.token.cmp(&b.token)));

    ClusterSet::from_sorted(clusters)
}

fn build_cluster(token: String, files: &[&FileRecord]) -> SemanticCluster {
    let mut extensions: BTreeMap<&str, usize> = BTreeMap::new();
    for f in files {
        let ext = if f.extension.is_empty() {
            "(none)"
        } else {
            f.extension.as_str()
        };
        *extensions.entry(ext).or_default() += 1;
    }
    SemanticCluster {
        token,
        count: files.len(),
        size: files.iter().map(|f| f.size).sum(),
        top_extensions: top_counts(extensions, 5),
        sample_paths: files.iter().take(3).map(|f| f.path.clone()).collect(),
        files: files.iter().map(|f| f.path.clone()).collect(),
    }
}

/// Highest counts first, ties by key, truncated to `limit`.
pub(crate) fn top_counts<K: ToString>(counts: BTreeMap<K, usize>, limit: usize) -> Vec<(String, usize)> {
    let mut items: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
    items.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    items.truncate(limit);
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(path: &str) -> FileRecord {
        FileRecord::new(path, "test", 100, "2021-01-01T00:00:00", "", "image/jpeg")
    }

    #[test]
    fn tokenizer_splits_and_drops_short_tokens() {
        assert_eq!(
            tokenize("My_Photos-2021.backup"),
            vec!["my", "photos", "2021", "backup"]
        );
        assert_eq!(tokenize("a b  Trip"), vec!["trip"]);
        assert!(tokenize("").is_empty());
        assert!(tokenize("__").is_empty());
    }

    #[test]
    fn folder_names_exclude_root_and_file() {
        assert_eq!(
            folder_names("/mnt/ingest/Family Trip/img.jpg"),
            vec!["mnt", "ingest", "Family Trip"]
        );
        assert!(folder_names("img.jpg").is_empty());
    }

    #[test]
    fn backslash_paths_tokenize_like_slash_paths() {
        assert_eq!(
            folder_names(r"photos\Family Trip\img.jpg"),
            vec!["photos", "Family Trip"]
        );
        assert_eq!(
            path_tokens(r"archive\trip-2019\img.jpg"),
            path_tokens("archive/trip-2019/img.jpg")
        );
    }

    #[test]
    fn token_counts_once_per_file() {
        let records: Vec<FileRecord> = (0..3)
            .map(|i| record(&format!("/trip/trip-2019/trip_day/{}.jpg", i)))
            .collect();
        let clusters = discover_clusters(&records, 1);
        assert_eq!(clusters.get("trip").unwrap().count, 3);
        assert_eq!(clusters.get("day").unwrap().count, 3);
    }

    #[test]
    fn sub_threshold_tokens_are_not_clusters() {
        let mut records: Vec<FileRecord> = (0..10)
            .map(|i| record(&format!("/archive/vacation/{}.jpg", i)))
            .collect();
        records.extend((0..9).map(|i| record(&format!("/archive/receipts/{}.pdf", i))));

        let clusters = discover_clusters(&records, 10);
        assert!(clusters.get("vacation").is_some());
        assert!(clusters.get("receipts").is_none());
        assert_eq!(clusters.get("archive").unwrap().count, 19);
    }

    #[test]
    fn ordering_is_count_desc_then_token() {
        let mut records: Vec<FileRecord> = (0..4)
            .map(|i| record(&format!("/zeta/{}.jpg", i)))
            .collect();
        records.extend((0..4).map(|i| record(&format!("/alpha/{}.jpg", i))));
        records.extend((0..6).map(|i| record(&format!("/mid/{}.jpg", i))));

        let clusters = discover_clusters(&records, 1);
        let order: Vec<&str> = clusters.iter().map(|c| c.token.as_str()).collect();
        assert_eq!(order, vec!["mid", "alpha", "zeta"]);

        let strict = clusters.with_min_support(5);
        assert_eq!(strict.len(), 1);
        assert!(strict.get("alpha").is_none());
    }
}
