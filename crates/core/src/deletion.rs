//! Delete-list parsing, trash placement and the deletion log format.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub const DELETION_LOG_HEADER: &str = "timestamp\taction\tsource\ttrash_path\tsize\treason";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteEntry {
    pub path: String,
    pub reason: String,
}

/// Parses `delete.txt`: `path[\t# reason]` per line. Blank lines and lines
/// starting with `#` are skipped.
pub fn parse_delete_list(text: &str) -> Vec<DeleteEntry> {
    text.lines()
        .filter(|line| !line.trim().is_empty() && !line.starts_with('#'))
        .map(|line| {
            let (path, reason) = line.split_once('\t').unwrap_or((line, ""));
            let reason = reason.trim();
            DeleteEntry {
                path: path.to_string(),
                reason: reason.strip_prefix('#').unwrap_or(reason).trim().to_string(),
            }
        })
        .collect()
}

/// Where `original` lands inside `trash_dir`: relative to the most specific
/// matching root, or its full path when none match.
pub fn trash_path(original: &Path, trash_dir: &Path, roots: &[String]) -> PathBuf {
    let mut ordered: Vec<&Path> = roots.iter().map(Path::new).collect();
    ordered.sort_by_key(|r| std::cmp::Reverse(r.components().count()));

    let relative = ordered
        .iter()
        .find_map(|root| original.strip_prefix(root).ok())
        .filter(|rel| !rel.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| {
            original
                .components()
                .filter(|c| matches!(c, std::path::Component::Normal(_)))
                .collect()
        });
    trash_dir.join(relative)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionAction {
    /// Moved into the trash directory.
    Moved,
    /// Unlinked; nothing to restore.
    Deleted,
}

impl DeletionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeletionAction::Moved => "MOVED",
            DeletionAction::Deleted => "DELETED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionLogEntry {
    pub timestamp: String,
    pub action: DeletionAction,
    pub source: String,
    /// Empty for permanent deletions.
    pub trash_path: String,
    pub size: u64,
    pub reason: String,
}

impl DeletionLogEntry {
    pub fn to_tsv(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}\t{}\t{}\n",
            self.timestamp,
            self.action.as_str(),
            self.source,
            self.trash_path,
            self.size,
            self.reason
        )
    }
}

/// Source paths recorded in a deletion log. The `source` column is located
/// through the header when there is one.
pub fn parse_deletion_log(text: &str) -> HashSet<String> {
    let mut lines = text.lines().peekable();
    let header_col = lines
        .peek()
        .filter(|l| l.starts_with("timestamp\t"))
        .map(|header| header.split('\t').position(|c| c == "source"));
    if header_col.is_some() {
        lines.next();
    }
    let source_col = header_col.flatten().unwrap_or(2);
    lines
        .filter(|line| !line.is_empty())
        .filter_map(|line| line.split('\t').nth(source_col))
        .filter(|source| !source.is_empty())
        .map(str::to_string)
        .collect()
}
