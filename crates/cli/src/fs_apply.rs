use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// First free `stem_N.ext` next to `dest`.
pub fn resolve_conflict(dest: &Path) -> PathBuf {
    let stem = dest
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("file")
        .to_string();
    let ext = dest
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_string();
    let parent = dest.parent().unwrap_or_else(|| Path::new("."));
    let mut counter = 1;
    loop {
        let name = if ext.is_empty() {
            format!("{}_{}", stem, counter)
        } else {
            format!("{}_{}.{}", stem, counter, ext)
        };
        let candidate = parent.join(name);
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

/// Moves `from` to `to`, creating parents and never overwriting. Returns the
/// path actually written.
pub fn move_file(from: &Path, to: &Path, copy_then_delete: bool) -> Result<PathBuf> {
    if !from.exists() {
        anyhow::bail!("source missing: {}", from.display());
    }
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create {}", parent.display()))?;
    }
    let target = if to.exists() {
        resolve_conflict(to)
    } else {
        to.to_path_buf()
    };

    let renamed = !copy_then_delete && fs::rename(from, &target).is_ok();
    if !renamed {
        // rename fails across filesystems
        fs::copy(from, &target)
            .with_context(|| format!("copy {} -> {}", from.display(), target.display()))?;
        fs::remove_file(from).with_context(|| format!("remove {}", from.display()))?;
    }
    Ok(target)
}

/// Removes empty directories from `start` upwards. `stop_at` itself is never
/// removed, and nothing happens when `start` is not below it.
pub fn cleanup_empty_dirs(start: &Path, stop_at: &Path) -> usize {
    if !start.starts_with(stop_at) {
        return 0;
    }
    let mut removed = 0;
    let mut current = start;
    while current != stop_at {
        let empty = fs::read_dir(current)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if !empty || fs::remove_dir(current).is_err() {
            break;
        }
        removed += 1;
        match current.parent() {
            Some(parent) => current = parent,
            None => break,
        }
    }
    removed
}
