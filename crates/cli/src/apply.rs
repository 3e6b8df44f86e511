//! Executes organize plans and delete lists against the filesystem.

use crate::fs_apply;
use crate::paths;
use anyhow::{Context, Result};
use chrono::Local;
use curator_core::config::{AppConfig, SafetyConfig};
use curator_core::deletion::{self, DeletionAction, DeletionLogEntry, DELETION_LOG_HEADER};
use curator_core::planner::{self, DiskProbe, MoveResult, PlanFilter, Router};
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const DEFAULT_DELETION_LOG: &str = "deletion-log.txt";

fn now() -> String {
    Local::now().naive_local().format("%Y-%m-%dT%H:%M:%S").to_string()
}

#[derive(Debug, Clone)]
pub struct OrganizeOptions {
    pub mapping: PathBuf,
    pub dest_root: Option<PathBuf>,
    pub log_file: PathBuf,
    /// Defaults to `deletion-log.txt` next to the mapping.
    pub deletion_log: Option<PathBuf>,
    pub dry_run: bool,
    pub filter: PlanFilter,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct OrganizeSummary {
    pub planned: usize,
    pub moved: usize,
    pub failed: usize,
    /// Also counted in `failed`.
    pub denied: usize,
    pub sidecars: usize,
    pub conflicts: usize,
    pub missing_accounted: usize,
    pub missing_unexpected: usize,
    pub dry_run: bool,
}

pub fn organize(opts: &OrganizeOptions, config: &AppConfig) -> Result<OrganizeSummary> {
    let tsv = fs::read_to_string(&opts.mapping)
        .with_context(|| format!("failed to read mapping {}", opts.mapping.display()))?;
    let entries = opts.filter.apply(planner::parse_mapping(&tsv)?);
    info!("loaded {} file mappings", entries.len());

    let deletion_log = opts.deletion_log.clone().unwrap_or_else(|| {
        opts.mapping
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(DEFAULT_DELETION_LOG)
    });
    let deleted: HashSet<String> = fs::read_to_string(&deletion_log)
        .map(|text| deletion::parse_deletion_log(&text))
        .unwrap_or_default();

    let mut router = Router::new(&config.organize);
    if let Some(root) = &opts.dest_root {
        router = router.with_dest_root(root);
    }
    let plan = planner::plan_moves(&entries, &router, &DiskProbe);
    let missing = plan.check_missing(&deleted);
    info!(
        "prepared {} move operations ({} sidecars, {} conflicts)",
        plan.operations.len(),
        plan.sidecar_count(),
        plan.conflict_count()
    );
    if !missing.unexpected.is_empty() {
        warn!(
            "{} mapped files are missing and not in the deletion log",
            missing.unexpected.len()
        );
    }
    for (category, count) in plan.by_top_category() {
        info!("  {}: {} files", category, count);
    }

    let safety = &config.safety;
    let results: Vec<MoveResult> = plan
        .operations
        .iter()
        .map(|op| {
            let outcome = if !paths::is_allowed(&op.source, &safety.allow_paths, &safety.deny_paths) {
                Err(anyhow::anyhow!("path denied"))
            } else if opts.dry_run {
                Ok(op.destination.clone())
            } else {
                fs_apply::move_file(&op.source, &op.destination, safety.copy_then_delete)
            };
            match outcome {
                Ok(final_dest) => MoveResult {
                    op: op.clone(),
                    final_dest,
                    error: None,
                },
                Err(e) => MoveResult {
                    op: op.clone(),
                    final_dest: op.destination.clone(),
                    error: Some(format!("{:#}", e)),
                },
            }
        })
        .collect();

    let log = planner::render_organize_log(&results, opts.dry_run, &now(), Some(&missing));
    fs::write(&opts.log_file, log)
        .with_context(|| format!("failed to write {}", opts.log_file.display()))?;

    let failed = results.iter().filter(|r| r.error.is_some()).count();
    let summary = OrganizeSummary {
        planned: results.len(),
        moved: if opts.dry_run { 0 } else { results.len() - failed },
        denied: results
            .iter()
            .filter(|r| r.error.as_deref() == Some("path denied"))
            .count(),
        failed,
        sidecars: plan.sidecar_count(),
        conflicts: results
            .iter()
            .filter(|r| r.op.conflict_resolved() || r.final_dest != r.op.destination)
            .count(),
        missing_accounted: missing.accounted.len(),
        missing_unexpected: missing.unexpected.len(),
        dry_run: opts.dry_run,
    };
    info!(
        "organize {}: {} planned, {} moved, {} failed",
        if opts.dry_run { "dry run" } else { "done" },
        summary.planned,
        summary.moved,
        summary.failed
    );
    Ok(summary)
}

#[derive(Debug, Clone)]
pub struct DeleteOptions {
    pub delete_list: PathBuf,
    pub trash_dir: Option<PathBuf>,
    pub log_file: PathBuf,
    pub dry_run: bool,
    pub limit: Option<usize>,
    /// Unlink instead of moving to the trash.
    pub permanent: bool,
    /// Prune directories emptied by a removal, up to the containing trash root.
    pub cleanup_dirs: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DeleteSummary {
    pub listed: usize,
    pub removed: usize,
    pub missing: usize,
    pub denied: usize,
    pub failed: usize,
    pub bytes: u64,
    pub dirs_removed: usize,
    pub permanent: bool,
    pub dry_run: bool,
}

fn append_log(log_file: &Path, entry: &DeletionLogEntry) -> Result<()> {
    let fresh = !log_file.exists();
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("failed to open {}", log_file.display()))?;
    if fresh {
        writeln!(file, "{}", DELETION_LOG_HEADER)?;
    }
    file.write_all(entry.to_tsv().as_bytes())?;
    Ok(())
}

/// The most specific configured root that contains `path`.
fn containing_root<'a>(path: &Path, roots: &'a [String]) -> Option<&'a Path> {
    roots
        .iter()
        .map(Path::new)
        .filter(|root| path.starts_with(root))
        .max_by_key(|root| root.components().count())
}

/// Moves every file in the delete list into the trash (or unlinks it when
/// `permanent`), logging each one.
pub fn delete(opts: &DeleteOptions, safety: &SafetyConfig) -> Result<DeleteSummary> {
    let trash_dir = if opts.permanent {
        None
    } else {
        let dir = opts
            .trash_dir
            .clone()
            .or_else(|| safety.trash_dir.as_ref().map(PathBuf::from))
            .context("no trash directory configured (set safety.trash_dir or pass --trash-dir)")?;
        Some(dir)
    };
    let text = fs::read_to_string(&opts.delete_list)
        .with_context(|| format!("failed to read {}", opts.delete_list.display()))?;
    let mut entries = deletion::parse_delete_list(&text);
    if let Some(n) = opts.limit {
        entries.truncate(n);
    }

    let mut summary = DeleteSummary {
        listed: entries.len(),
        permanent: opts.permanent,
        dry_run: opts.dry_run,
        ..Default::default()
    };
    for entry in &entries {
        let source = Path::new(&entry.path);
        let size = match fs::metadata(source) {
            Ok(meta) => meta.len(),
            Err(_) => {
                summary.missing += 1;
                continue;
            }
        };
        if !paths::is_allowed(source, &safety.allow_paths, &safety.deny_paths) {
            warn!("refusing to delete {}: path denied", entry.path);
            summary.denied += 1;
            continue;
        }
        let dest = trash_dir
            .as_deref()
            .map(|dir| deletion::trash_path(source, dir, &safety.trash_roots));
        if opts.dry_run {
            match &dest {
                Some(dest) => info!("would trash {} -> {}", entry.path, dest.display()),
                None => info!("would permanently delete {}", entry.path),
            }
            summary.removed += 1;
            summary.bytes += size;
            continue;
        }

        let outcome = match &dest {
            Some(dest) => fs_apply::move_file(source, dest, safety.copy_then_delete)
                .map(|written| (DeletionAction::Moved, written.to_string_lossy().into_owned())),
            None => fs::remove_file(source)
                .with_context(|| format!("remove {}", source.display()))
                .map(|_| (DeletionAction::Deleted, String::new())),
        };
        match outcome {
            Ok((action, trash_path)) => {
                append_log(
                    &opts.log_file,
                    &DeletionLogEntry {
                        timestamp: now(),
                        action,
                        source: entry.path.clone(),
                        trash_path,
                        size,
                        reason: entry.reason.clone(),
                    },
                )?;
                summary.removed += 1;
                summary.bytes += size;
                if opts.cleanup_dirs {
                    if let (Some(parent), Some(root)) =
                        (source.parent(), containing_root(source, &safety.trash_roots))
                    {
                        summary.dirs_removed += fs_apply::cleanup_empty_dirs(parent, root);
                    }
                }
            }
            Err(e) => {
                warn!("failed to remove {}: {:#}", entry.path, e);
                summary.failed += 1;
            }
        }
    }
    info!(
        "delete {}: {} {}, {} missing, {} denied, {} failed, {} empty dirs removed",
        if opts.dry_run { "dry run" } else { "done" },
        summary.removed,
        if opts.permanent { "deleted" } else { "trashed" },
        summary.missing,
        summary.denied,
        summary.failed,
        summary.dirs_removed
    );
    Ok(summary)
}
