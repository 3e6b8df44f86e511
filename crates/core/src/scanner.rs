//! Walks a directory tree and builds the manifest the engines consume.

use crate::models::{FileRecord, FALLBACK_MIME};
use crate::taxonomy::CountSize;
use anyhow::Context;
use chrono::{DateTime, Local};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tokio::sync::mpsc;
use tokio::task;
use tracing::{info, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub root: PathBuf,
    /// Fixed source label; derived per file when `None`.
    pub source: Option<String>,
    pub hash: bool,
    pub excludes: Vec<String>,
    pub known_sources: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ManifestStats {
    pub by_source: BTreeMap<String, CountSize>,
    pub by_extension: BTreeMap<String, CountSize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Manifest {
    pub generated_at: String,
    pub root: String,
    pub total_files: usize,
    pub total_size: u64,
    pub errors: usize,
    pub stats: ManifestStats,
    pub files: Vec<FileRecord>,
}

impl Manifest {
    pub fn write(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))
    }
}

enum Scanned {
    File(FileRecord),
    Failed(PathBuf, std::io::Error),
    Unwalkable(walkdir::Error),
}

pub async fn scan(options: &ScanOptions) -> anyhow::Result<Manifest> {
    let (tx, mut rx) = mpsc::channel(100);
    let exclude_set = build_globset(&options.excludes)?;
    let opts = options.clone();

    let walker = task::spawn_blocking(move || {
        for entry in WalkDir::new(&opts.root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || should_descend(e.path(), &exclude_set))
        {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    if tx.blocking_send(Scanned::Unwalkable(e)).is_err() {
                        break;
                    }
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let item = match describe(entry.path(), &opts) {
                Ok(record) => Scanned::File(record),
                Err(e) => Scanned::Failed(entry.path().to_path_buf(), e),
            };
            if tx.blocking_send(item).is_err() {
                break;
            }
        }
    });

    let mut files = Vec::new();
    let mut errors = 0usize;
    let mut stats = ManifestStats::default();
    while let Some(item) = rx.recv().await {
        match item {
            Scanned::File(record) => {
                stats.by_source.entry(record.source.clone()).or_default().add(record.size);
                stats
                    .by_extension
                    .entry(record.extension.clone())
                    .or_default()
                    .add(record.size);
                files.push(record);
            }
            Scanned::Failed(path, e) => {
                warn!("could not read {}: {}", path.display(), e);
                errors += 1;
            }
            Scanned::Unwalkable(e) => {
                warn!("could not walk: {}", e);
                errors += 1;
            }
        }
    }
    walker.await?;

    let total_size = files.iter().map(|f| f.size).sum();
    info!(
        "scanned {} files ({} bytes) under {}, {} errors",
        files.len(),
        total_size,
        options.root.display(),
        errors
    );

    Ok(Manifest {
        generated_at: Local::now().naive_local().format("%Y-%m-%dT%H:%M:%S").to_string(),
        root: options.root.to_string_lossy().into_owned(),
        total_files: files.len(),
        total_size,
        errors,
        stats,
        files,
    })
}

fn describe(path: &Path, opts: &ScanOptions) -> std::io::Result<FileRecord> {
    let meta = fs::metadata(path)?;
    let mtime = meta
        .modified()
        .map(|t| {
            DateTime::<Local>::from(t)
                .naive_local()
                .format("%Y-%m-%dT%H:%M:%S")
                .to_string()
        })?;
    let hash = if opts.hash {
        full_hash(path).unwrap_or_else(|e| {
            warn!("could not hash {}: {}", path.display(), e);
            String::new()
        })
    } else {
        String::new()
    };
    let source = opts
        .source
        .clone()
        .unwrap_or_else(|| source_label(path, &opts.root, &opts.known_sources));

    Ok(FileRecord::new(
        path.to_string_lossy(),
        source,
        meta.len(),
        mtime,
        hash,
        detect_mime(path),
    ))
}

/// The first directory below `root` when it names a known source, else `unknown`.
pub fn source_label(path: &Path, root: &Path, known_sources: &[String]) -> String {
    let first = path.strip_prefix(root).ok().and_then(|rel| {
        let mut components = rel.components();
        let first = components.next()?;
        // a file directly under the root has no source folder
        components.next()?;
        match first {
            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            _ => None,
        }
    });
    first
        .filter(|name| known_sources.iter().any(|k| k.eq_ignore_ascii_case(name)))
        .map(|name| name.to_lowercase())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Magic bytes first, then the extension table.
pub fn detect_mime(path: &Path) -> String {
    if let Ok(Some(kind)) = infer::get_from_path(path) {
        return kind.mime_type().to_string();
    }
    guess_mime(path).unwrap_or(FALLBACK_MIME).to_string()
}

fn guess_mime(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    let mime = match ext.as_str() {
        "txt" | "md" | "log" | "csv" => "text/plain",
        "rs" | "py" | "js" | "ts" | "sh" | "c" | "h" | "go" => "text/plain",
        "json" => "application/json",
        "toml" | "yaml" | "yml" | "ini" => "text/plain",
        "html" | "htm" => "text/html",
        "xml" | "xmp" => "text/xml",
        "pdf" => "application/pdf",
        "doc" | "docx" => "application/msword",
        "xls" | "xlsx" => "application/vnd.ms-excel",
        "ppt" | "pptx" => "application/vnd.ms-powerpoint",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "heic" => "image/heic",
        "gif" => "image/gif",
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "zip" => "application/zip",
        "ttf" | "otf" => "font/ttf",
        _ => return None,
    };
    Some(mime)
}

fn build_globset(patterns: &[String]) -> anyhow::Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        builder.add(Glob::new(pat).with_context(|| format!("bad exclude pattern {}", pat))?);
    }
    Ok(builder.build()?)
}

fn should_descend(path: &Path, excludes: &GlobSet) -> bool {
    !excludes.is_match(path) && !is_hidden(path)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

fn full_hash(path: &Path) -> std::io::Result<String> {
    use std::io::Read;
    let mut file = fs::File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}
