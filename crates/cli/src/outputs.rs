//! Writes rendered reports into an output directory.

use anyhow::{Context, Result};
use curator_core::dedupe::DuplicateAnalysis;
use curator_core::report;
use curator_core::taxonomy::TaxonomyReport;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const KEEP_FILE: &str = "keep.txt";
pub const DELETE_FILE: &str = "delete.txt";
pub const REVIEW_FILE: &str = "review.txt";
pub const DUPLICATES_JSON: &str = "duplicates.json";
pub const MAPPING_FILE: &str = "taxonomy-mapping.tsv";
pub const STRUCTURE_FILE: &str = "taxonomy-structure.txt";
pub const ANALYSIS_JSON: &str = "taxonomy-analysis.json";

fn write(dir: &Path, name: &str, contents: &str) -> Result<PathBuf> {
    let path = dir.join(name);
    fs::write(&path, contents).with_context(|| format!("failed to write {}", path.display()))?;
    info!("wrote {}", path.display());
    Ok(path)
}

pub fn write_duplicate_reports(
    dir: &Path,
    analysis: &DuplicateAnalysis,
    json: bool,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let mut written = vec![
        write(dir, KEEP_FILE, &report::keep_list(analysis))?,
        write(dir, DELETE_FILE, &report::delete_list(analysis))?,
        write(dir, REVIEW_FILE, &report::review_list(analysis))?,
    ];
    if json {
        let body = serde_json::to_string_pretty(&report::duplicates_json(analysis))?;
        written.push(write(dir, DUPLICATES_JSON, &body)?);
    }
    Ok(written)
}

pub fn write_taxonomy_reports(
    dir: &Path,
    taxonomy: &TaxonomyReport,
    json: bool,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let mut written = vec![
        write(dir, MAPPING_FILE, &report::mapping_tsv(taxonomy))?,
        write(dir, STRUCTURE_FILE, &report::structure_txt(taxonomy))?,
    ];
    if json {
        let body = serde_json::to_string_pretty(&report::taxonomy_json(taxonomy))?;
        written.push(write(dir, ANALYSIS_JSON, &body)?);
    }
    Ok(written)
}
