//! Text and JSON renderings of duplicate and taxonomy results.
//!
//! Renderers return strings; writing them to disk is the caller's job.

use crate::dedupe::DuplicateAnalysis;
use crate::taxonomy::TaxonomyReport;
use serde_json::json;
use std::collections::BTreeMap;

pub const MAPPING_HEADER: &str = "current_path\tproposed_category\tcontent_type\tyear";

/// Human-readable byte count with one decimal, 1024-based.
pub fn format_size(bytes: u64) -> String {
    let mut size = bytes as f64;
    for unit in ["B", "KB", "MB", "GB", "TB"] {
        if size < 1024.0 {
            return format!("{:.1} {}", size, unit);
        }
        size /= 1024.0;
    }
    format!("{:.1} PB", size)
}

fn lines<'a>(paths: impl Iterator<Item = &'a str>) -> String {
    let mut sorted: Vec<&str> = paths.collect();
    sorted.sort_unstable();
    sorted.iter().map(|p| format!("{}\n", p)).collect()
}

fn reasoned_lines<'a>(
    entries: impl Iterator<Item = (&'a str, &'a crate::models::DuplicateDecision)>,
) -> String {
    let mut rows: Vec<(&str, String)> = entries
        .map(|(p, d)| (p, d.reason().unwrap_or_default()))
        .collect();
    rows.sort();
    rows.iter()
        .map(|(p, reason)| format!("{}\t# {}\n", p, reason))
        .collect()
}

pub fn keep_list(analysis: &DuplicateAnalysis) -> String {
    lines(analysis.kept_paths())
}

pub fn delete_list(analysis: &DuplicateAnalysis) -> String {
    reasoned_lines(analysis.deleted())
}

pub fn review_list(analysis: &DuplicateAnalysis) -> String {
    reasoned_lines(analysis.reviewed())
}

pub fn duplicates_json(analysis: &DuplicateAnalysis) -> serde_json::Value {
    let exact: Vec<serde_json::Value> = analysis
        .exact
        .iter()
        .map(|g| {
            json!({
                "content_hash": g.content_hash,
                "keep": g.keep().path,
                "delete": g.delete().iter().map(|f| f.path.as_str()).collect::<Vec<_>>(),
            })
        })
        .collect();
    let near: BTreeMap<String, Vec<&str>> = analysis
        .variants
        .iter()
        .map(|v| (v.key(), v.members.iter().map(|f| f.path.as_str()).collect()))
        .collect();
    json!({
        "summary": analysis.summary,
        "exact_duplicates": exact,
        "junk_files": analysis.junk.iter().map(|f| f.path.as_str()).collect::<Vec<_>>(),
        "near_duplicates": near,
    })
}

pub fn mapping_tsv(report: &TaxonomyReport) -> String {
    let mut out = String::from(MAPPING_HEADER);
    out.push('\n');
    for a in &report.assignments {
        let year = a.year.map(|y| y.to_string()).unwrap_or_default();
        out.push_str(&format!(
            "{}\t{}\t{}\t{}\n",
            a.path, a.proposed_category, a.content_type, year
        ));
    }
    out
}

pub fn structure_txt(report: &TaxonomyReport) -> String {
    let mut out = String::from("Proposed Taxonomy Structure\n");
    out.push_str(&"=".repeat(60));
    out.push_str("\n\n");
    for (category, stats) in report.ranked_categories() {
        out.push_str(&format!(
            "{}\n  Files: {}\n  Size:  {}\n\n",
            category,
            stats.count,
            format_size(stats.size)
        ));
    }
    out
}

pub fn taxonomy_json(report: &TaxonomyReport) -> serde_json::Value {
    let analysis = &report.analysis;
    let extensions: BTreeMap<&str, serde_json::Value> = analysis
        .extensions
        .iter()
        .map(|(ext, s)| (ext.as_str(), json!({ "count": s.count, "size": s.size })))
        .collect();
    let clusters: Vec<&crate::clusters::SemanticCluster> = analysis.clusters.iter().collect();
    json!({
        "summary": {
            "total_files": report.total_files,
            "unique_extensions": analysis.extensions.len(),
            "unique_mime_types": analysis.mime_types.len(),
            "content_type_groups": analysis.content_types.len(),
            "semantic_clusters": analysis.clusters.len(),
            "years_found": analysis.date_patterns.by_year.len(),
        },
        "content_types": analysis.content_types,
        "extensions": extensions,
        "mime_types": analysis.mime_types,
        "semantic_clusters": clusters,
        "date_patterns": {
            "by_year": analysis.date_patterns.by_year,
            "by_year_month": analysis.date_patterns.by_year_month,
            "date_folders": analysis.date_patterns.date_folders,
        },
        "proposed_categories": report.categories,
    })
}
