use crate::config::AppConfig;
use crate::dedupe::{self, DuplicateAnalysis, DuplicateGrouper};
use crate::extractor::{self, MetadataExtractor};
use crate::models::Inventory;
use crate::taxonomy::{self, TaxonomyReport};
use tracing::info;

pub enum ExtractionMode {
    /// Pool when attached to a terminal, sequential otherwise.
    Auto,
    Pooled,
    Sequential,
    Skip,
}

pub fn run_dupes(inventory: &Inventory, config: &AppConfig) -> DuplicateAnalysis {
    info!("Starting duplicate analysis of {} files...", inventory.len());
    let grouper = DuplicateGrouper::new(&config.dedupe);
    let analysis = dedupe::analyze(inventory.records(), &grouper);
    info!(
        "Duplicate analysis complete: {} exact groups, {} junk, {} for review.",
        analysis.summary.exact_duplicate_groups,
        analysis.summary.junk_files,
        analysis.summary.files_for_review
    );
    analysis
}

/// Extracts embedded capture years, merges them into a new inventory, then classifies it.
pub async fn run_taxonomy(
    inventory: &Inventory,
    config: &AppConfig,
    mode: ExtractionMode,
) -> anyhow::Result<TaxonomyReport> {
    let interactive = match mode {
        ExtractionMode::Skip => None,
        _ if !config.extraction.enabled => None,
        ExtractionMode::Auto => Some(extractor::is_interactive()),
        ExtractionMode::Pooled => Some(true),
        ExtractionMode::Sequential => Some(false),
    };

    let enriched = match interactive {
        Some(interactive) => {
            info!("Starting metadata extraction phase...");
            let meta = MetadataExtractor::new(
                &config.extraction,
                config.taxonomy.embedded_year_range,
            );
            let targets = extractor::extraction_targets(inventory.records());
            let summary =
                extractor::extract_capture_years(targets, meta, &config.extraction, interactive)
                    .await?;
            inventory.with_capture_years(&summary.years)
        }
        None => inventory.clone(),
    };

    info!("Starting taxonomy phase...");
    Ok(taxonomy::classify(enriched.records(), &config.taxonomy))
}
