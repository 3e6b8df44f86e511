use anyhow::Result;
use clap::{Parser, Subcommand};
use cli::apply::{self, DeleteOptions, OrganizeOptions};
use cli::outputs;
use curator_core::config;
use curator_core::config::AppConfig;
use curator_core::models;
use curator_core::pipeline::{self, ExtractionMode};
use curator_core::planner::PlanFilter;
use curator_core::report;
use curator_core::scanner::{self, ScanOptions};
use dialoguer::Confirm;
use std::path::PathBuf;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let cfg = config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Scan {
            root,
            output,
            source,
            no_hash,
            json,
        } => run_scan(cfg, root, output, source, no_hash, json).await,
        Commands::Dupes {
            manifest,
            output_dir,
            json,
        } => run_dupes(cfg, manifest, output_dir, json),
        Commands::Taxonomy {
            manifest,
            output_dir,
            min_cluster,
            no_extract,
            sequential,
            json,
        } => {
            let mode = if no_extract {
                ExtractionMode::Skip
            } else if sequential {
                ExtractionMode::Sequential
            } else {
                ExtractionMode::Auto
            };
            run_taxonomy(cfg, manifest, output_dir, min_cluster, mode, json).await
        }
        Commands::Organize {
            mapping,
            dest_root,
            log_file,
            deletion_log,
            dry_run,
            limit,
            categories,
            json,
        } => {
            let opts = OrganizeOptions {
                mapping,
                dest_root,
                log_file,
                deletion_log,
                dry_run,
                filter: PlanFilter { categories, limit },
            };
            let summary = apply::organize(&opts, &cfg)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!(
                    "planned: {} moved: {} failed: {} denied: {} sidecars: {} conflicts: {} missing: {} ({} unexpected)",
                    summary.planned,
                    summary.moved,
                    summary.failed,
                    summary.denied,
                    summary.sidecars,
                    summary.conflicts,
                    summary.missing_accounted + summary.missing_unexpected,
                    summary.missing_unexpected
                );
            }
            Ok(())
        }
        Commands::Delete {
            delete_list,
            trash_dir,
            log_file,
            dry_run,
            limit,
            permanent,
            yes,
            cleanup_dirs: _,
            no_cleanup_dirs,
            json,
        } => {
            if permanent && !dry_run && !yes {
                let confirmed = Confirm::new()
                    .with_prompt("Permanently delete every file in the list? This cannot be undone")
                    .default(false)
                    .interact()?;
                if !confirmed {
                    println!("aborted");
                    return Ok(());
                }
            }
            let opts = DeleteOptions {
                delete_list,
                trash_dir,
                log_file,
                dry_run,
                limit,
                permanent,
                cleanup_dirs: !no_cleanup_dirs,
            };
            let summary = apply::delete(&opts, &cfg.safety)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!(
                    "listed: {} {}: {} ({}) missing: {} denied: {} failed: {} empty dirs removed: {}",
                    summary.listed,
                    if permanent { "deleted" } else { "trashed" },
                    summary.removed,
                    report::format_size(summary.bytes),
                    summary.missing,
                    summary.denied,
                    summary.failed,
                    summary.dirs_removed
                );
            }
            Ok(())
        }
    }
}

#[derive(Parser)]
#[command(name = "curator")]
#[command(about = "Deduplicate and organize a consolidated file archive", long_about = None)]
struct Cli {
    /// Path to config TOML
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk a directory tree and write a manifest
    Scan {
        /// Directory to scan
        root: PathBuf,
        /// Manifest output path
        #[arg(short, long, default_value = "manifest.json")]
        output: PathBuf,
        /// Source label for every file (derived from the path otherwise)
        #[arg(long)]
        source: Option<String>,
        /// Skip content hashing
        #[arg(long, default_value_t = false)]
        no_hash: bool,
        /// Output JSON summary
        #[arg(long)]
        json: bool,
    },
    /// Find exact duplicates, near duplicates and junk
    Dupes {
        /// Manifest produced by `scan`
        #[arg(short, long)]
        manifest: PathBuf,
        /// Directory for keep/delete/review lists
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
        /// Also write duplicates.json
        #[arg(long)]
        json: bool,
    },
    /// Propose a category for every file
    Taxonomy {
        /// Manifest produced by `scan`
        #[arg(short, long)]
        manifest: PathBuf,
        /// Directory for mapping and structure files
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
        /// Override the file count a folder token needs to become a cluster
        #[arg(long)]
        min_cluster: Option<usize>,
        /// Skip embedded metadata extraction
        #[arg(long, default_value_t = false)]
        no_extract: bool,
        /// Extract metadata one file at a time
        #[arg(long, default_value_t = false)]
        sequential: bool,
        /// Also write taxonomy-analysis.json
        #[arg(long)]
        json: bool,
    },
    /// Move files into the proposed structure
    Organize {
        /// Mapping TSV produced by `taxonomy`
        #[arg(long)]
        mapping: PathBuf,
        /// Override the destination root
        #[arg(long)]
        dest_root: Option<PathBuf>,
        /// Where to write the organize log
        #[arg(long, default_value = "organize-log.txt")]
        log_file: PathBuf,
        /// Deletion log used to account for missing sources
        #[arg(long)]
        deletion_log: Option<PathBuf>,
        /// Plan and log only
        #[arg(long, default_value_t = false)]
        dry_run: bool,
        /// Process at most this many mapping rows
        #[arg(long)]
        limit: Option<usize>,
        /// Only categories starting with these prefixes (comma-separated)
        #[arg(long = "category", value_delimiter = ',', num_args = 1.., default_values_t = Vec::<String>::new())]
        categories: Vec<String>,
        /// Output JSON summary
        #[arg(long)]
        json: bool,
    },
    /// Move files from a delete list into the trash
    Delete {
        /// delete.txt produced by `dupes`
        #[arg(long)]
        delete_list: PathBuf,
        /// Override the trash directory
        #[arg(long)]
        trash_dir: Option<PathBuf>,
        /// Deletion log to append to
        #[arg(long, default_value = apply::DEFAULT_DELETION_LOG)]
        log_file: PathBuf,
        /// Report without moving anything
        #[arg(long, default_value_t = false)]
        dry_run: bool,
        /// Process at most this many entries
        #[arg(long)]
        limit: Option<usize>,
        /// Unlink files instead of moving them to the trash
        #[arg(long, default_value_t = false)]
        permanent: bool,
        /// Skip the confirmation prompt for --permanent
        #[arg(long, default_value_t = false)]
        yes: bool,
        /// Remove directories left empty, up to the configured trash roots (default)
        #[arg(long, overrides_with = "no_cleanup_dirs")]
        cleanup_dirs: bool,
        /// Leave emptied directories in place
        #[arg(long, overrides_with = "cleanup_dirs")]
        no_cleanup_dirs: bool,
        /// Output JSON summary
        #[arg(long)]
        json: bool,
    },
}

async fn run_scan(
    cfg: AppConfig,
    root: PathBuf,
    output: PathBuf,
    source: Option<String>,
    no_hash: bool,
    json: bool,
) -> Result<()> {
    let options = ScanOptions {
        root,
        source,
        hash: cfg.scan.hash && !no_hash,
        excludes: cfg.scan.exclude.clone(),
        known_sources: cfg.scan.known_sources.clone(),
    };
    let manifest = scanner::scan(&options).await?;
    manifest.write(&output)?;
    if json {
        let summary = serde_json::json!({
            "manifest": output.display().to_string(),
            "total_files": manifest.total_files,
            "total_size": manifest.total_size,
            "errors": manifest.errors,
            "stats": manifest.stats,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "scanned {} files ({}), {} errors -> {}",
            manifest.total_files,
            report::format_size(manifest.total_size),
            manifest.errors,
            output.display()
        );
    }
    Ok(())
}

fn run_dupes(cfg: AppConfig, manifest: PathBuf, output_dir: PathBuf, json: bool) -> Result<()> {
    let inventory = models::load_inventory(&manifest)?;
    let analysis = pipeline::run_dupes(&inventory, &cfg);
    outputs::write_duplicate_reports(&output_dir, &analysis, json)?;

    let s = &analysis.summary;
    println!("Total files:            {}", s.total_files);
    println!("Exact duplicate groups: {}", s.exact_duplicate_groups);
    println!(
        "Duplicates to delete:   {} ({})",
        s.exact_duplicates_to_delete,
        report::format_size(s.exact_duplicate_size_bytes)
    );
    println!("Junk files:             {}", s.junk_files);
    println!("Near-duplicate groups:  {}", s.near_duplicate_groups);
    println!("Files for review:       {}", s.files_for_review);
    Ok(())
}

async fn run_taxonomy(
    mut cfg: AppConfig,
    manifest: PathBuf,
    output_dir: PathBuf,
    min_cluster: Option<usize>,
    mode: ExtractionMode,
    json: bool,
) -> Result<()> {
    if let Some(n) = min_cluster {
        cfg.taxonomy.min_cluster_support = n;
    }
    let inventory = models::load_inventory(&manifest)?;
    let taxonomy = pipeline::run_taxonomy(&inventory, &cfg, mode).await?;
    outputs::write_taxonomy_reports(&output_dir, &taxonomy, json)?;

    info!("proposed structure:\n{}", taxonomy.tree().render());
    println!(
        "classified {} files into {} categories",
        taxonomy.total_files,
        taxonomy.categories.len()
    );
    for (category, stats) in taxonomy.ranked_categories().into_iter().take(20) {
        println!(
            "  {:<40} {:>8} files  {:>10}",
            category,
            stats.count,
            report::format_size(stats.size)
        );
    }
    Ok(())
}
