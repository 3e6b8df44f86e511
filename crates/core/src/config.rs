use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub dedupe: DedupeConfig,
    #[serde(default)]
    pub taxonomy: TaxonomyConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub organize: OrganizeConfig,
    #[serde(default)]
    pub safety: SafetyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Top-level directory names under a scan root that count as a source label.
    #[serde(default = "default_known_sources")]
    pub known_sources: Vec<String>,
    #[serde(default = "default_true")]
    pub hash: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            exclude: Vec::new(),
            known_sources: default_known_sources(),
            hash: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupeConfig {
    /// Higher wins the last keep tie-break. Sources missing here rank 0.
    #[serde(default = "default_source_priority")]
    pub source_priority: BTreeMap<String, i32>,
}

impl Default for DedupeConfig {
    fn default() -> Self {
        Self {
            source_priority: default_source_priority(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearRange {
    pub min: i32,
    pub max: i32,
}

impl YearRange {
    pub fn contains(&self, year: i32) -> bool {
        (self.min..=self.max).contains(&year)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxonomyConfig {
    /// Files a folder token needs before it is reported as a cluster.
    #[serde(default = "default_min_cluster_support")]
    pub min_cluster_support: usize,
    /// Files a cluster needs before it may refine a category.
    #[serde(default = "default_category_cluster_support")]
    pub category_cluster_support: usize,
    #[serde(default = "default_embedded_year_range")]
    pub embedded_year_range: YearRange,
    #[serde(default = "default_path_year_range")]
    pub path_year_range: YearRange,
}

impl Default for TaxonomyConfig {
    fn default() -> Self {
        Self {
            min_cluster_support: default_min_cluster_support(),
            category_cluster_support: default_category_cluster_support(),
            embedded_year_range: default_embedded_year_range(),
            path_year_range: default_path_year_range(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Concurrent extraction tasks.
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_progress_every")]
    pub progress_every: usize,
    #[serde(default = "default_max_xmp_bytes")]
    pub max_xmp_bytes: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            workers: default_workers(),
            progress_every: default_progress_every(),
            max_xmp_bytes: default_max_xmp_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizeConfig {
    #[serde(default = "default_dest_root")]
    pub dest_root: String,
    /// Top-level category -> directory relative to `dest_root`.
    #[serde(default = "default_routes")]
    pub routes: BTreeMap<String, String>,
    #[serde(default = "default_text_dest")]
    pub text_dest: String,
    #[serde(default = "default_photos_dest")]
    pub photos_dest: String,
    #[serde(default = "default_fallback_dest")]
    pub fallback_dest: String,
}

impl Default for OrganizeConfig {
    fn default() -> Self {
        Self {
            dest_root: default_dest_root(),
            routes: default_routes(),
            text_dest: default_text_dest(),
            photos_dest: default_photos_dest(),
            fallback_dest: default_fallback_dest(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SafetyConfig {
    #[serde(default)]
    pub allow_paths: Vec<String>,
    #[serde(default)]
    pub deny_paths: Vec<String>,
    #[serde(default)]
    pub trash_dir: Option<String>,
    /// Prefixes stripped from a deleted file's path before it is placed in the trash.
    #[serde(default)]
    pub trash_roots: Vec<String>,
    #[serde(default)]
    pub copy_then_delete: bool,
}

fn default_true() -> bool {
    true
}

fn default_known_sources() -> Vec<String> {
    vec!["gdrive".into(), "dropbox".into(), "onedrive".into()]
}

fn default_source_priority() -> BTreeMap<String, i32> {
    BTreeMap::from([
        ("gdrive".to_string(), 3),
        ("dropbox".to_string(), 2),
        ("onedrive".to_string(), 1),
    ])
}

fn default_min_cluster_support() -> usize {
    10
}

fn default_category_cluster_support() -> usize {
    50
}

fn default_embedded_year_range() -> YearRange {
    YearRange {
        min: 1980,
        max: 2030,
    }
}

fn default_path_year_range() -> YearRange {
    YearRange {
        min: 1980,
        max: 2029,
    }
}

fn default_workers() -> usize {
    4
}

fn default_progress_every() -> usize {
    500
}

fn default_max_xmp_bytes() -> usize {
    256 * 1024
}

fn default_dest_root() -> String {
    "organized".to_string()
}

fn default_routes() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("Images".to_string(), "photos".to_string()),
        ("Documents".to_string(), "documents".to_string()),
        ("Videos".to_string(), "movies".to_string()),
        ("Audio".to_string(), "music".to_string()),
        ("Other".to_string(), "archives".to_string()),
    ])
}

fn default_text_dest() -> String {
    "documents/Code".to_string()
}

fn default_photos_dest() -> String {
    "photos".to_string()
}

fn default_fallback_dest() -> String {
    "archives".to_string()
}

pub fn load(path: Option<&str>) -> anyhow::Result<AppConfig> {
    let mut settings = config::Config::builder();
    if let Some(p) = path {
        settings = settings.add_source(config::File::with_name(p));
    } else {
        settings = settings.add_source(config::File::with_name("config/default").required(false));
    }
    let cfg = settings.build()?;
    Ok(cfg.try_deserialize()?)
}
