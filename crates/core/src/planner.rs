//! Turns a taxonomy mapping into concrete move operations.
//!
//! Planning only looks at the filesystem through [`FileProbe`], so every rule
//! here can be exercised without touching disk.

use crate::config::OrganizeConfig;
use crate::report::MAPPING_HEADER;
use anyhow::{bail, Context};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::ffi::OsString;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::warn;

const SIDECAR_EXTENSION: &str = "xmp";

/// Image formats that may carry an XMP sidecar.
const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "tiff", "tif", "heic", "heif", "cr2", "nef", "arw", "dng", "raw",
    "raf", "orf", "pef", "rw2", "srw", "x3f",
];

pub trait FileProbe {
    fn exists(&self, path: &Path) -> bool;
    /// Short content fingerprint used to disambiguate colliding destinations.
    fn short_hash(&self, path: &Path) -> String;
}

pub struct DiskProbe;

impl FileProbe for DiskProbe {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn short_hash(&self, path: &Path) -> String {
        let mut head = Vec::new();
        let read = fs::File::open(path).and_then(|f| f.take(64 * 1024).read_to_end(&mut head));
        let digest = match read {
            Ok(_) => blake3::hash(&head),
            Err(_) => blake3::hash(path.to_string_lossy().as_bytes()),
        };
        digest.to_hex()[..8].to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingEntry {
    pub path: String,
    pub category: String,
}

/// Parses `taxonomy-mapping.tsv`. Columns are located by header name; rows
/// keep file order and the first row for a path wins.
pub fn parse_mapping(tsv: &str) -> anyhow::Result<Vec<MappingEntry>> {
    let mut lines = tsv.lines();
    let header = lines.next().context("mapping file is empty")?;
    let columns: Vec<&str> = header.split('\t').collect();
    let (Some(path_col), Some(cat_col)) = (
        columns.iter().position(|c| *c == "current_path"),
        columns.iter().position(|c| *c == "proposed_category"),
    ) else {
        bail!("mapping header must be `{}`", MAPPING_HEADER);
    };

    let mut seen = HashSet::new();
    let mut entries = Vec::new();
    for (lineno, line) in lines.enumerate() {
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        let (Some(path), Some(category)) = (fields.get(path_col), fields.get(cat_col)) else {
            warn!("mapping line {} has too few columns", lineno + 2);
            continue;
        };
        if seen.insert(path.to_string()) {
            entries.push(MappingEntry {
                path: path.to_string(),
                category: category.to_string(),
            });
        }
    }
    Ok(entries)
}

#[derive(Debug, Clone, Default)]
pub struct PlanFilter {
    /// Category prefixes to keep; empty keeps everything.
    pub categories: Vec<String>,
    pub limit: Option<usize>,
}

impl PlanFilter {
    pub fn apply(&self, entries: Vec<MappingEntry>) -> Vec<MappingEntry> {
        let filtered = entries.into_iter().filter(|e| {
            self.categories.is_empty() || self.categories.iter().any(|c| e.category.starts_with(c.as_str()))
        });
        match self.limit {
            Some(n) => filtered.take(n).collect(),
            None => filtered.collect(),
        }
    }
}

/// Maps a category's top segment to a destination directory.
#[derive(Debug, Clone)]
pub struct Router {
    dest_root: PathBuf,
    routes: HashMap<String, String>,
    text_dest: String,
    photos_dest: String,
    fallback_dest: String,
}

impl Router {
    pub fn new(config: &OrganizeConfig) -> Self {
        Self {
            dest_root: PathBuf::from(&config.dest_root),
            // config keys arrive lower-cased, so match routes case-insensitively
            routes: config
                .routes
                .iter()
                .map(|(k, v)| (k.to_lowercase(), v.clone()))
                .collect(),
            text_dest: config.text_dest.clone(),
            photos_dest: config.photos_dest.clone(),
            fallback_dest: config.fallback_dest.clone(),
        }
    }

    pub fn with_dest_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.dest_root = root.into();
        self
    }

    pub fn destination(&self, source: &Path, category: &str) -> PathBuf {
        let (top, sub) = category.split_once('/').unwrap_or((category, ""));
        let base = if top == "Text" {
            if is_sidecar(source) {
                &self.photos_dest
            } else {
                &self.text_dest
            }
        } else {
            self.routes
                .get(&top.to_lowercase())
                .unwrap_or(&self.fallback_dest)
        };
        let mut dest = self.dest_root.join(base);
        for segment in sub.split('/').filter(|s| !s.is_empty()) {
            dest.push(segment);
        }
        match source.file_name() {
            Some(name) => dest.join(name),
            None => dest,
        }
    }
}

fn lower_ext(path: &Path) -> Option<String> {
    path.extension().map(|e| e.to_string_lossy().to_lowercase())
}

fn is_sidecar(path: &Path) -> bool {
    lower_ext(path).as_deref() == Some(SIDECAR_EXTENSION)
}

fn is_image(path: &Path) -> bool {
    lower_ext(path).is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.as_str()))
}

fn append_extension(path: &Path, ext: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

/// Whether an image in `mapping` will carry this sidecar along.
fn image_in_mapping(sidecar: &Path, mapping: &HashSet<&str>) -> bool {
    let contains = |p: &Path| mapping.contains(p.to_string_lossy().as_ref());
    if IMAGE_EXTENSIONS
        .iter()
        .any(|ext| contains(&sidecar.with_extension(ext)))
    {
        return true;
    }
    // image.jpg.xmp
    let base = sidecar.with_extension("");
    is_image(&base) && contains(&base)
}

fn find_sidecar(image: &Path, probe: &dyn FileProbe) -> Option<PathBuf> {
    ["xmp", "XMP"].iter().find_map(|ext| {
        [append_extension(image, ext), image.with_extension(ext)]
            .into_iter()
            .find(|candidate| probe.exists(candidate))
    })
}

/// `a.jpg.xmp` takes the image's full final name, `a.xmp` only its stem.
fn sidecar_destination(image_dest: &Path, sidecar: &Path) -> PathBuf {
    let ext = sidecar
        .extension()
        .map(|e| e.to_os_string())
        .unwrap_or_else(|| OsString::from(SIDECAR_EXTENSION));
    let base = if is_image(&sidecar.with_extension("")) {
        image_dest.file_name()
    } else {
        image_dest.file_stem()
    };
    let mut name = base.map(|b| b.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(ext);
    image_dest.with_file_name(name)
}

fn with_hash_suffix(dest: &Path, hash: &str) -> PathBuf {
    let stem = dest
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match dest.extension() {
        Some(ext) => format!("{}_{}.{}", stem, hash, ext.to_string_lossy()),
        None => format!("{}_{}", stem, hash),
    };
    dest.with_file_name(name)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveOperation {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub category: String,
    /// Filename of the image this sidecar travels with.
    pub sidecar_for: Option<String>,
    /// Destination before a conflict rename.
    pub original_dest: Option<PathBuf>,
}

impl MoveOperation {
    pub fn is_sidecar(&self) -> bool {
        self.sidecar_for.is_some()
    }

    pub fn conflict_resolved(&self) -> bool {
        self.original_dest.is_some()
    }

    pub fn top_category(&self) -> &str {
        self.category.split('/').next().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct OrganizePlan {
    pub operations: Vec<MoveOperation>,
    /// Mapped paths that are not on disk.
    pub missing: BTreeSet<String>,
    /// Sidecars that move with their image instead of on their own.
    pub skipped_sidecars: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MissingReport {
    pub accounted: BTreeSet<String>,
    pub unexpected: BTreeSet<String>,
}

impl OrganizePlan {
    pub fn sidecar_count(&self) -> usize {
        self.operations.iter().filter(|op| op.is_sidecar()).count()
    }

    pub fn conflict_count(&self) -> usize {
        self.operations.iter().filter(|op| op.conflict_resolved()).count()
    }

    pub fn by_top_category(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for op in &self.operations {
            *counts.entry(op.top_category().to_string()).or_default() += 1;
        }
        counts
    }

    /// Splits missing files into ones a deletion log explains and ones it doesn't.
    pub fn check_missing(&self, deleted: &HashSet<String>) -> MissingReport {
        let (accounted, unexpected): (BTreeSet<String>, BTreeSet<String>) = self
            .missing
            .iter()
            .cloned()
            .partition(|path| deleted.contains(path));
        MissingReport {
            accounted,
            unexpected,
        }
    }
}

pub fn plan_moves(entries: &[MappingEntry], router: &Router, probe: &dyn FileProbe) -> OrganizePlan {
    let mapped: HashSet<&str> = entries.iter().map(|e| e.path.as_str()).collect();
    let mut plan = OrganizePlan::default();
    let mut handled_sidecars: HashSet<PathBuf> = HashSet::new();
    let mut dest_sources: HashMap<PathBuf, usize> = HashMap::new();

    for entry in entries {
        let source = PathBuf::from(&entry.path);
        if !probe.exists(&source) {
            plan.missing.insert(entry.path.clone());
            continue;
        }
        if is_sidecar(&source) && (handled_sidecars.contains(&source) || image_in_mapping(&source, &mapped)) {
            plan.skipped_sidecars.insert(entry.path.clone());
            continue;
        }

        let destination = router.destination(&source, &entry.category);
        *dest_sources.entry(destination.clone()).or_default() += 1;

        let sidecar = if is_image(&source) {
            find_sidecar(&source, probe).filter(|s| !handled_sidecars.contains(s))
        } else {
            None
        };
        let sidecar_op = sidecar.map(|sidecar| {
            handled_sidecars.insert(sidecar.clone());
            MoveOperation {
                destination: sidecar_destination(&destination, &sidecar),
                source: sidecar,
                category: entry.category.clone(),
                sidecar_for: source.file_name().map(|n| n.to_string_lossy().into_owned()),
                original_dest: None,
            }
        });

        plan.operations.push(MoveOperation {
            source,
            destination,
            category: entry.category.clone(),
            sidecar_for: None,
            original_dest: None,
        });
        plan.operations.extend(sidecar_op);
    }

    for op in plan.operations.iter_mut().filter(|op| !op.is_sidecar()) {
        if dest_sources.get(&op.destination).copied().unwrap_or(0) > 1 {
            let renamed = with_hash_suffix(&op.destination, &probe.short_hash(&op.source));
            op.original_dest = Some(std::mem::replace(&mut op.destination, renamed));
        }
    }

    // a sidecar always directly follows its image
    let mut image_dest: Option<PathBuf> = None;
    for op in plan.operations.iter_mut() {
        if !op.is_sidecar() {
            image_dest = Some(op.destination.clone());
        } else if let Some(image) = &image_dest {
            op.destination = sidecar_destination(image, &op.source);
        }
    }

    plan
}

/// Outcome of one executed (or simulated) move, for the organize log.
#[derive(Debug, Clone)]
pub struct MoveResult {
    pub op: MoveOperation,
    /// Where the file actually went; differs from the plan when the target already existed.
    pub final_dest: PathBuf,
    pub error: Option<String>,
}

pub fn render_organize_log(
    results: &[MoveResult],
    dry_run: bool,
    generated_at: &str,
    missing: Option<&MissingReport>,
) -> String {
    let rule = "=".repeat(80);
    let thin = "-".repeat(40);
    let ok = results.iter().filter(|r| r.error.is_none()).count();
    let conflicts = results
        .iter()
        .filter(|r| r.op.conflict_resolved() || r.final_dest != r.op.destination)
        .count();
    let sidecars = results.iter().filter(|r| r.op.is_sidecar()).count();

    let mut out = format!(
        "Organize Operations Log - {}\nGenerated: {}\n{}\n\n",
        if dry_run { "DRY RUN" } else { "EXECUTED" },
        generated_at,
        rule
    );
    out.push_str(&format!(
        "Summary:\n  Total operations: {}\n  Successful: {}\n  Failed: {}\n  Conflicts resolved: {}\n  XMP sidecars moved: {}\n",
        results.len(),
        ok,
        results.len() - ok,
        conflicts,
        sidecars
    ));
    if let Some(m) = missing {
        out.push_str(&format!(
            "\nMissing Files Sanity Check:\n  Total missing from mapping: {}\n  Accounted for (in deletion log): {}\n  Unexpected missing: {}\n",
            m.accounted.len() + m.unexpected.len(),
            m.accounted.len(),
            m.unexpected.len()
        ));
    }
    out.push_str(&format!("\n{}\n\n", rule));

    if let Some(m) = missing.filter(|m| !m.unexpected.is_empty()) {
        out.push_str(&format!(
            "UNEXPECTED MISSING FILES:\n{}\nThese files are in the mapping but not on disk and NOT in deletion log:\n\n",
            thin
        ));
        for path in &m.unexpected {
            out.push_str(&format!("  {}\n", path));
        }
        out.push_str(&format!("\n{}\n\n", rule));
    }

    out.push_str(&format!("SUCCESSFUL MOVES:\n{}\n", thin));
    for r in results.iter().filter(|r| r.error.is_none()) {
        if r.op.is_sidecar() {
            out.push_str("[SIDECAR] ");
        }
        if r.op.conflict_resolved() || r.final_dest != r.op.destination {
            out.push_str("[CONFLICT RESOLVED] ");
        }
        out.push_str(&format!(
            "\n  FROM: {}\n  TO:   {}\n",
            r.op.source.display(),
            r.final_dest.display()
        ));
        if let Some(orig) = &r.op.original_dest {
            out.push_str(&format!("  ORIG: {}\n", orig.display()));
        }
        out.push('\n');
    }

    if ok < results.len() {
        out.push_str(&format!("\nFAILED MOVES:\n{}\n", thin));
        for r in results.iter() {
            if let Some(err) = &r.error {
                out.push_str(&format!(
                    "  FROM: {}\n  TO:   {}\n  ERROR: {}\n\n",
                    r.op.source.display(),
                    r.op.destination.display(),
                    err
                ));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeDisk(HashSet<PathBuf>);

    impl FakeDisk {
        fn with(paths: &[&str]) -> Self {
            Self(paths.iter().map(PathBuf::from).collect())
        }
    }

    impl FileProbe for FakeDisk {
        fn exists(&self, path: &Path) -> bool {
            self.0.contains(path)
        }

        fn short_hash(&self, path: &Path) -> String {
            blake3::hash(path.to_string_lossy().as_bytes()).to_hex()[..8].to_string()
        }
    }

    fn router() -> Router {
        Router::new(&OrganizeConfig::default()).with_dest_root("/dest")
    }

    fn entry(path: &str, category: &str) -> MappingEntry {
        MappingEntry {
            path: path.into(),
            category: category.into(),
        }
    }

    #[test]
    fn routes_follow_top_category() {
        let r = router();
        assert_eq!(
            r.destination(Path::new("/in/a.jpg"), "Images/Trips/2012"),
            PathBuf::from("/dest/photos/Trips/2012/a.jpg")
        );
        assert_eq!(
            r.destination(Path::new("/in/a.pdf"), "Documents"),
            PathBuf::from("/dest/documents/a.pdf")
        );
        assert_eq!(
            r.destination(Path::new("/in/main.rs"), "Text/2020"),
            PathBuf::from("/dest/documents/Code/2020/main.rs")
        );
        assert_eq!(
            r.destination(Path::new("/in/a.xmp"), "Text/2020"),
            PathBuf::from("/dest/photos/2020/a.xmp")
        );
        assert_eq!(
            r.destination(Path::new("/in/a.ttf"), "Fonts"),
            PathBuf::from("/dest/archives/a.ttf")
        );
    }

    #[test]
    fn lowercased_route_keys_still_match() {
        let mut config = OrganizeConfig::default();
        config.routes = BTreeMap::from([("videos".to_string(), "film".to_string())]);
        let r = Router::new(&config).with_dest_root("/d");
        assert_eq!(
            r.destination(Path::new("/x/m.mov"), "Videos/2001"),
            PathBuf::from("/d/film/2001/m.mov")
        );
    }

    #[test]
    fn sidecars_travel_with_their_image() {
        let disk = FakeDisk::with(&["/in/a.jpg", "/in/a.jpg.xmp", "/in/b.cr2", "/in/b.xmp", "/in/lone.xmp"]);
        let entries = vec![
            entry("/in/a.jpg", "Images/2019"),
            entry("/in/a.jpg.xmp", "Text/2019"),
            entry("/in/b.xmp", "Text/2018"),
            entry("/in/b.cr2", "Images/2018"),
            entry("/in/lone.xmp", "Text"),
        ];
        let plan = plan_moves(&entries, &router(), &disk);

        let dests: Vec<(&Path, &Path)> = plan
            .operations
            .iter()
            .map(|op| (op.source.as_path(), op.destination.as_path()))
            .collect();
        assert_eq!(
            dests,
            vec![
                (Path::new("/in/a.jpg"), Path::new("/dest/photos/2019/a.jpg")),
                (Path::new("/in/a.jpg.xmp"), Path::new("/dest/photos/2019/a.jpg.xmp")),
                (Path::new("/in/b.cr2"), Path::new("/dest/photos/2018/b.cr2")),
                (Path::new("/in/b.xmp"), Path::new("/dest/photos/2018/b.xmp")),
                (Path::new("/in/lone.xmp"), Path::new("/dest/photos/lone.xmp")),
            ]
        );
        assert_eq!(plan.sidecar_count(), 2);
        assert!(plan.skipped_sidecars.contains("/in/a.jpg.xmp"));
        assert!(plan.skipped_sidecars.contains("/in/b.xmp"));
    }

    #[test]
    fn colliding_destinations_get_hash_suffixes() {
        let disk = FakeDisk::with(&["/in/x/report.pdf", "/in/y/report.pdf", "/in/z/other.pdf"]);
        let entries = vec![
            entry("/in/x/report.pdf", "Documents"),
            entry("/in/y/report.pdf", "Documents"),
            entry("/in/z/other.pdf", "Documents"),
        ];
        let plan = plan_moves(&entries, &router(), &disk);
        assert_eq!(plan.conflict_count(), 2);
        let first = &plan.operations[0];
        let hash = disk.short_hash(Path::new("/in/x/report.pdf"));
        assert_eq!(
            first.destination,
            PathBuf::from(format!("/dest/documents/report_{}.pdf", hash))
        );
        assert_eq!(
            first.original_dest.as_deref(),
            Some(Path::new("/dest/documents/report.pdf"))
        );
        assert_ne!(plan.operations[0].destination, plan.operations[1].destination);
        assert!(!plan.operations[2].conflict_resolved());
    }

    #[test]
    fn sidecars_take_their_image_conflict_suffix() {
        let disk = FakeDisk::with(&["/x/a.jpg", "/x/a.jpg.xmp", "/y/a.jpg", "/y/a.xmp"]);
        let entries = vec![entry("/x/a.jpg", "Images/2019"), entry("/y/a.jpg", "Images/2019")];
        let plan = plan_moves(&entries, &router(), &disk);
        assert_eq!(plan.operations.len(), 4);

        let x_hash = disk.short_hash(Path::new("/x/a.jpg"));
        let y_hash = disk.short_hash(Path::new("/y/a.jpg"));
        let dests: Vec<PathBuf> = plan.operations.iter().map(|op| op.destination.clone()).collect();
        assert_eq!(dests[0], PathBuf::from(format!("/dest/photos/2019/a_{}.jpg", x_hash)));
        assert_eq!(dests[1], PathBuf::from(format!("/dest/photos/2019/a_{}.jpg.xmp", x_hash)));
        assert_eq!(dests[2], PathBuf::from(format!("/dest/photos/2019/a_{}.jpg", y_hash)));
        assert_eq!(dests[3], PathBuf::from(format!("/dest/photos/2019/a_{}.xmp", y_hash)));
        assert_ne!(dests[1], dests[3]);
    }

    #[test]
    fn missing_files_are_checked_against_deletion_log() {
        let disk = FakeDisk::with(&["/in/here.pdf"]);
        let entries = vec![
            entry("/in/here.pdf", "Documents"),
            entry("/in/deleted.pdf", "Documents"),
            entry("/in/vanished.pdf", "Documents"),
        ];
        let plan = plan_moves(&entries, &router(), &disk);
        let deleted = HashSet::from(["/in/deleted.pdf".to_string()]);
        let report = plan.check_missing(&deleted);
        assert_eq!(report.accounted.len(), 1);
        assert!(report.unexpected.contains("/in/vanished.pdf"));

        let results: Vec<MoveResult> = plan
            .operations
            .iter()
            .map(|op| MoveResult {
                op: op.clone(),
                final_dest: op.destination.clone(),
                error: None,
            })
            .collect();
        let log = render_organize_log(&results, true, "2024-01-01T00:00:00", Some(&report));
        assert!(log.starts_with("Organize Operations Log - DRY RUN\n"));
        assert!(log.contains("  Unexpected missing: 1\n"));
        assert!(log.contains("  /in/vanished.pdf\n"));
        assert!(log.contains("  FROM: /in/here.pdf\n  TO:   /dest/documents/here.pdf\n"));
    }

    #[test]
    fn mapping_parse_and_filters() {
        let tsv = format!(
            "{}\n/a.jpg\tImages/2019\tImages\t2019\n/b.pdf\tDocuments\tDocuments\t\n/a.jpg\tOther\tOther\t\n/c.jpg\tImages\tImages\t\n",
            MAPPING_HEADER
        );
        let entries = parse_mapping(&tsv).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].category, "Images/2019");

        let filter = PlanFilter {
            categories: vec!["Images".into()],
            limit: Some(1),
        };
        let kept = filter.apply(entries);
        assert_eq!(kept, vec![entry("/a.jpg", "Images/2019")]);

        assert!(parse_mapping("path\tcategory\n").is_err());
    }
}
