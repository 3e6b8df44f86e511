use cli::apply::{self, DeleteOptions, OrganizeOptions};
use cli::outputs;
use curator_core::config::{AppConfig, SafetyConfig};
use curator_core::deletion::DELETION_LOG_HEADER;
use curator_core::models;
use curator_core::pipeline::{self, ExtractionMode};
use curator_core::planner::{self, PlanFilter, Router};
use curator_core::report::MAPPING_HEADER;
use curator_core::scanner::{self, ScanOptions};
use std::fs;
use tempfile::tempdir;

#[tokio::test]
async fn scan_dupes_taxonomy_delete_organize() {
    // 1. Archive with one exact duplicate, one junk file and a hidden folder
    let temp = tempdir().unwrap();
    let archive = temp.path().join("archive");
    let out = temp.path().join("out");
    let trash = temp.path().join("trash");
    let organized = temp.path().join("organized");

    fs::create_dir_all(archive.join("gdrive/Docs")).unwrap();
    fs::create_dir_all(archive.join("dropbox/Docs")).unwrap();
    fs::create_dir_all(archive.join("gdrive/.hidden")).unwrap();
    let original = archive.join("gdrive/Docs/report.txt");
    let copy = archive.join("dropbox/Docs/report (1).txt");
    let junk = archive.join("gdrive/Docs/notes.tmp");
    fs::write(&original, "quarterly numbers").unwrap();
    fs::write(&copy, "quarterly numbers").unwrap();
    fs::write(&junk, "scratch").unwrap();
    fs::write(archive.join("gdrive/.hidden/secret.txt"), "skip me").unwrap();

    let mut cfg = AppConfig::default();
    cfg.safety = SafetyConfig {
        trash_roots: vec![archive.to_string_lossy().into_owned()],
        ..Default::default()
    };

    // 2. Scan
    let manifest = scanner::scan(&ScanOptions {
        root: archive.clone(),
        source: None,
        hash: true,
        excludes: vec![],
        known_sources: cfg.scan.known_sources.clone(),
    })
    .await
    .unwrap();
    assert_eq!(manifest.total_files, 3);
    assert_eq!(manifest.errors, 0);
    let manifest_path = out.join("manifest.json");
    manifest.write(&manifest_path).unwrap();

    // 3. Duplicate analysis
    let inventory = models::load_inventory(&manifest_path).unwrap();
    assert_eq!(inventory.len(), 3);
    let analysis = pipeline::run_dupes(&inventory, &cfg);
    assert_eq!(analysis.summary.exact_duplicate_groups, 1);
    assert_eq!(analysis.summary.junk_files, 1);
    let written = outputs::write_duplicate_reports(&out, &analysis, true).unwrap();
    assert_eq!(written.len(), 4);

    let keep = fs::read_to_string(out.join(outputs::KEEP_FILE)).unwrap();
    assert_eq!(keep, format!("{}\n", original.display()));
    let delete = fs::read_to_string(out.join(outputs::DELETE_FILE)).unwrap();
    assert_eq!(delete.lines().count(), 2);
    assert!(delete.contains(&format!("{}\t# junk/temp file", junk.display())));
    assert!(delete.contains(&copy.display().to_string()));
    assert!(fs::read_to_string(out.join(outputs::REVIEW_FILE)).unwrap().is_empty());

    // 4. Taxonomy, no metadata extraction
    let taxonomy = pipeline::run_taxonomy(&inventory, &cfg, ExtractionMode::Skip)
        .await
        .unwrap();
    assert_eq!(taxonomy.assignments.len(), 3);
    outputs::write_taxonomy_reports(&out, &taxonomy, false).unwrap();
    let mapping = fs::read_to_string(out.join(outputs::MAPPING_FILE)).unwrap();
    assert_eq!(mapping.lines().next(), Some(MAPPING_HEADER));
    assert_eq!(mapping.lines().count(), 4);
    assert!(!out.join(outputs::ANALYSIS_JSON).exists());
    let structure = fs::read_to_string(out.join(outputs::STRUCTURE_FILE)).unwrap();
    assert!(structure.starts_with("Proposed Taxonomy Structure\n"));

    // 5. Delete into the trash
    let deletion_log = out.join(apply::DEFAULT_DELETION_LOG);
    let deleted = apply::delete(
        &DeleteOptions {
            delete_list: out.join(outputs::DELETE_FILE),
            trash_dir: Some(trash.clone()),
            log_file: deletion_log.clone(),
            dry_run: false,
            limit: None,
            permanent: false,
            cleanup_dirs: true,
        },
        &cfg.safety,
    )
    .unwrap();
    assert_eq!(deleted.removed, 2);
    assert_eq!(deleted.missing, 0);
    assert!(!copy.exists());
    assert_eq!(deleted.dirs_removed, 2);
    assert!(!archive.join("dropbox").exists());
    assert!(archive.join("gdrive/Docs").exists());
    assert!(trash.join("dropbox/Docs/report (1).txt").exists());
    assert!(trash.join("gdrive/Docs/notes.tmp").exists());
    let log = fs::read_to_string(&deletion_log).unwrap();
    assert_eq!(log.lines().next(), Some(DELETION_LOG_HEADER));
    assert_eq!(log.lines().count(), 3);
    assert!(log.lines().skip(1).all(|row| row.split('\t').nth(1) == Some("MOVED")));

    // 6. Organize what is left; deleted files count as accounted for
    let summary = apply::organize(
        &OrganizeOptions {
            mapping: out.join(outputs::MAPPING_FILE),
            dest_root: Some(organized.clone()),
            log_file: out.join("organize-log.txt"),
            deletion_log: None,
            dry_run: false,
            filter: PlanFilter::default(),
        },
        &cfg,
    )
    .unwrap();
    assert_eq!(summary.planned, 1);
    assert_eq!(summary.moved, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.missing_accounted, 2);
    assert_eq!(summary.missing_unexpected, 0);

    let entries = planner::parse_mapping(&mapping).unwrap();
    let entry = entries
        .iter()
        .find(|e| e.path == original.to_string_lossy())
        .unwrap();
    let expected = Router::new(&cfg.organize)
        .with_dest_root(&organized)
        .destination(&original, &entry.category);
    assert!(expected.starts_with(organized.join("documents/Code")));
    assert_eq!(fs::read_to_string(&expected).unwrap(), "quarterly numbers");
    assert!(!original.exists());
    assert!(out.join("organize-log.txt").exists());
}

#[test]
fn dry_run_delete_leaves_files_in_place() {
    let temp = tempdir().unwrap();
    let victim = temp.path().join("old.bak");
    fs::write(&victim, "x").unwrap();
    let list = temp.path().join("delete.txt");
    fs::write(&list, format!("{}\t# junk/temp file\n", victim.display())).unwrap();
    let safety = SafetyConfig {
        trash_dir: Some(temp.path().join("trash").to_string_lossy().into_owned()),
        ..Default::default()
    };
    let summary = apply::delete(
        &DeleteOptions {
            delete_list: list,
            trash_dir: None,
            log_file: temp.path().join("log.txt"),
            dry_run: true,
            limit: None,
            permanent: false,
            cleanup_dirs: true,
        },
        &safety,
    )
    .unwrap();
    assert_eq!(summary.removed, 1);
    assert_eq!(summary.bytes, 1);
    assert!(victim.exists());
    assert!(!temp.path().join("log.txt").exists());
}

#[test]
fn denied_paths_are_not_trashed() {
    let temp = tempdir().unwrap();
    let victim = temp.path().join("keep/a.tmp");
    fs::create_dir_all(victim.parent().unwrap()).unwrap();
    fs::write(&victim, "x").unwrap();
    let list = temp.path().join("delete.txt");
    fs::write(&list, format!("{}\n", victim.display())).unwrap();
    let safety = SafetyConfig {
        deny_paths: vec![temp.path().join("keep").to_string_lossy().into_owned()],
        ..Default::default()
    };
    let summary = apply::delete(
        &DeleteOptions {
            delete_list: list,
            trash_dir: Some(temp.path().join("trash")),
            log_file: temp.path().join("log.txt"),
            dry_run: false,
            limit: None,
            permanent: false,
            cleanup_dirs: true,
        },
        &safety,
    )
    .unwrap();
    assert_eq!(summary.denied, 1);
    assert!(victim.exists());
}

#[test]
fn permanent_delete_unlinks_and_logs_deleted() {
    let temp = tempdir().unwrap();
    let root = temp.path().join("ingest");
    let victim = root.join("gdrive/old/a.tmp");
    fs::create_dir_all(victim.parent().unwrap()).unwrap();
    fs::write(&victim, "abc").unwrap();
    let list = temp.path().join("delete.txt");
    fs::write(&list, format!("{}\t# junk/temp file\n", victim.display())).unwrap();
    let log_file = temp.path().join("log.txt");
    let safety = SafetyConfig {
        trash_roots: vec![root.to_string_lossy().into_owned()],
        ..Default::default()
    };

    let summary = apply::delete(
        &DeleteOptions {
            delete_list: list,
            trash_dir: None,
            log_file: log_file.clone(),
            dry_run: false,
            limit: None,
            permanent: true,
            cleanup_dirs: true,
        },
        &safety,
    )
    .unwrap();
    assert_eq!(summary.removed, 1);
    assert_eq!(summary.bytes, 3);
    assert_eq!(summary.dirs_removed, 2);
    assert!(!victim.exists());
    assert!(root.exists());
    assert!(!temp.path().join("trash").exists());

    let log = fs::read_to_string(&log_file).unwrap();
    let row: Vec<&str> = log.lines().nth(1).unwrap().split('\t').collect();
    assert_eq!(row[1], "DELETED");
    assert_eq!(row[2], victim.to_string_lossy());
    assert_eq!(row[3], "");
    assert_eq!(row[4], "3");
}

#[test]
fn no_cleanup_keeps_emptied_directories() {
    let temp = tempdir().unwrap();
    let root = temp.path().join("ingest");
    let victim = root.join("dropbox/x.bak");
    fs::create_dir_all(victim.parent().unwrap()).unwrap();
    fs::write(&victim, "x").unwrap();
    let list = temp.path().join("delete.txt");
    fs::write(&list, format!("{}\n", victim.display())).unwrap();
    let safety = SafetyConfig {
        trash_roots: vec![root.to_string_lossy().into_owned()],
        ..Default::default()
    };
    let summary = apply::delete(
        &DeleteOptions {
            delete_list: list,
            trash_dir: Some(temp.path().join("trash")),
            log_file: temp.path().join("log.txt"),
            dry_run: false,
            limit: None,
            permanent: false,
            cleanup_dirs: false,
        },
        &safety,
    )
    .unwrap();
    assert_eq!(summary.removed, 1);
    assert_eq!(summary.dirs_removed, 0);
    assert!(root.join("dropbox").exists());
    assert!(temp.path().join("trash/dropbox/x.bak").exists());
}

#[test]
fn organize_dry_run_reports_denied_sources() {
    let temp = tempdir().unwrap();
    let locked = temp.path().join("locked/a.txt");
    let open = temp.path().join("open/b.txt");
    for path in [&locked, &open] {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "x").unwrap();
    }
    let mapping = temp.path().join("mapping.tsv");
    fs::write(
        &mapping,
        format!(
            "{}\n{}\tText\ttext\t\n{}\tText\ttext\t\n",
            MAPPING_HEADER,
            locked.display(),
            open.display()
        ),
    )
    .unwrap();
    let mut cfg = AppConfig::default();
    cfg.safety.deny_paths = vec![temp.path().join("locked").to_string_lossy().into_owned()];

    let summary = apply::organize(
        &OrganizeOptions {
            mapping,
            dest_root: Some(temp.path().join("organized")),
            log_file: temp.path().join("organize-log.txt"),
            deletion_log: None,
            dry_run: true,
            filter: PlanFilter::default(),
        },
        &cfg,
    )
    .unwrap();
    assert_eq!(summary.planned, 2);
    assert_eq!(summary.denied, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.moved, 0);
    assert!(locked.exists());
    assert!(open.exists());
}
