//! Compiled pattern tables shared by the duplicate and taxonomy engines.
//!
//! Table order is significant: the first matching copy-variant pattern decides
//! the canonical name, and the first matching shard layout wins.

use crate::shards::ShardKind;
use regex::Regex;
use std::sync::LazyLock;

/// Transient or system artifacts. Each pattern covers the whole filename.
static JUNK_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^~\$.*$",            // office lock files: ~$report.docx
        r"^.*\.tmp$",
        r"^.*\.temp$",
        r"^\.DS_Store$",
        r"^Thumbs\.db$",
        r"^.*\.bak$",
        r"^.*~$",              // editor backups
        r"^desktop\.ini$",
        r"^.*\.lrcat-journal$",
        r"^.*\.partial$",      // incomplete downloads
        r"^.*\.lock$",
    ]
    .iter()
    .map(|p| Regex::new(&format!("(?i){}", p)).unwrap())
    .collect()
});

/// Copy/variant names, paired with the replacement that yields the canonical name.
static COPY_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"^Copy of (.+)$", "${1}"),
        (r"^(.+) - Copy(\.[^.]+)?$", "${1}${2}"),
        (r"^(.+) \((\d+)\)(\.[^.]+)?$", "${1}${3}"),
        (r"^(.+)[-_]copy(\.[^.]+)?$", "${1}${2}"),
        (r"^(.+)[-_]backup(\.[^.]+)?$", "${1}${2}"),
        (r"^(.+)[-_]old(\.[^.]+)?$", "${1}${2}"),
        (r"^(.+)[-_]v(\d+)(\.[^.]+)?$", "${1}${3}"),
        (r"^(.+)[-_]final(\.[^.]+)?$", "${1}${2}"),
        (r"^(.+)[-_]FINAL(\.[^.]+)?$", "${1}${2}"),
        (r"^(.+)[-_]final[-_]final(\.[^.]+)?$", "${1}${2}"),
    ]
    .iter()
    .map(|(p, r)| (Regex::new(&format!("(?i){}", p)).unwrap(), *r))
    .collect()
});

/// Storage-internal sharded layouts, matched against a `/`-separated path.
static SHARD_LAYOUTS: LazyLock<Vec<(ShardKind, Regex)>> = LazyLock::new(|| {
    vec![
        (
            ShardKind::ApplePhotosLibrary,
            Regex::new(
                r"(?i)\.photoslibrary/(?:originals|resources/(?:derivatives|renders|proxies|media)(?:/[a-z]+)?)/[0-9a-f]{1,2}/",
            )
            .unwrap(),
        ),
        (
            ShardKind::SyncDerivatives,
            Regex::new(r"(?i)(?:\.derivatives|/\.sync/derivatives)/[0-9a-f]{2}/").unwrap(),
        ),
        (
            ShardKind::ContentAddressed,
            Regex::new(r"(?i)(?:^|/)[0-9a-f]{2}/[0-9a-f]{32,}(?:\.[a-z0-9]+)?$").unwrap(),
        ),
    ]
});

static DIGIT_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[0-9]+").unwrap());

static TOKEN_SEPARATORS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\s_\-.]+").unwrap());

static YEAR_MONTH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(19[89]\d|20[012]\d)[-_](0[1-9]|1[0-2])\b").unwrap());

pub fn is_junk(filename: &str) -> bool {
    JUNK_PATTERNS.iter().any(|p| p.is_match(filename))
}

/// Canonical name of a copy variant (`"Report (2).pdf"` -> `"Report.pdf"`),
/// or `None` when the filename is not a variant.
pub fn canonical_name(filename: &str) -> Option<String> {
    COPY_PATTERNS
        .iter()
        .find(|(pattern, _)| pattern.is_match(filename))
        .map(|(pattern, replacement)| pattern.replace(filename, *replacement).into_owned())
}

pub fn is_copy_variant(filename: &str) -> bool {
    canonical_name(filename).is_some()
}

pub fn match_shard(path: &str) -> Option<ShardKind> {
    let normalized = path.replace('\\', "/");
    SHARD_LAYOUTS
        .iter()
        .find(|(_, pattern)| pattern.is_match(&normalized))
        .map(|(kind, _)| *kind)
}

/// Every maximal run of ASCII digits in `text`.
pub fn digit_runs(text: &str) -> impl Iterator<Item = &str> {
    DIGIT_RUN.find_iter(text).map(|m| m.as_str())
}

pub fn split_tokens(text: &str) -> impl Iterator<Item = &str> {
    TOKEN_SEPARATORS.split(text)
}

/// `YYYY-MM` keys for every year/month pair in `text`.
pub fn year_months(text: &str) -> Vec<String> {
    YEAR_MONTH
        .captures_iter(text)
        .map(|caps| format!("{}-{}", &caps[1], &caps[2]))
        .collect()
}
