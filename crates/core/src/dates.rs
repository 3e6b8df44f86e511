//! Best-guess capture year: embedded metadata, then path, then mtime.

use crate::config::{TaxonomyConfig, YearRange};
use crate::models::FileRecord;
use crate::patterns;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum YearSource {
    Embedded,
    Path,
    Mtime,
}

impl YearSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            YearSource::Embedded => "exif",
            YearSource::Path => "path",
            YearSource::Mtime => "mtime",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolvedYear {
    pub year: i32,
    pub source: YearSource,
}

#[derive(Debug, Clone)]
pub struct DateResolver {
    embedded_range: YearRange,
    path_range: YearRange,
}

impl DateResolver {
    pub fn new(config: &TaxonomyConfig) -> Self {
        Self {
            embedded_range: config.embedded_year_range,
            path_range: config.path_year_range,
        }
    }

    /// First signal that produces a year wins; `None` when nothing does.
    pub fn best_year(&self, record: &FileRecord) -> Option<ResolvedYear> {
        if let Some(year) = record
            .capture_year
            .filter(|y| self.embedded_range.contains(*y))
        {
            return Some(ResolvedYear {
                year,
                source: YearSource::Embedded,
            });
        }
        if let Some(year) = self.path_year(&record.path) {
            return Some(ResolvedYear {
                year,
                source: YearSource::Path,
            });
        }
        mtime_year(&record.mtime).map(|year| ResolvedYear {
            year,
            source: YearSource::Mtime,
        })
    }

    /// All in-range years in `path`. A year only counts when it is a whole
    /// run of digits, so `20150612` or `120199` contribute nothing.
    pub fn path_years(&self, path: &str) -> Vec<i32> {
        patterns::digit_runs(path)
            .filter(|run| run.len() == 4)
            .filter_map(|run| run.parse::<i32>().ok())
            .filter(|year| self.path_range.contains(*year))
            .collect()
    }

    /// The most recent year in `path`.
    pub fn path_year(&self, path: &str) -> Option<i32> {
        self.path_years(path).into_iter().max()
    }
}

/// Leading four characters of an ISO timestamp as a year, unvalidated beyond being digits.
pub fn mtime_year(mtime: &str) -> Option<i32> {
    let head: String = mtime.chars().take(4).collect();
    if head.len() == 4 && head.bytes().all(|b| b.is_ascii_digit()) {
        head.parse().ok()
    } else {
        None
    }
}
