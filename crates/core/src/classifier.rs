//! Category assignment: content bucket, then shard or cluster refinement, then year.

use crate::clusters::{self, ClusterSet};
use crate::dates::ResolvedYear;
use crate::models::{CategoryAssignment, FileRecord};
use crate::shards::ShardKind;

pub const OTHER_BUCKET: &str = "Other";

/// Top-level bucket for a MIME type, keyed on the part before `/`.
pub fn content_bucket(mime_type: &str) -> &'static str {
    let Some((prefix, _)) = mime_type.split_once('/') else {
        return OTHER_BUCKET;
    };
    match prefix {
        "image" => "Images",
        "video" => "Videos",
        "audio" => "Audio",
        "text" => "Text",
        "application" => "Documents",
        "font" => "Fonts",
        "model" => "3D Models",
        "message" => "Messages",
        "multipart" => "Archives",
        "chemical" => "Scientific",
        _ => OTHER_BUCKET,
    }
}

/// Upper-cases the first letter of every alphabetic run and lower-cases the rest,
/// so `"mp3s"` becomes `"Mp3S"` and `"o'neil"` becomes `"O'Neil"`.
pub fn title_case(token: &str) -> String {
    let mut out = String::with_capacity(token.len());
    let mut in_word = false;
    for ch in token.chars() {
        if ch.is_alphabetic() {
            if in_word {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(ch);
            in_word = false;
        }
    }
    out
}

pub struct CategoryAssigner {
    clusters: ClusterSet,
}

impl CategoryAssigner {
    /// Only clusters with at least `category_support` files take part in refinement.
    pub fn new(significant: &ClusterSet, category_support: usize) -> Self {
        Self {
            clusters: significant.with_min_support(category_support),
        }
    }

    /// Matching clusters for `record`, least frequent first, ties by token.
    fn matching_clusters(&self, record: &FileRecord) -> Vec<(String, usize)> {
        let mut matches: Vec<(String, usize)> = clusters::path_tokens(&record.path)
            .into_iter()
            .filter_map(|token| {
                let count = self.clusters.get(&token)?.count;
                Some((token, count))
            })
            .collect();
        matches.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        matches
    }

    pub fn assign(
        &self,
        record: &FileRecord,
        shard: Option<ShardKind>,
        year: Option<ResolvedYear>,
    ) -> CategoryAssignment {
        let bucket = content_bucket(&record.mime_type);
        let is_image = bucket == "Images";
        let mut parts: Vec<String> = vec![bucket.to_string()];
        let mut tags = Vec::new();
        let mut hints = Vec::new();
        let mut year_used = year;

        if let Some(kind) = shard {
            parts.push(kind.label().to_string());
            tags.push(format!("shard:{}", kind.label()));
            if !is_image {
                year_used = None;
            }
        } else {
            let matches = self.matching_clusters(record);
            hints = matches.iter().take(3).map(|(t, _)| t.clone()).collect();
            let dated_image = is_image && year.is_some();
            if let Some((best, _)) = matches.first().filter(|_| !dated_image) {
                parts.push(title_case(best));
                tags.push(format!("cluster:{}", best));
            }
        }

        if let Some(resolved) = year_used {
            parts.push(resolved.year.to_string());
            tags.push(format!("year:{}", resolved.source.as_str()));
        }

        CategoryAssignment {
            path: record.path.clone(),
            proposed_category: parts.join("/"),
            content_type: bucket.to_string(),
            year: year_used.map(|y| y.year),
            reasoning_tags: tags,
            semantic_hints: hints,
            size: record.size,
        }
    }
}
