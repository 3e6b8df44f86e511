//! Collapses storage-internal sharded directories into one logical bucket.

use crate::patterns;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ShardKind {
    /// Photo library bundle originals/resources stored under hex shard folders.
    ApplePhotosLibrary,
    /// Derivative bundle a sync tool generates next to the synced tree.
    SyncDerivatives,
    /// `ab/abcdef0123...` blob stores.
    ContentAddressed,
}

impl ShardKind {
    pub fn label(&self) -> &'static str {
        match self {
            ShardKind::ApplePhotosLibrary => "Apple Photos Library",
            ShardKind::SyncDerivatives => "Sync Derivatives",
            ShardKind::ContentAddressed => "Content-Addressed Store",
        }
    }
}

/// The shard layout `path` lives in, if any.
pub fn detect_shard(path: &str) -> Option<ShardKind> {
    patterns::match_shard(path)
}
