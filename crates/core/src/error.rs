use thiserror::Error;

/// A single manifest entry that could not become a [`crate::models::FileRecord`].
/// The entry is dropped; the rest of the manifest is still used.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("record {index}: missing required field `{field}`")]
    MissingField { index: usize, field: &'static str },
    #[error("record {index}: {message}")]
    Malformed { index: usize, message: String },
    #[error("record {index}: duplicate path {path}")]
    DuplicatePath { index: usize, path: String },
}

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("manifest is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("manifest has no `files` array")]
    MissingFiles,
}
