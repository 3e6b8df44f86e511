use std::path::Path;

/// Deny prefixes always win. With a non-empty allow list, the path must sit
/// under one of its prefixes.
pub fn is_allowed(path: &Path, allow: &[String], deny: &[String]) -> bool {
    if deny.iter().any(|prefix| path.starts_with(prefix)) {
        return false;
    }
    allow.is_empty() || allow.iter().any(|prefix| path.starts_with(prefix))
}
