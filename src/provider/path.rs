//! Logical path handling shared by every provider.
//!
//! Callers address files with relative, slash-separated paths. Providers
//! never trust them: every path is normalized here before it is joined
//! with a base directory or used as an object key, which is what keeps a
//! caller from escaping the storage root.

use std::path::{Path, PathBuf};

use crate::provider::error::{ProviderError, ProviderResult};

/// Name prefix of in-flight temporary files. No logical path segment may
/// start with it, so listings can hide temporaries without hiding data.
pub(crate) const TEMP_PREFIX: &str = ".filestore-";

/// Normalize a logical path. The empty path (the root) is allowed.
///
/// Trailing and repeated slashes and `.` segments are dropped. Absolute paths,
/// `..` segments, backslashes, NUL bytes and segments starting with the
/// temporary-file prefix are rejected.
pub fn normalize(path: &str) -> ProviderResult<String> {
    if path.contains('\0') {
        return Err(ProviderError::invalid_path(path, "contains a NUL byte"));
    }
    if path.contains('\\') {
        return Err(ProviderError::invalid_path(path, "backslashes are not allowed"));
    }
    if path.starts_with('/') || Path::new(path).is_absolute() {
        return Err(ProviderError::invalid_path(path, "absolute paths are not allowed"));
    }

    let mut segments = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                return Err(ProviderError::invalid_path(path, "escapes the storage root"));
            }
            s if s.starts_with(TEMP_PREFIX) => {
                return Err(ProviderError::invalid_path(path, "name is reserved for temporary files"));
            }
            s => segments.push(s),
        }
    }

    Ok(segments.join("/"))
}

/// Normalize a path that must name a file (non-empty).
pub fn normalize_file(path: &str) -> ProviderResult<String> {
    let normalized = normalize(path)?;
    if normalized.is_empty() {
        return Err(ProviderError::invalid_path(path, "path is empty"));
    }
    Ok(normalized)
}

/// Join two normalized logical paths.
pub fn join(prefix: &str, path: &str) -> String {
    match (prefix.is_empty(), path.is_empty()) {
        (true, _) => path.to_string(),
        (_, true) => prefix.to_string(),
        _ => format!("{}/{}", prefix, path),
    }
}

/// Check whether `path` lies at or under `prefix`, on segment boundaries.
///
/// `b` matches `b` and `b/c.txt` but not `bx.txt`.
pub fn is_under(path: &str, prefix: &str) -> bool {
    if prefix.is_empty() {
        return true;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Build the filesystem path for a normalized logical path.
pub fn resolve(root: &Path, normalized: &str) -> PathBuf {
    let mut full = root.to_path_buf();
    for segment in normalized.split('/').filter(|s| !s.is_empty()) {
        full.push(segment);
    }
    full
}

/// Convert a filesystem path under `root` back to a logical path.
pub fn to_logical(root: &Path, full: &Path) -> Option<String> {
    let relative = full.strip_prefix(root).ok()?;
    let segments: Option<Vec<&str>> = relative
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect();
    Some(segments?.join("/"))
}
