//! Relative path handling shared by all providers.

use crate::error::{StorageError, StorageResult};

/// Splits a `/`-separated relative path into its components.
///
/// Empty components are dropped, so `"db//users/"` and `"db/users"` are the
/// same path. `.` and `..` components are rejected: providers never address
/// anything outside their root.
pub fn normalize(path: &str) -> StorageResult<Vec<&str>> {
    let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();

    if parts.iter().any(|p| *p == "." || *p == ".." || p.contains('\\')) {
        return Err(StorageError::invalid_path(path));
    }

    Ok(parts)
}

/// Joins path components with `/`.
#[must_use]
pub fn join(parts: &[&str]) -> String {
    parts.join("/")
}
