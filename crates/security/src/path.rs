//! Path validation: filesystem sandboxing for the file tools.
//!
//! Tool arguments name paths relative to the session's working directory.
//! They are resolved, stripped of traversal, canonicalized where possible and
//! checked against allowed roots and forbidden prefixes.

use std::path::{Component, Path, PathBuf};

/// Error returned when path validation fails.
#[derive(Debug, thiserror::Error)]
pub enum PathValidationError {
    #[error("Path '{path}' is outside allowed roots")]
    OutsideAllowedRoots { path: String },

    #[error("Path '{path}' matches forbidden pattern '{pattern}'")]
    ForbiddenPath { path: String, pattern: String },

    #[error("Path traversal detected in '{path}'")]
    PathTraversal { path: String },

    #[error("Failed to canonicalize path '{path}': {reason}")]
    CanonicalizeFailed { path: String, reason: String },
}

/// Resolve `raw` against `work_dir` and validate the result.
pub fn resolve_path(
    work_dir: &Path,
    raw: &str,
    allowed_roots: &[String],
    forbidden_paths: &[String],
) -> Result<PathBuf, PathValidationError> {
    let expanded = PathBuf::from(expand_tilde(raw));
    let joined = if expanded.is_absolute() {
        expanded
    } else {
        work_dir.join(expanded)
    };
    validate_path(&joined.to_string_lossy(), allowed_roots, forbidden_paths)
}

/// Validate that a path is safe to access.
///
/// Rejects `..` components outright, canonicalizes the path (or its parent
/// when the file does not exist yet), then applies forbidden prefixes before
/// allowed roots. Returns the resolved path.
pub fn validate_path(
    path: &str,
    allowed_roots: &[String],
    forbidden_paths: &[String],
) -> Result<PathBuf, PathValidationError> {
    let input = Path::new(path);
    if input.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(PathValidationError::PathTraversal { path: path.into() });
    }

    let canonical = canonicalize_lenient(input).map_err(|reason| PathValidationError::CanonicalizeFailed {
        path: path.into(),
        reason,
    })?;

    if let Some(pattern) = forbidden_paths
        .iter()
        .find(|f| canonical.starts_with(normalize_root(f)))
    {
        return Err(PathValidationError::ForbiddenPath {
            path: path.into(),
            pattern: pattern.clone(),
        });
    }

    if !allowed_roots.is_empty() && !allowed_roots.iter().any(|r| canonical.starts_with(normalize_root(r))) {
        return Err(PathValidationError::OutsideAllowedRoots { path: path.into() });
    }

    Ok(canonical)
}

/// Canonicalize the path, or its parent for a file that does not exist yet.
/// Paths whose parent is missing too are returned as given.
fn canonicalize_lenient(input: &Path) -> Result<PathBuf, String> {
    if input.exists() {
        return input.canonicalize().map_err(|e| e.to_string());
    }
    match (input.parent(), input.file_name()) {
        (Some(parent), Some(name)) if parent.exists() => parent
            .canonicalize()
            .map(|p| p.join(name))
            .map_err(|e| format!("parent dir: {e}")),
        _ => Ok(input.to_path_buf()),
    }
}

/// Roots may name directories that are symlinks (e.g. `/tmp` on macOS).
fn normalize_root(root: &str) -> PathBuf {
    let expanded = PathBuf::from(expand_tilde(root));
    expanded.canonicalize().unwrap_or(expanded)
}

/// Expand ~ to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if (path.starts_with("~/") || path == "~")
        && let Some(home) = home_dir()
    {
        return path.replacen('~', &home, 1);
    }
    path.to_string()
}

fn home_dir() -> Option<String> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE").ok()
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME").ok()
    }
}
