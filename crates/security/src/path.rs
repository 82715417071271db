//! Path confinement: file tools only touch paths inside the workspace.

use std::path::{Component, Path, PathBuf};

/// Error returned when path validation fails.
#[derive(Debug, thiserror::Error)]
pub enum PathValidationError {
    #[error("Path '{path}' is outside the workspace")]
    OutsideWorkspace { path: String },

    #[error("Path traversal detected in '{path}'")]
    PathTraversal { path: String },

    #[error("Path is empty")]
    Empty,

    #[error("Failed to canonicalize path '{path}': {reason}")]
    CanonicalizeFailed { path: String, reason: String },
}

/// Resolve `requested` against `workspace` and make sure it stays inside.
///
/// Relative paths are joined onto the workspace; absolute paths must already
/// lie within it. `..` components are rejected outright. Symlinks are
/// resolved through the nearest existing ancestor, so a link pointing out of
/// the workspace is caught too.
pub fn confine_path(workspace: &Path, requested: &str) -> Result<PathBuf, PathValidationError> {
    let trimmed = requested.trim();
    if trimmed.is_empty() {
        return Err(PathValidationError::Empty);
    }

    let input = Path::new(trimmed);
    if input.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(PathValidationError::PathTraversal {
            path: requested.into(),
        });
    }

    let root = workspace
        .canonicalize()
        .map_err(|e| PathValidationError::CanonicalizeFailed {
            path: workspace.display().to_string(),
            reason: e.to_string(),
        })?;

    let joined = if input.is_absolute() {
        input.to_path_buf()
    } else {
        root.join(input)
    };

    // Canonicalize the deepest existing ancestor, then re-append the rest.
    let mut existing = joined.as_path();
    let mut tail = Vec::new();
    while !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                tail.push(name.to_os_string());
                existing = parent;
            }
            _ => break,
        }
    }
    let mut resolved = existing
        .canonicalize()
        .map_err(|e| PathValidationError::CanonicalizeFailed {
            path: requested.into(),
            reason: e.to_string(),
        })?;
    for part in tail.into_iter().rev() {
        resolved.push(part);
    }

    if !resolved.starts_with(&root) {
        return Err(PathValidationError::OutsideWorkspace {
            path: requested.into(),
        });
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn relative_paths_resolve_inside() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.txt"), "x").unwrap();
        let root = tmp.path().canonicalize().unwrap();

        assert_eq!(confine_path(tmp.path(), "a.txt").unwrap(), root.join("a.txt"));
        assert_eq!(
            confine_path(tmp.path(), "new/dir/b.txt").unwrap(),
            root.join("new/dir/b.txt")
        );
        assert_eq!(confine_path(tmp.path(), ".").unwrap(), root);
    }

    #[test]
    fn path_traversal_blocked() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            confine_path(tmp.path(), "../../../etc/passwd"),
            Err(PathValidationError::PathTraversal { .. })
        ));
        assert!(matches!(
            confine_path(tmp.path(), "sub/../../x"),
            Err(PathValidationError::PathTraversal { .. })
        ));
    }

    #[test]
    fn absolute_outside_rejected() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            confine_path(tmp.path(), "/etc/passwd"),
            Err(PathValidationError::OutsideWorkspace { .. })
        ));

        let inside = tmp.path().canonicalize().unwrap().join("ok.txt");
        assert!(confine_path(tmp.path(), inside.to_str().unwrap()).is_ok());
    }

    #[test]
    fn empty_rejected() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(confine_path(tmp.path(), "  "), Err(PathValidationError::Empty)));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_escape_rejected() {
        let tmp = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        std::os::unix::fs::symlink(outside.path(), tmp.path().join("link")).unwrap();
        assert!(matches!(
            confine_path(tmp.path(), "link/secret.txt"),
            Err(PathValidationError::OutsideWorkspace { .. })
        ));
    }
}
