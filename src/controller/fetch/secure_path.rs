//! # Path Confinement
//!
//! Every path that comes from an archive member, a GitOpsSet spec or a symlink
//! target is joined onto its root with [`secure_join`]. Traversal above the
//! root is an error, never clamped.

use super::FetchError;
use std::path::{Component, Path, PathBuf};

/// Join `unsafe_path` onto `root` without leaving `root`
///
/// Absolute paths are interpreted relative to `root`. `..` is resolved
/// lexically and may not climb above `root`.
pub fn secure_join(root: &Path, unsafe_path: impl AsRef<Path>) -> Result<PathBuf, FetchError> {
    let unsafe_path = unsafe_path.as_ref();
    let mut joined = root.to_path_buf();
    let mut depth = 0usize;

    for component in unsafe_path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return Err(FetchError::PathEscape {
                        path: unsafe_path.display().to_string(),
                    });
                }
                joined.pop();
                depth -= 1;
            }
            Component::Normal(segment) => {
                joined.push(segment);
                depth += 1;
            }
        }
    }

    Ok(joined)
}

/// Like [`secure_join`], and when the result exists on disk its resolved
/// location (following symlinks) must still be inside `root`
pub fn resolve_within(root: &Path, unsafe_path: impl AsRef<Path>) -> Result<PathBuf, FetchError> {
    let unsafe_path = unsafe_path.as_ref();
    let joined = secure_join(root, unsafe_path)?;
    if !joined.exists() {
        return Ok(joined);
    }

    let canonical_root = root.canonicalize().map_err(|source| FetchError::Io {
        path: root.display().to_string(),
        source,
    })?;
    let canonical = joined.canonicalize().map_err(|source| FetchError::Io {
        path: joined.display().to_string(),
        source,
    })?;
    if !canonical.starts_with(&canonical_root) {
        return Err(FetchError::PathEscape {
            path: unsafe_path.display().to_string(),
        });
    }
    Ok(canonical)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_relative_path() {
        let root = Path::new("/tmp/root");
        assert_eq!(
            secure_join(root, "clusters/dev/config.yaml").unwrap(),
            root.join("clusters/dev/config.yaml")
        );
    }

    #[test]
    fn test_parent_inside_root_is_resolved() {
        let root = Path::new("/tmp/root");
        assert_eq!(secure_join(root, "a/../b").unwrap(), root.join("b"));
        assert_eq!(secure_join(root, "./a/./b").unwrap(), root.join("a/b"));
    }

    #[test]
    fn test_traversal_is_rejected() {
        let root = Path::new("/tmp/root");
        for path in ["../etc/passwd", "a/../../etc/passwd", "..", "a/b/../../../x"] {
            let err = secure_join(root, path).unwrap_err();
            assert!(
                matches!(err, FetchError::PathEscape { .. }),
                "{path} should escape"
            );
        }
    }

    #[test]
    fn test_absolute_path_stays_under_root() {
        let root = Path::new("/tmp/root");
        assert_eq!(
            secure_join(root, "/etc/passwd").unwrap(),
            root.join("etc/passwd")
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_out_of_root_is_rejected() {
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret"), "x").unwrap();
        let root = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), root.path().join("link")).unwrap();

        let err = resolve_within(root.path(), "link/secret").unwrap_err();
        assert!(matches!(err, FetchError::PathEscape { .. }));
    }

    #[test]
    fn test_missing_path_is_returned_unresolved() {
        let root = tempfile::tempdir().unwrap();
        let resolved = resolve_within(root.path(), "not/there.yaml").unwrap();
        assert_eq!(resolved, root.path().join("not/there.yaml"));
    }
}
