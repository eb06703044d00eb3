// src/filesystem/path.rs

//! Path checks for names read out of container headers
//!
//! Entry names come from a file we did not write. A name containing a
//! separator or `..` could place a file outside the extraction root, so every
//! header segment goes through [`sanitize_segment`] and every joined path
//! through [`safe_join`].

use crate::error::{Error, Result};
use std::path::{Component, Path, PathBuf};

/// Validate a single header key (one path segment)
///
/// ```
/// use aura_install::filesystem::path::sanitize_segment;
///
/// assert_eq!(sanitize_segment("main.js").unwrap(), "main.js");
/// assert!(sanitize_segment("..").is_err());
/// assert!(sanitize_segment("a/b").is_err());
/// ```
pub fn sanitize_segment(name: &str) -> Result<&str> {
    if name.is_empty() {
        return Err(Error::InvalidPath("Empty entry name".to_string()));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(Error::PathTraversal(format!(
            "Entry name contains path separator: {name}"
        )));
    }
    if name == "." || name == ".." || name.contains(':') {
        return Err(Error::PathTraversal(format!("Invalid entry name: {name}")));
    }
    Ok(name)
}

/// Normalize a relative path, rejecting anything that climbs out of it
pub fn sanitize_relative(path: &Path) -> Result<PathBuf> {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(c) => normalized.push(c),
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(Error::PathTraversal(path.display().to_string()));
            }
            Component::Prefix(_) | Component::RootDir => {
                return Err(Error::PathTraversal(format!(
                    "Absolute path not allowed: {}",
                    path.display()
                )));
            }
        }
    }
    if normalized.as_os_str().is_empty() {
        return Err(Error::InvalidPath("Empty path after sanitization".to_string()));
    }
    Ok(normalized)
}

/// Join `relative` under `root`, refusing paths that escape it
pub fn safe_join(root: &Path, relative: &Path) -> Result<PathBuf> {
    let joined = root.join(sanitize_relative(relative)?);

    if let (Ok(canonical_root), Ok(canonical_joined)) = (root.canonicalize(), joined.canonicalize())
        && !canonical_joined.starts_with(&canonical_root)
    {
        return Err(Error::PathTraversal(format!(
            "Path {} escapes root {}",
            joined.display(),
            root.display()
        )));
    }

    Ok(joined)
}

/// Resolve a symlink target recorded relative to the container root
///
/// Returns the target relative to the link's own parent directory, which is
/// how the link is recreated on disk.
pub fn relink_target(link_relative: &Path, target_relative: &Path) -> Result<PathBuf> {
    let target = sanitize_relative(target_relative)?;
    let depth = link_relative
        .parent()
        .map(|p| p.components().count())
        .unwrap_or(0);
    let mut relative = PathBuf::new();
    for _ in 0..depth {
        relative.push("..");
    }
    relative.push(target);
    Ok(relative)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_segment_rejects_separators() {
        assert!(sanitize_segment("node_modules").is_ok());
        assert!(matches!(
            sanitize_segment("..\\evil"),
            Err(Error::PathTraversal(_))
        ));
        assert!(matches!(sanitize_segment(""), Err(Error::InvalidPath(_))));
        assert!(sanitize_segment("C:").is_err());
    }

    #[test]
    fn test_sanitize_relative() {
        assert_eq!(
            sanitize_relative(Path::new("./lib/./a.js")).unwrap(),
            PathBuf::from("lib/a.js")
        );
        assert!(sanitize_relative(Path::new("lib/../../x")).is_err());
        assert!(sanitize_relative(Path::new("/etc/passwd")).is_err());
        assert!(sanitize_relative(Path::new(".")).is_err());
    }

    #[test]
    fn test_safe_join() {
        let tmp = tempfile::tempdir().unwrap();
        let joined = safe_join(tmp.path(), Path::new("a/b.txt")).unwrap();
        assert_eq!(joined, tmp.path().join("a").join("b.txt"));
        assert!(safe_join(tmp.path(), Path::new("../b.txt")).is_err());
    }

    #[test]
    fn test_relink_target() {
        assert_eq!(
            relink_target(Path::new("bin/tool"), Path::new("lib/tool.js")).unwrap(),
            PathBuf::from("../lib/tool.js")
        );
        assert_eq!(
            relink_target(Path::new("top"), Path::new("lib/x")).unwrap(),
            PathBuf::from("lib/x")
        );
        assert!(relink_target(Path::new("a"), Path::new("../../etc")).is_err());
    }
}
