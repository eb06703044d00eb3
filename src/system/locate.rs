// src/system/locate.rs

//! Target installation discovery

use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// Find the target resources directory from a glob pattern
///
/// Several versions may be installed side by side; the last match in sorted
/// order wins.
pub fn locate_target(pattern: &str) -> Option<PathBuf> {
    let paths = match glob::glob(pattern) {
        Ok(paths) => paths,
        Err(e) => {
            warn!("Invalid target pattern {}: {}", pattern, e);
            return None;
        }
    };

    let found = paths.filter_map(|p| p.ok()).filter(|p| p.is_dir()).last();
    match &found {
        Some(dir) => debug!("Located target directory {}", dir.display()),
        None => debug!("No directory matches {}", pattern),
    }
    found
}

/// Extract the application version from a path component such as `SeewoService_1.5.2.3690`
pub fn detect_target_version(path: &Path, prefix: &str) -> Option<String> {
    path.components().find_map(|component| match component {
        Component::Normal(segment) => segment
            .to_str()
            .and_then(|s| s.strip_prefix(prefix))
            .filter(|v| !v.is_empty())
            .map(str::to_string),
        _ => None,
    })
}
