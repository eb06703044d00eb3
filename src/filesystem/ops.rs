// src/filesystem/ops.rs

//! File moves, tree copies and the bounded locked-file delete

use crate::error::{Error, Result};
use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Move a file, falling back to copy + fsync + delete across volumes
pub fn move_file_atomic(src: &Path, dst: &Path) -> io::Result<()> {
    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            debug!(
                "Cross-volume move detected ({} -> {}), using copy fallback",
                src.display(),
                dst.display()
            );

            fs::copy(src, dst)?;
            let file = File::open(dst)?;
            file.sync_all()?;
            drop(file);

            fs::remove_file(src)?;
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Move a directory tree, falling back to copy + remove across volumes
pub fn move_dir(src: &Path, dst: &Path) -> Result<()> {
    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            debug!(
                "Cross-volume directory move ({} -> {}), copying",
                src.display(),
                dst.display()
            );
            copy_dir_all(src, dst)?;
            fs::remove_dir_all(src)?;
            Ok(())
        }
        Err(e) => Err(Error::IoError(format!(
            "Failed to move {} to {}: {e}",
            src.display(),
            dst.display()
        ))),
    }
}

/// Recursively copy `src` into `dst`, overwriting existing files
///
/// Returns the number of files copied.
pub fn copy_dir_all(src: &Path, dst: &Path) -> Result<u64> {
    let mut copied = 0;
    fs::create_dir_all(dst)?;

    for entry in WalkDir::new(src).min_depth(1).follow_links(false) {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| Error::InvalidPath(e.to_string()))?;
        let target = dst.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_symlink() {
            let link = fs::read_link(entry.path())?;
            remove_path(&target)?;
            create_symlink(&link, &target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            if target.is_dir() {
                fs::remove_dir_all(&target)?;
            }
            fs::copy(entry.path(), &target).map_err(|e| {
                Error::IoError(format!(
                    "Failed to copy {} to {}: {e}",
                    entry.path().display(),
                    target.display()
                ))
            })?;
            copied += 1;
        }
    }

    Ok(copied)
}

/// Remove whatever exists at `path` (file, symlink or directory)
pub fn remove_path(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(unix)]
pub fn create_symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
pub fn create_symlink(target: &Path, link: &Path) -> io::Result<()> {
    let resolved = link.parent().map(|p| p.join(target));
    match resolved {
        Some(p) if p.is_dir() => std::os::windows::fs::symlink_dir(target, link),
        _ => std::os::windows::fs::symlink_file(target, link),
    }
}

/// Delete a file that may be held open by another process
///
/// Retries up to `attempts` times with `delay` between tries and returns
/// [`Error::FileLocked`] once exhausted. A missing file counts as deleted.
pub fn remove_file_with_retry(path: &Path, attempts: u32, delay: Duration) -> Result<()> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match fs::remove_file(path) {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                if attempt >= attempts {
                    warn!(
                        "Giving up deleting {} after {} attempts: {}",
                        path.display(),
                        attempt,
                        e
                    );
                    return Err(Error::FileLocked {
                        path: path.to_path_buf(),
                        attempts: attempt,
                    });
                }
                warn!(
                    "Delete attempt {} for {} failed: {}, retrying...",
                    attempt,
                    path.display(),
                    e
                );
                thread::sleep(delay);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_dir_all_overwrites() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        fs::create_dir_all(src.path().join("nested")).unwrap();
        fs::write(src.path().join("a.txt"), b"new").unwrap();
        fs::write(src.path().join("nested/b.txt"), b"b").unwrap();
        fs::write(dst.path().join("a.txt"), b"old").unwrap();
        fs::write(dst.path().join("keep.txt"), b"keep").unwrap();

        let copied = copy_dir_all(src.path(), dst.path()).unwrap();
        assert_eq!(copied, 2);
        assert_eq!(fs::read(dst.path().join("a.txt")).unwrap(), b"new");
        assert_eq!(fs::read(dst.path().join("nested/b.txt")).unwrap(), b"b");
        assert_eq!(fs::read(dst.path().join("keep.txt")).unwrap(), b"keep");
    }

    #[test]
    fn test_move_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src");
        fs::create_dir_all(src.join("x")).unwrap();
        fs::write(src.join("x/f"), b"f").unwrap();
        let dst = tmp.path().join("dst");
        move_dir(&src, &dst).unwrap();
        assert!(!src.exists());
        assert_eq!(fs::read(dst.join("x/f")).unwrap(), b"f");
    }

    #[test]
    fn test_remove_missing_file_is_ok() {
        let tmp = tempfile::tempdir().unwrap();
        remove_file_with_retry(&tmp.path().join("nope"), 3, Duration::from_millis(1)).unwrap();
    }

    #[test]
    fn test_remove_file_with_retry_exhausts() {
        // A directory cannot be removed with remove_file, which stands in for a lock
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("held");
        fs::create_dir(&dir).unwrap();
        let err = remove_file_with_retry(&dir, 3, Duration::from_millis(1)).unwrap_err();
        match err {
            Error::FileLocked { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_remove_path_handles_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("d");
        fs::create_dir_all(dir.join("e")).unwrap();
        remove_path(&dir).unwrap();
        assert!(!dir.exists());
        remove_path(&dir).unwrap();
    }
}
