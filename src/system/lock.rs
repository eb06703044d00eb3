// src/system/lock.rs

//! Cross-process install lock
//!
//! Held for the lifetime of an install or uninstall session so a second
//! installer process (GUI and CLI side by side) cannot touch the same
//! target concurrently. The lock file records the holder's PID.

use crate::Result;
use fs2::FileExt;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Exclusive lock on a file, released on drop
#[derive(Debug)]
pub struct InstallLock {
    file: File,
    path: PathBuf,
}

impl InstallLock {
    /// Try to acquire the lock without blocking
    ///
    /// Returns:
    /// - `Ok(Some(lock))` if the lock was acquired
    /// - `Ok(None)` if another holder has it
    /// - `Err` on I/O errors
    pub fn try_acquire<P: AsRef<Path>>(path: P) -> Result<Option<Self>> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;

        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => {
                file.set_len(0)?;
                write!(file, "{}", std::process::id())?;
                info!("Acquired install lock at {}", path.display());
                Ok(Some(Self { file, path }))
            }
            Err(e) if is_contended(&e) => {
                debug!("Install lock already held at {}", path.display());
                Ok(None)
            }
            Err(e) => Err(crate::Error::IoError(format!(
                "Failed to try-acquire install lock: {e}"
            ))),
        }
    }

    /// Check whether any process holds the lock
    pub fn is_held<P: AsRef<Path>>(path: P) -> bool {
        let Ok(file) = File::open(path.as_ref()) else {
            return false;
        };
        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => {
                let _ = FileExt::unlock(&file);
                false
            }
            Err(_) => true,
        }
    }

    /// PID recorded by the current holder
    pub fn holder_pid<P: AsRef<Path>>(path: P) -> Option<u32> {
        fs::read_to_string(path.as_ref())
            .ok()
            .and_then(|s| s.trim().parse().ok())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn is_contended(e: &std::io::Error) -> bool {
    e.kind() == std::io::ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

impl Drop for InstallLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        debug!("Released install lock at {}", self.path.display());
    }
}
