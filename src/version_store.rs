// src/version_store.rs

//! Persisted record of the installed version
//!
//! The installer writes the patched version and install time after a
//! successful replace, clears it on uninstall, and restores it from a
//! backup record. Writes are best-effort from the pipeline's point of view.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Installed version and when it was written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledVersion {
    pub version: String,
    pub install_time: DateTime<Utc>,
}

impl InstalledVersion {
    /// Record stamped with the current time
    pub fn now(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            install_time: Utc::now(),
        }
    }
}

/// Key-value store for the installed version
pub trait VersionStore: Send + Sync {
    fn read(&self) -> Result<Option<InstalledVersion>>;
    fn write(&self, record: &InstalledVersion) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// Version store backed by a JSON file
#[derive(Debug, Clone)]
pub struct JsonVersionStore {
    path: PathBuf,
}

impl JsonVersionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl VersionStore for JsonVersionStore {
    fn read(&self) -> Result<Option<InstalledVersion>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let record = serde_json::from_str(&content).map_err(|e| {
            Error::ParseError(format!("Invalid version file {}: {e}", self.path.display()))
        })?;
        Ok(Some(record))
    }

    fn write(&self, record: &InstalledVersion) -> Result<()> {
        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        fs::create_dir_all(parent)?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        tmp.write_all(serde_json::to_string_pretty(record)?.as_bytes())?;
        tmp.persist(&self.path).map_err(|e| Error::IoError(e.to_string()))?;
        debug!("Recorded installed version {}", record.version);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory store for embedding and tests
#[derive(Debug, Default)]
pub struct MemoryVersionStore {
    record: Mutex<Option<InstalledVersion>>,
}

impl VersionStore for MemoryVersionStore {
    fn read(&self) -> Result<Option<InstalledVersion>> {
        Ok(self.record.lock().map_err(|_| poisoned())?.clone())
    }

    fn write(&self, record: &InstalledVersion) -> Result<()> {
        *self.record.lock().map_err(|_| poisoned())? = Some(record.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.record.lock().map_err(|_| poisoned())? = None;
        Ok(())
    }
}

fn poisoned() -> Error {
    Error::InitError("version store lock poisoned".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_store_write_read_clear() {
        let tmp = tempfile::tempdir().unwrap();
        let store = JsonVersionStore::new(tmp.path().join("state/version.json"));
        assert_eq!(store.read().unwrap(), None);

        let record = InstalledVersion::now("v1.2.0");
        store.write(&record).unwrap();
        assert_eq!(store.read().unwrap(), Some(record));

        store.clear().unwrap();
        assert_eq!(store.read().unwrap(), None);
        store.clear().unwrap();
    }

    #[test]
    fn test_json_store_rejects_garbage() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("version.json");
        fs::write(&path, "not json").unwrap();
        let store = JsonVersionStore::new(&path);
        assert!(matches!(store.read(), Err(Error::ParseError(_))));
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryVersionStore::default();
        store.write(&InstalledVersion::now("v2")).unwrap();
        assert_eq!(store.read().unwrap().unwrap().version, "v2");
        store.clear().unwrap();
        assert!(store.read().unwrap().is_none());
    }
}
