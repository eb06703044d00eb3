// src/backup/record.rs

//! Persisted description of one backup (`backup_info.json`)

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;

/// Record file name inside each backup directory
pub const RECORD_FILE: &str = "backup_info.json";

/// What kind of item a skipped entry refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ItemKind {
    File,
    Folder,
}

/// Item that could not be backed up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedItem {
    #[serde(rename = "type")]
    pub kind: ItemKind,
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub backup_id: String,
    /// Version of the target application at backup time
    #[serde(default)]
    pub target_version: Option<String>,
    /// Patched version that was installed at backup time
    #[serde(default)]
    pub patched_version: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub skipped_items: Vec<SkippedItem>,
    #[serde(default)]
    pub archive_file: Option<String>,
    /// SHA-256 of the archive file
    #[serde(default)]
    pub archive_checksum: Option<String>,
    #[serde(default)]
    pub verified: bool,
}

impl BackupRecord {
    pub fn is_compressed(&self) -> bool {
        self.archive_file.is_some()
    }

    /// Read the record from a backup directory
    pub fn load(backup_dir: &Path) -> Result<Self> {
        let path = backup_dir.join(RECORD_FILE);
        let content = fs::read_to_string(&path)
            .map_err(|e| Error::NotFoundError(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&content)
            .map_err(|e| Error::ParseError(format!("Invalid backup record {}: {e}", path.display())))
    }

    /// Write the record into a backup directory, replacing any previous one
    pub fn save(&self, backup_dir: &Path) -> Result<()> {
        let mut tmp = tempfile::NamedTempFile::new_in(backup_dir)?;
        tmp.write_all(serde_json::to_string_pretty(self)?.as_bytes())?;
        tmp.persist(backup_dir.join(RECORD_FILE))
            .map_err(|e| Error::IoError(e.to_string()))?;
        Ok(())
    }
}
