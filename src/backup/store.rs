// src/backup/store.rs

//! Backup creation, verification, restore and retention

use super::record::{BackupRecord, ItemKind, RECORD_FILE, SkippedItem};
use crate::compression::{self, HashManifest};
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::filesystem::{copy_dir_all, remove_path, sanitize_segment};
use crate::hash::sha256_file;
use crate::system::detect_target_version;
use crate::version_store::{InstalledVersion, VersionStore};
use chrono::{Local, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Bundle file name inside a backup directory
pub const ARCHIVE_NAME: &str = "backup.zip";

/// Hash manifest entry inside the bundle
pub const MANIFEST_NAME: &str = "file_hashes.json";

/// Prefix of every backup directory name
const BACKUP_PREFIX: &str = "backup_";

/// What to back up and restore
#[derive(Debug, Clone)]
pub struct BackupTarget {
    pub resources_dir: PathBuf,
    pub container_name: String,
    pub overlay_folder: String,
    pub target_version: Option<String>,
}

impl BackupTarget {
    pub fn new(
        resources_dir: impl Into<PathBuf>,
        container_name: impl Into<String>,
        overlay_folder: impl Into<String>,
    ) -> Self {
        Self {
            resources_dir: resources_dir.into(),
            container_name: container_name.into(),
            overlay_folder: overlay_folder.into(),
            target_version: None,
        }
    }

    /// Target described by the settings, version detected from the path
    pub fn from_settings(resources_dir: &Path, settings: &Settings) -> Self {
        let mut target = Self::new(
            resources_dir,
            &settings.target.container_name,
            &settings.target.overlay_folder,
        );
        target.target_version = detect_target_version(resources_dir, &settings.target.version_prefix);
        target
    }

    pub fn container_path(&self) -> PathBuf {
        self.resources_dir.join(&self.container_name)
    }

    pub fn overlay_path(&self) -> PathBuf {
        self.resources_dir.join(&self.overlay_folder)
    }
}

/// What a restore put back
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub container_restored: bool,
    pub overlay_restored: bool,
    /// Previous container kept aside, if one existed
    pub container_kept_as: Option<PathBuf>,
    pub overlay_kept_as: Option<PathBuf>,
}

/// Directory of backups with retention
#[derive(Debug, Clone)]
pub struct BackupStore {
    root: PathBuf,
    max_backups: usize,
}

impl BackupStore {
    pub fn new(root: impl Into<PathBuf>, max_backups: usize) -> Self {
        Self {
            root: root.into(),
            max_backups: max_backups.max(1),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(&settings.paths.backup_dir, settings.backup.max_backups)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn backup_dir(&self, backup_id: &str) -> Result<PathBuf> {
        let id = sanitize_segment(backup_id)?;
        if !id.starts_with(BACKUP_PREFIX) {
            return Err(Error::InvalidArguments(format!(
                "Not a backup identifier: {backup_id}"
            )));
        }
        Ok(self.root.join(id))
    }

    /// Snapshot the container and overlay folder of `target`
    pub fn create(&self, target: &BackupTarget, patched_version: Option<&str>) -> Result<BackupRecord> {
        if !target.resources_dir.is_dir() {
            return Err(Error::TargetNotFound(target.resources_dir.display().to_string()));
        }
        fs::create_dir_all(&self.root)?;
        let (backup_id, backup_dir) = self.allocate_dir()?;
        info!("Creating backup {} in {}", backup_id, backup_dir.display());

        let result = self.fill(&backup_id, &backup_dir, target, patched_version);
        if result.is_err() {
            let _ = fs::remove_dir_all(&backup_dir);
        }
        let record = result?;

        if let Err(e) = self.rotate() {
            warn!("Backup rotation failed: {}", e);
        }
        if !record.skipped_items.is_empty() {
            warn!(
                "Backup {} skipped {} item(s)",
                record.backup_id,
                record.skipped_items.len()
            );
        }
        info!("Backup {} created", record.backup_id);
        Ok(record)
    }

    fn allocate_dir(&self) -> Result<(String, PathBuf)> {
        let base = Local::now().format("backup_%Y%m%d_%H%M%S_%3f").to_string();
        let mut id = base.clone();
        let mut suffix = 1;
        loop {
            let dir = self.root.join(&id);
            match fs::create_dir(&dir) {
                Ok(()) => return Ok((id, dir)),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    id = format!("{base}_{suffix}");
                    suffix += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn fill(
        &self,
        backup_id: &str,
        backup_dir: &Path,
        target: &BackupTarget,
        patched_version: Option<&str>,
    ) -> Result<BackupRecord> {
        let mut skipped = Vec::new();
        let mut copied: Vec<&Path> = Vec::new();

        let container = target.container_path();
        if !container.is_file() {
            skipped.push(SkippedItem {
                kind: ItemKind::File,
                path: container.display().to_string(),
                reason: "file does not exist".to_string(),
            });
        } else {
            match fs::copy(&container, backup_dir.join(&target.container_name)) {
                Ok(_) => copied.push(Path::new(&target.container_name)),
                Err(e) => {
                    warn!("Skipping {}: {}", container.display(), e);
                    skipped.push(SkippedItem {
                        kind: ItemKind::File,
                        path: container.display().to_string(),
                        reason: format!("copy failed: {e}"),
                    });
                }
            }
        }

        let overlay = target.overlay_path();
        if !overlay.is_dir() {
            skipped.push(SkippedItem {
                kind: ItemKind::Folder,
                path: overlay.display().to_string(),
                reason: "folder does not exist".to_string(),
            });
        } else {
            match copy_dir_all(&overlay, &backup_dir.join(&target.overlay_folder)) {
                Ok(files) => {
                    debug!("Copied {} overlay files", files);
                    copied.push(Path::new(&target.overlay_folder));
                }
                Err(e) => {
                    warn!("Skipping {}: {}", overlay.display(), e);
                    skipped.push(SkippedItem {
                        kind: ItemKind::Folder,
                        path: overlay.display().to_string(),
                        reason: format!("copy failed: {e}"),
                    });
                }
            }
        }

        if copied.is_empty() {
            error!("Nothing to back up in {}", target.resources_dir.display());
            return Err(Error::NotFoundError(format!(
                "Neither {} nor {} exists in {}",
                target.container_name,
                target.overlay_folder,
                target.resources_dir.display()
            )));
        }

        let archive = backup_dir.join(ARCHIVE_NAME);
        let manifest = compression::pack_zip(backup_dir, &copied, Some(MANIFEST_NAME), &archive)?;
        debug!("Packed {} files into {}", manifest.len(), archive.display());
        for item in &copied {
            remove_path(&backup_dir.join(item))?;
        }

        let mut record = BackupRecord {
            backup_id: backup_id.to_string(),
            target_version: target.target_version.clone(),
            patched_version: patched_version.map(str::to_string),
            created_at: Utc::now(),
            skipped_items: skipped,
            archive_file: Some(ARCHIVE_NAME.to_string()),
            archive_checksum: Some(sha256_file(&archive)?),
            verified: false,
        };
        record.verified = self.verify(&record);
        if !record.verified {
            warn!("Backup {} failed verification right after creation", backup_id);
        }
        record.save(backup_dir)?;
        Ok(record)
    }

    /// Check that the bundle of `record` is readable and complete
    pub fn verify(&self, record: &BackupRecord) -> bool {
        match self.check_bundle(record) {
            Ok(()) => {
                debug!("Backup {} verified", record.backup_id);
                true
            }
            Err(e) => {
                warn!("Backup {} failed verification: {}", record.backup_id, e);
                false
            }
        }
    }

    fn check_bundle(&self, record: &BackupRecord) -> Result<()> {
        let archive_name = record.archive_file.as_deref().ok_or_else(|| {
            Error::IntegrityCheckFailure("backup has no archive".to_string())
        })?;
        let archive = self
            .backup_dir(&record.backup_id)?
            .join(sanitize_segment(archive_name)?);
        if !archive.is_file() {
            return Err(Error::IntegrityCheckFailure(format!(
                "archive {} is missing",
                archive.display()
            )));
        }
        if let Some(expected) = &record.archive_checksum
            && !sha256_file(&archive)?.eq_ignore_ascii_case(expected)
        {
            return Err(Error::IntegrityCheckFailure(format!(
                "archive {} does not match its recorded checksum",
                archive.display()
            )));
        }

        let tested = compression::test_zip(&archive)?;
        if tested.names.is_empty() {
            return Err(Error::IntegrityCheckFailure("archive is empty".to_string()));
        }

        match compression::read_entry(&archive, MANIFEST_NAME)? {
            Some(raw) => {
                let manifest: HashManifest = serde_json::from_slice(&raw)?;
                for (name, expected) in &manifest {
                    let Some(actual) = tested.hashes.get(name) else {
                        return Err(Error::IntegrityCheckFailure(format!(
                            "{name} listed in manifest but missing from archive"
                        )));
                    };
                    if !actual.eq_ignore_ascii_case(expected) {
                        return Err(Error::IntegrityCheckFailure(format!(
                            "{name} does not match its manifest hash"
                        )));
                    }
                }
            }
            None => warn!("Backup {} has no hash manifest", record.backup_id),
        }
        Ok(())
    }

    /// Put the backed-up items back into `target`
    ///
    /// The current container and overlay folder are kept as `.bak`
    /// siblings (`app.bak`, `aura.bak`).
    pub fn restore(
        &self,
        record: &BackupRecord,
        target: &BackupTarget,
        versions: Option<&dyn VersionStore>,
    ) -> Result<RestoreReport> {
        if !self.verify(record) {
            return Err(Error::IntegrityCheckFailure(format!(
                "backup {} cannot be restored",
                record.backup_id
            )));
        }
        if !target.resources_dir.is_dir() {
            return Err(Error::TargetNotFound(target.resources_dir.display().to_string()));
        }
        info!("Restoring backup {}", record.backup_id);

        let backup_dir = self.backup_dir(&record.backup_id)?;
        let archive_name = record.archive_file.as_deref().unwrap_or(ARCHIVE_NAME);
        let staging = tempfile::tempdir_in(&backup_dir)?;
        compression::extract_zip(&backup_dir.join(archive_name), staging.path())?;

        let mut report = RestoreReport::default();

        let restored_container = staging.path().join(&target.container_name);
        let container = target.container_path();
        if restored_container.is_file() {
            if container.exists() {
                let kept = container.with_extension("bak");
                fs::copy(&container, &kept)?;
                info!("Kept current container as {}", kept.display());
                report.container_kept_as = Some(kept);
            }
            fs::copy(&restored_container, &container)?;
            report.container_restored = true;
        } else {
            warn!("Backup {} holds no container", record.backup_id);
        }

        let restored_overlay = staging.path().join(&target.overlay_folder);
        let overlay = target.overlay_path();
        if restored_overlay.is_dir() {
            if overlay.exists() {
                let kept = overlay.with_extension("bak");
                remove_path(&kept)?;
                fs::rename(&overlay, &kept)?;
                info!("Kept current overlay folder as {}", kept.display());
                report.overlay_kept_as = Some(kept);
            }
            copy_dir_all(&restored_overlay, &overlay)?;
            report.overlay_restored = true;
        } else {
            warn!("Backup {} holds no overlay folder", record.backup_id);
        }

        if let (Some(store), Some(version)) = (versions, record.patched_version.as_deref()) {
            match store.write(&InstalledVersion::now(version)) {
                Ok(()) => info!("Installed version set to {}", version),
                Err(e) => warn!("Failed to update installed version: {}", e),
            }
        }

        info!("Backup {} restored", record.backup_id);
        Ok(report)
    }

    /// All readable backups, newest first
    ///
    /// Compressed backups not yet marked verified are verified again and
    /// their record rewritten.
    pub fn list(&self) -> Result<Vec<BackupRecord>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !name.starts_with(BACKUP_PREFIX) || !entry.file_type()?.is_dir() {
                continue;
            }

            let mut record = match BackupRecord::load(&entry.path()) {
                Ok(record) => record,
                Err(e) => {
                    warn!("Ignoring {}: {}", name, e);
                    continue;
                }
            };
            if record.backup_id != name {
                debug!("Record id {} differs from directory {}", record.backup_id, name);
                record.backup_id = name.to_string();
            }
            if record.is_compressed() && !record.verified && self.verify(&record) {
                record.verified = true;
                if let Err(e) = record.save(&entry.path()) {
                    warn!("Failed to update {} for {}: {}", RECORD_FILE, name, e);
                }
            }
            records.push(record);
        }

        records.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.backup_id.cmp(&a.backup_id))
        });
        Ok(records)
    }

    /// Load one backup record by id
    pub fn get(&self, backup_id: &str) -> Result<BackupRecord> {
        let dir = self.backup_dir(backup_id)?;
        if !dir.is_dir() {
            return Err(Error::NotFoundError(format!("Backup {backup_id} does not exist")));
        }
        let mut record = BackupRecord::load(&dir)?;
        record.backup_id = backup_id.to_string();
        Ok(record)
    }

    /// Delete a backup directory entirely
    pub fn delete(&self, backup_id: &str) -> Result<()> {
        let dir = self.backup_dir(backup_id)?;
        if !dir.is_dir() {
            return Err(Error::NotFoundError(format!("Backup {backup_id} does not exist")));
        }
        fs::remove_dir_all(&dir)?;
        info!("Deleted backup {}", backup_id);
        Ok(())
    }

    /// Delete backups beyond `max_backups`, oldest first; returns the deleted ids
    pub fn rotate(&self) -> Result<Vec<String>> {
        let records = self.list()?;
        let mut removed = Vec::new();
        for record in records.iter().skip(self.max_backups) {
            info!("Removing old backup {}", record.backup_id);
            self.delete(&record.backup_id)?;
            removed.push(record.backup_id.clone());
        }
        Ok(removed)
    }
}
