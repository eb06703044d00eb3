// src/backup/mod.rs

//! Snapshot backups of the target container and overlay folder
//!
//! Each backup lives in its own `backup_<timestamp>` directory holding a
//! deflated `backup.zip` (with an embedded `file_hashes.json` manifest) and
//! a `backup_info.json` record. Only the newest `max_backups` are kept.

mod record;
mod store;

pub use record::{BackupRecord, ItemKind, RECORD_FILE, SkippedItem};
pub use store::{ARCHIVE_NAME, BackupStore, BackupTarget, MANIFEST_NAME, RestoreReport};
