// src/commands/backup.rs
//! Backup management commands

use anyhow::{Context, Result, bail};
use aura_install::backup::{BackupRecord, BackupStore, BackupTarget};
use aura_install::config::Settings;
use aura_install::pipeline::{PipelineEnv, resolve_target_dir};
use aura_install::session::{CancelToken, InstallSession, SessionKind};
use aura_install::system::{CommandOps, ProcessTerminator};
use aura_install::version_store::{JsonVersionStore, VersionStore};
use chrono::Local;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use tracing::{info, warn};

fn target_for(settings: &Settings, target_dir: Option<PathBuf>) -> Result<BackupTarget> {
    let env = PipelineEnv::new(settings.clone());
    let dir = resolve_target_dir(&env, target_dir.as_deref(), false)?;
    Ok(BackupTarget::from_settings(&dir, settings))
}

pub fn cmd_backup_create(settings: &Settings, target_dir: Option<PathBuf>) -> Result<()> {
    let target = target_for(settings, target_dir)?;
    let versions = JsonVersionStore::new(&settings.paths.state_file);
    let patched = versions.read()?.map(|v| v.version);

    let store = BackupStore::from_settings(settings);
    let record = store
        .create(&target, patched.as_deref())
        .context("Failed to create backup")?;

    println!("Created backup {}", record.backup_id);
    for skipped in &record.skipped_items {
        println!("  skipped {} {}: {}", skipped.kind, skipped.path, skipped.reason);
    }
    if !record.verified {
        println!("  warning: the archive did not pass verification");
    }
    Ok(())
}

pub fn cmd_backup_list(settings: &Settings, json: bool) -> Result<()> {
    let store = BackupStore::from_settings(settings);
    let records = store.list()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No backups in {}", store.root().display());
        return Ok(());
    }

    for record in &records {
        print_record(record);
    }
    println!("\n{} backup(s), keeping at most {}", records.len(), settings.backup.max_backups);
    Ok(())
}

fn print_record(record: &BackupRecord) {
    let status = if record.verified { "verified" } else { "UNVERIFIED" };
    println!(
        "{}  {}  target {}  patched {}  [{}]",
        record.backup_id,
        record.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"),
        record.target_version.as_deref().unwrap_or("-"),
        record.patched_version.as_deref().unwrap_or("-"),
        status
    );
}

/// Returns the exit code: 0 when the backup is intact
pub fn cmd_backup_verify(settings: &Settings, backup_id: &str) -> Result<i32> {
    let store = BackupStore::from_settings(settings);
    let record = store.get(backup_id)?;
    if store.verify(&record) {
        println!("Backup {} is intact", backup_id);
        Ok(0)
    } else {
        println!("Backup {} FAILED verification", backup_id);
        Ok(aura_install::Error::IntegrityCheckFailure(backup_id.to_string()).exit_code())
    }
}

pub fn cmd_backup_restore(
    settings: &Settings,
    backup_id: &str,
    target_dir: Option<PathBuf>,
) -> Result<()> {
    let target = target_for(settings, target_dir)?;
    let store = BackupStore::from_settings(settings);
    let record = store.get(backup_id)?;

    let _session = InstallSession::begin_locked(
        SessionKind::Restore,
        CancelToken::new(),
        Some(settings.paths.lock_file.as_path()),
    )?;

    // The running target keeps the package open
    let mut terminator = ProcessTerminator::start(
        Arc::new(CommandOps::new(settings.command_timeout())),
        &settings.target.process_name,
        settings.kill_interval(),
    )?;
    thread::sleep(settings.kill_settle());

    let versions = JsonVersionStore::new(&settings.paths.state_file);
    let result = store.restore(&record, &target, Some(&versions));
    if !terminator.stop() {
        warn!("Process terminator did not shut down cleanly");
    }
    let report = result?;

    info!("Restored backup {}", backup_id);
    println!("Restored backup {}", backup_id);
    if let Some(kept) = &report.container_kept_as {
        println!("  previous package kept as {}", kept.display());
    }
    if let Some(kept) = &report.overlay_kept_as {
        println!("  previous overlay kept as {}", kept.display());
    }
    if !report.container_restored && !report.overlay_restored {
        bail!("backup {} contained nothing to restore", backup_id);
    }
    Ok(())
}

pub fn cmd_backup_delete(settings: &Settings, backup_id: &str) -> Result<()> {
    let store = BackupStore::from_settings(settings);
    store.delete(backup_id)?;
    println!("Deleted backup {}", backup_id);
    Ok(())
}
