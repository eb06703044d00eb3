// tests/backup_store.rs

//! Backup snapshots, verification, restore and retention.

mod common;

use aura_install::backup::{ARCHIVE_NAME, BackupStore, BackupTarget};
use aura_install::version_store::{JsonVersionStore, VersionStore};
use std::fs::{self, OpenOptions};
use std::path::Path;

fn target(root: &Path) -> BackupTarget {
    let resources = common::target_install(root);
    fs::create_dir_all(resources.join("aura/plugins")).unwrap();
    fs::write(resources.join("aura/index.js"), b"v1 overlay").unwrap();
    fs::write(resources.join("aura/plugins/p.js"), b"plugin").unwrap();
    BackupTarget::new(&resources, "app.asar", "aura")
}

#[test]
fn test_restore_is_byte_exact() {
    let tmp = tempfile::tempdir().unwrap();
    let target = target(tmp.path());
    let store = BackupStore::new(tmp.path().join("backups"), 5);

    let record = store.create(&target, Some("v1.0.0")).unwrap();
    assert!(record.verified);
    assert!(record.skipped_items.is_empty());

    fs::write(target.container_path(), b"newer container").unwrap();
    fs::write(target.overlay_path().join("index.js"), b"v2 overlay").unwrap();
    fs::remove_file(target.overlay_path().join("plugins/p.js")).unwrap();

    let versions = JsonVersionStore::new(tmp.path().join("state/version.json"));
    let report = store.restore(&record, &target, Some(&versions)).unwrap();
    assert!(report.container_restored && report.overlay_restored);

    assert_eq!(fs::read(target.container_path()).unwrap(), b"stock container");
    assert_eq!(fs::read(target.overlay_path().join("index.js")).unwrap(), b"v1 overlay");
    assert_eq!(fs::read(target.overlay_path().join("plugins/p.js")).unwrap(), b"plugin");

    let resources = &target.resources_dir;
    assert_eq!(fs::read(resources.join("app.bak")).unwrap(), b"newer container");
    assert_eq!(fs::read(resources.join("aura.bak/index.js")).unwrap(), b"v2 overlay");
    assert_eq!(versions.read().unwrap().unwrap().version, "v1.0.0");
}

#[test]
fn test_truncated_archive_fails_verification() {
    let tmp = tempfile::tempdir().unwrap();
    let target = target(tmp.path());
    let store = BackupStore::new(tmp.path().join("backups"), 5);
    let record = store.create(&target, None).unwrap();

    let archive = store.backup_dir(&record.backup_id).unwrap().join(ARCHIVE_NAME);
    let len = fs::metadata(&archive).unwrap().len();
    OpenOptions::new()
        .write(true)
        .open(&archive)
        .unwrap()
        .set_len(len / 2)
        .unwrap();

    assert!(!store.verify(&record));
    let err = store.restore(&record, &target, None).unwrap_err();
    assert!(matches!(err, aura_install::Error::IntegrityCheckFailure(_)));
    assert_eq!(fs::read(target.container_path()).unwrap(), b"stock container");
}

#[test]
fn test_retention_keeps_newest() {
    let tmp = tempfile::tempdir().unwrap();
    let target = target(tmp.path());
    let store = BackupStore::new(tmp.path().join("backups"), 5);

    let ids: Vec<String> = (0..6)
        .map(|i| {
            store
                .create(&target, Some(&format!("v1.0.{i}")))
                .unwrap()
                .backup_id
        })
        .collect();

    let remaining = store.list().unwrap();
    assert_eq!(remaining.len(), 5);
    assert!(remaining.iter().all(|r| r.backup_id != ids[0]));
    assert_eq!(remaining[0].backup_id, ids[5]);
    assert_eq!(remaining[0].patched_version.as_deref(), Some("v1.0.5"));
}

#[test]
fn test_delete_unknown_backup() {
    let tmp = tempfile::tempdir().unwrap();
    let store = BackupStore::new(tmp.path().join("backups"), 5);
    assert!(store.delete("backup_19700101_000000_000").is_err());
    assert!(store.list().unwrap().is_empty());
}

#[test]
fn test_swapped_archive_fails_checksum() {
    let tmp = tempfile::tempdir().unwrap();
    let target = target(tmp.path());
    let store = BackupStore::new(tmp.path().join("backups"), 5);
    let first = store.create(&target, Some("v1.0.0")).unwrap();

    fs::write(target.container_path(), b"another container").unwrap();
    let second = store.create(&target, Some("v1.0.1")).unwrap();
    assert!(store.verify(&second));

    let archive_of = |id: &str| store.backup_dir(id).unwrap().join(ARCHIVE_NAME);
    fs::copy(archive_of(&second.backup_id), archive_of(&first.backup_id)).unwrap();

    assert!(!store.verify(&first));
    let err = store.restore(&first, &target, None).unwrap_err();
    assert!(matches!(err, aura_install::Error::IntegrityCheckFailure(_)));
    assert_eq!(fs::read(target.container_path()).unwrap(), b"another container");
}
