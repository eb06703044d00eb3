// tests/archive_roundtrip.rs

//! Container codec and patch behavior against real files on disk.

mod common;

use aura_install::archive::{self, Archive, ContainerHeader, Entry, FileEntry};
use aura_install::patch::{PatchRule, PatchTransform, RuleOutcome};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

fn packed(size: u64, offset: u64) -> Entry {
    Entry::File(FileEntry {
        size,
        offset: Some(offset.to_string()),
        unpacked: false,
        executable: false,
        integrity: None,
    })
}

/// Write a container from a hand-built header and raw payload bytes
fn write_raw_container(path: &Path, header: &ContainerHeader, payload: &[u8]) {
    let mut file = fs::File::create(path).unwrap();
    header.write_to(&mut file).unwrap();
    file.write_all(payload).unwrap();
}

#[test]
fn test_tree_survives_encode_decode() {
    let tmp = tempfile::tempdir().unwrap();
    let source = tmp.path().join("source");
    fs::create_dir_all(source.join("lib/nested")).unwrap();
    fs::create_dir_all(source.join("empty")).unwrap();
    fs::write(source.join("main.js"), b"console.log('hi');").unwrap();
    fs::write(source.join("lib/blob.bin"), (0u8..=255).collect::<Vec<_>>()).unwrap();
    fs::write(source.join("lib/nested/zero.txt"), b"").unwrap();

    let container = tmp.path().join("app.asar");
    let encoded = archive::encode(&source, &container).unwrap();
    assert_eq!(encoded.files, 3);

    let out = tmp.path().join("out");
    let report = archive::decode(&container, &out).unwrap();
    assert!(report.is_complete());
    assert_eq!(report.files, 3);

    for name in ["main.js", "lib/blob.bin", "lib/nested/zero.txt"] {
        assert_eq!(
            fs::read(source.join(name)).unwrap(),
            fs::read(out.join(name)).unwrap(),
            "{name} differs"
        );
    }
    assert!(out.join("empty").is_dir());
}

#[test]
fn test_bad_entry_is_skipped_not_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    let mut files = BTreeMap::new();
    files.insert("good.txt".to_string(), packed(5, 0));
    files.insert("beyond.txt".to_string(), packed(100, 5));
    let header = ContainerHeader { files };

    let container = tmp.path().join("broken.asar");
    write_raw_container(&container, &header, b"hello");

    let out = tmp.path().join("out");
    let report = archive::decode(&container, &out).unwrap();
    assert_eq!(report.files, 1);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].path, "beyond.txt");
    assert_eq!(fs::read(out.join("good.txt")).unwrap(), b"hello");
}

#[test]
fn test_unpacked_entry_read_from_side_store() {
    let tmp = tempfile::tempdir().unwrap();
    let mut files = BTreeMap::new();
    files.insert(
        "native.node".to_string(),
        Entry::File(FileEntry {
            size: 6,
            offset: None,
            unpacked: true,
            executable: false,
            integrity: None,
        }),
    );
    let header = ContainerHeader { files };

    let container = tmp.path().join("app.asar");
    write_raw_container(&container, &header, b"");
    let side_store = Archive::open(&container).unwrap().unpacked_dir();
    fs::create_dir_all(&side_store).unwrap();
    fs::write(side_store.join("native.node"), b"binary").unwrap();

    let out = tmp.path().join("out");
    let report = archive::decode(&container, &out).unwrap();
    assert!(report.is_complete());
    assert_eq!(fs::read(out.join("native.node")).unwrap(), b"binary");
}

#[test]
fn test_garbage_container_is_format_error() {
    let tmp = tempfile::tempdir().unwrap();
    let container = tmp.path().join("garbage.asar");
    fs::write(&container, b"definitely not a container").unwrap();
    let err = archive::decode(&container, &tmp.path().join("out")).unwrap_err();
    assert!(matches!(err, aura_install::Error::FormatError(_)));
}

#[test]
fn test_patch_and_reencode_is_idempotent() {
    let tmp = tempfile::tempdir().unwrap();
    let container = tmp.path().join("app.asar");
    common::build_container(&container, &[("main.js", b"start;n.m=e;end")]);

    let transform = PatchTransform::new(
        "main.js",
        vec![
            PatchRule::prepend("// loader\n"),
            PatchRule::replace_first("n.m=e", "wrap(n);n.m=e"),
        ],
    );

    let first_tree = tmp.path().join("first");
    archive::decode(&container, &first_tree).unwrap();
    let first = transform.apply(&first_tree).unwrap();
    assert_eq!(first.applied(), 2);

    let repacked = tmp.path().join("repacked.asar");
    archive::encode(&first_tree, &repacked).unwrap();

    let second_tree = tmp.path().join("second");
    archive::decode(&repacked, &second_tree).unwrap();
    let second = transform.apply(&second_tree).unwrap();
    assert_eq!(second.count(RuleOutcome::AlreadyApplied), 2);
    assert_eq!(
        fs::read_to_string(second_tree.join("main.js")).unwrap(),
        "// loader\nstart;wrap(n);n.m=e;end"
    );
}

#[cfg(unix)]
#[test]
fn test_nested_symlink_replaces_stale_file() {
    let tmp = tempfile::tempdir().unwrap();
    let source = tmp.path().join("source");
    fs::create_dir_all(source.join("a/b")).unwrap();
    fs::write(source.join("target.txt"), b"hello").unwrap();
    std::os::unix::fs::symlink("../../target.txt", source.join("a/b/link")).unwrap();

    let container = tmp.path().join("app.asar");
    let encoded = archive::encode(&source, &container).unwrap();
    assert!(encoded.skipped.is_empty());
    match Archive::open(&container).unwrap().header().get(Path::new("a/b/link")) {
        Some(Entry::Symlink { link }) => assert_eq!(link, "target.txt"),
        other => panic!("expected a symlink entry, got {other:?}"),
    }

    let out = tmp.path().join("out");
    fs::create_dir_all(out.join("a/b")).unwrap();
    fs::write(out.join("a/b/link"), b"stale").unwrap();

    let report = archive::decode(&container, &out).unwrap();
    assert!(report.is_complete());
    assert_eq!(report.symlinks, 1);

    let link = out.join("a/b/link");
    assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
    assert_eq!(fs::read_link(&link).unwrap(), Path::new("../../target.txt"));
    assert_eq!(fs::read(&link).unwrap(), b"hello");
}

#[cfg(unix)]
#[test]
fn test_escaping_symlink_is_skipped_on_encode() {
    let tmp = tempfile::tempdir().unwrap();
    let source = tmp.path().join("source");
    fs::create_dir_all(source.join("a")).unwrap();
    fs::write(source.join("main.js"), b"main").unwrap();
    fs::write(tmp.path().join("outside.txt"), b"secret").unwrap();
    std::os::unix::fs::symlink("../../outside.txt", source.join("a/escape")).unwrap();

    let container = tmp.path().join("app.asar");
    let encoded = archive::encode(&source, &container).unwrap();
    assert_eq!(encoded.skipped.len(), 1);
    assert_eq!(encoded.skipped[0].path, "a/escape");

    let out = tmp.path().join("out");
    let report = archive::decode(&container, &out).unwrap();
    assert!(report.is_complete());
    assert!(fs::symlink_metadata(out.join("a/escape")).is_err());
    assert_eq!(fs::read(out.join("main.js")).unwrap(), b"main");
}

#[test]
fn test_escaping_symlink_entry_is_skipped_on_decode() {
    let tmp = tempfile::tempdir().unwrap();
    let mut files = BTreeMap::new();
    files.insert("good.txt".to_string(), packed(5, 0));
    files.insert(
        "evil".to_string(),
        Entry::Symlink {
            link: "../outside.txt".to_string(),
        },
    );
    let header = ContainerHeader { files };

    let container = tmp.path().join("app.asar");
    write_raw_container(&container, &header, b"hello");

    let out = tmp.path().join("out");
    let report = archive::decode(&container, &out).unwrap();
    assert_eq!(report.files, 1);
    assert_eq!(report.symlinks, 0);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].path, "evil");
    assert!(fs::symlink_metadata(out.join("evil")).is_err());
}
