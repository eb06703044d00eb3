// src/compression/mod.rs
//! Zip bundle helpers
//!
//! Backups are stored as deflated zip bundles with an embedded hash
//! manifest, and the downloaded payload archive is a zip too. Entry names
//! always use `/` separators regardless of platform.

use crate::error::{Error, Result};
use crate::hash::sha256_reader;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Write};
use std::path::{Component, Path};
use tracing::{debug, warn};
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Entry name -> SHA-256 of its content
pub type HashManifest = BTreeMap<String, String>;

/// Zip entry name for a path relative to the bundle root
fn entry_name(relative: &Path) -> Result<String> {
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(
                part.to_str()
                    .ok_or_else(|| Error::InvalidPath(relative.display().to_string()))?
                    .to_string(),
            ),
            Component::CurDir => {}
            _ => return Err(Error::PathTraversal(relative.display().to_string())),
        }
    }
    if parts.is_empty() {
        return Err(Error::InvalidPath(relative.display().to_string()));
    }
    Ok(parts.join("/"))
}

/// Write `items` (relative to `root`) into a deflated zip at `dest`
///
/// Directories are added recursively. If `manifest_name` is given, a JSON
/// manifest of every packed file's SHA-256 is appended under that name.
/// Returns the manifest.
pub fn pack_zip(
    root: &Path,
    items: &[&Path],
    manifest_name: Option<&str>,
    dest: &Path,
) -> Result<HashManifest> {
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut writer = ZipWriter::new(File::create(dest)?);
    let mut manifest = HashManifest::new();

    for item in items {
        let walker = WalkDir::new(root.join(item))
            .follow_links(false)
            .sort_by_file_name();
        for entry in walker {
            let entry = entry?;
            let relative = entry
                .path()
                .strip_prefix(root)
                .map_err(|_| Error::InvalidPath(entry.path().display().to_string()))?;
            let name = entry_name(relative)?;

            if entry.file_type().is_dir() {
                writer.add_directory(name, options)?;
            } else if entry.file_type().is_file() {
                let hash = sha256_reader(&mut BufReader::new(File::open(entry.path())?))?;
                writer.start_file(name.clone(), options)?;
                io::copy(&mut File::open(entry.path())?, &mut writer)?;
                debug!("Packed {}", name);
                manifest.insert(name, hash);
            } else {
                warn!("Skipping non-regular file {}", entry.path().display());
            }
        }
    }

    if let Some(manifest_name) = manifest_name {
        writer.start_file(manifest_name, options)?;
        writer.write_all(serde_json::to_string_pretty(&manifest)?.as_bytes())?;
    }
    writer.finish()?.sync_all()?;
    Ok(manifest)
}

/// Result of reading every entry of a bundle
#[derive(Debug, Default)]
pub struct ZipTest {
    /// Names of all entries, directories included
    pub names: Vec<String>,
    /// SHA-256 of every file entry, keyed by name
    pub hashes: HashManifest,
}

/// Read every entry to the end so each one's CRC is checked
pub fn test_zip(archive: &Path) -> Result<ZipTest> {
    let mut zip = ZipArchive::new(BufReader::new(File::open(archive)?))?;
    let mut result = ZipTest::default();

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        let name = entry.name().to_string();
        if !entry.is_dir() {
            let hash = sha256_reader(&mut entry).map_err(|e| {
                Error::IntegrityCheckFailure(format!("Entry {name} is corrupt: {e}"))
            })?;
            result.hashes.insert(name.clone(), hash);
        }
        result.names.push(name);
    }
    Ok(result)
}

/// Read one entry fully into memory
pub fn read_entry(archive: &Path, name: &str) -> Result<Option<Vec<u8>>> {
    let mut zip = ZipArchive::new(BufReader::new(File::open(archive)?))?;
    let mut entry = match zip.by_name(name) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut data = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut data)?;
    Ok(Some(data))
}

/// Extract every entry under `dest`, skipping names that escape it
///
/// Returns the number of files written.
pub fn extract_zip(archive: &Path, dest: &Path) -> Result<u64> {
    let mut zip = ZipArchive::new(BufReader::new(File::open(archive)?))?;
    fs::create_dir_all(dest)?;
    let mut files = 0u64;

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        let Some(relative) = entry.enclosed_name().map(Path::to_path_buf) else {
            warn!("Skipping unsafe zip entry {}", entry.name());
            continue;
        };
        let output = dest.join(&relative);

        if entry.is_dir() {
            fs::create_dir_all(&output)?;
        } else {
            if let Some(parent) = output.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut out = File::create(&output)?;
            io::copy(&mut entry, &mut out)?;
            files += 1;
        }
    }
    debug!("Extracted {} files from {}", files, archive.display());
    Ok(files)
}
