// src/archive/encode.rs

//! Build a container from a directory tree
//!
//! Every regular file is packed; offsets are assigned in traversal order
//! (sorted by name) and each file gets a SHA-256 integrity record.

use super::decode::SkippedEntry;
use super::header::{ContainerHeader, Entry, FileEntry, INTEGRITY_BLOCK_SIZE, Integrity};
use crate::error::{Error, Result};
use crate::filesystem::path::sanitize_relative;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Summary of one encode
#[derive(Debug, Clone, Default)]
pub struct EncodeReport {
    pub files: usize,
    pub payload_bytes: u64,
    /// Symlinks pointing outside the source tree
    pub skipped: Vec<SkippedEntry>,
}

/// Encode `source` into a new container at `container`
///
/// The container is written to a temporary file next to the destination and
/// renamed into place once complete.
pub fn encode(source: &Path, container: &Path) -> Result<EncodeReport> {
    if !source.is_dir() {
        return Err(Error::NotFoundError(format!(
            "Source directory {} does not exist",
            source.display()
        )));
    }

    let mut header = ContainerHeader::default();
    let mut packed: Vec<(PathBuf, u64)> = Vec::new();
    let mut report = EncodeReport::default();
    let mut offset: u64 = 0;

    for entry in WalkDir::new(source)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| Error::InvalidPath(e.to_string()))?
            .to_path_buf();
        let file_type = entry.file_type();

        if file_type.is_dir() {
            header.insert(
                &relative,
                Entry::Directory {
                    files: BTreeMap::new(),
                },
            )?;
        } else if file_type.is_symlink() {
            let target = fs::read_link(entry.path())?;
            match root_relative_link(source, &relative, &target) {
                Ok(link) => header.insert(&relative, Entry::Symlink { link })?,
                Err(e) => {
                    warn!("Skipping symlink {}: {}", relative.display(), e);
                    report.skipped.push(SkippedEntry {
                        path: relative.to_string_lossy().replace('\\', "/"),
                        reason: e.to_string(),
                    });
                }
            }
        } else {
            let metadata = entry.metadata()?;
            let size = metadata.len();
            let integrity = file_integrity(entry.path())?;
            header.insert(
                &relative,
                Entry::File(FileEntry {
                    size,
                    offset: Some(offset.to_string()),
                    unpacked: false,
                    executable: is_executable(&metadata),
                    integrity: Some(integrity),
                }),
            )?;
            packed.push((entry.path().to_path_buf(), size));
            offset += size;
        }
    }

    let parent = container
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    fs::create_dir_all(parent)?;
    let tmp = tempfile::NamedTempFile::new_in(parent)?;
    {
        let mut writer = BufWriter::new(tmp.as_file());
        let header_len = header.write_to(&mut writer)?;
        debug!("Wrote container header ({} bytes)", header_len);

        for (path, size) in &packed {
            let file = File::open(path)?;
            let copied = io::copy(&mut file.take(*size), &mut writer)?;
            if copied != *size {
                return Err(Error::IoError(format!(
                    "{} changed size while encoding",
                    path.display()
                )));
            }
        }
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(container)
        .map_err(|e| Error::IoError(format!("Failed to write {}: {}", container.display(), e)))?;

    report.files = packed.len();
    report.payload_bytes = offset;
    info!(
        "Encoded {} files ({} payload bytes) into {}",
        report.files,
        report.payload_bytes,
        container.display()
    );
    Ok(report)
}

fn file_integrity(path: &Path) -> Result<Integrity> {
    let mut file = File::open(path)?;
    let mut whole = Sha256::new();
    let mut blocks = Vec::new();
    let mut buffer = vec![0u8; INTEGRITY_BLOCK_SIZE as usize];

    loop {
        let filled = read_block(&mut file, &mut buffer)?;
        if filled == 0 {
            break;
        }
        whole.update(&buffer[..filled]);
        blocks.push(hex::encode(Sha256::digest(&buffer[..filled])));
        if filled < buffer.len() {
            break;
        }
    }

    if blocks.is_empty() {
        blocks.push(hex::encode(Sha256::digest(b"")));
    }

    Ok(Integrity {
        algorithm: "SHA256".to_string(),
        hash: hex::encode(whole.finalize()),
        block_size: INTEGRITY_BLOCK_SIZE,
        blocks,
    })
}

/// Fill `buffer` as far as the reader allows
fn read_block<R: Read>(reader: &mut R, buffer: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

/// Express a symlink target relative to the source root
fn root_relative_link(root: &Path, link_relative: &Path, target: &Path) -> Result<String> {
    let resolved = if target.is_absolute() {
        target
            .strip_prefix(root)
            .map_err(|_| {
                Error::PathTraversal(format!("{} points outside the tree", target.display()))
            })?
            .to_path_buf()
    } else {
        let mut stack: Vec<Component> = link_relative
            .parent()
            .map(|p| p.components().collect())
            .unwrap_or_default();
        for component in target.components() {
            match component {
                Component::ParentDir => {
                    if stack.pop().is_none() {
                        return Err(Error::PathTraversal(format!(
                            "{} points outside the tree",
                            target.display()
                        )));
                    }
                }
                Component::CurDir => {}
                other => stack.push(other),
            }
        }
        stack.iter().collect()
    };

    let clean = sanitize_relative(&resolved)?;
    Ok(clean
        .iter()
        .map(|s| s.to_string_lossy())
        .collect::<Vec<_>>()
        .join("/"))
}

#[cfg(unix)]
fn is_executable(metadata: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &fs::Metadata) -> bool {
    false
}
