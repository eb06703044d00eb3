// src/archive/decode.rs

//! Extract a container into a directory tree
//!
//! Header parse failures abort the decode. Anything wrong with a single entry
//! (bad offset, missing side-store file, unsafe name, symlink refused by the
//! OS) is logged, recorded in [`ExtractReport::skipped`] and skipped.

use super::header::{ContainerHeader, Entry, FileEntry};
use crate::error::{Error, Result};
use crate::filesystem::ops::{create_symlink, remove_path};
use crate::filesystem::path::{relink_target, sanitize_segment};
use crate::hash;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Entry that could not be extracted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedEntry {
    pub path: String,
    pub reason: String,
}

impl From<SkippedEntry> for Error {
    fn from(skipped: SkippedEntry) -> Self {
        Error::PartialEntryLoss {
            path: skipped.path,
            reason: skipped.reason,
        }
    }
}

/// Summary of one decode
#[derive(Debug, Clone, Default)]
pub struct ExtractReport {
    pub files: usize,
    pub directories: usize,
    pub symlinks: usize,
    pub skipped: Vec<SkippedEntry>,
}

impl ExtractReport {
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// An opened container: parsed header plus a handle on the payload section
pub struct Archive {
    path: PathBuf,
    file: File,
    header: ContainerHeader,
    data_offset: u64,
    payload_len: u64,
}

impl Archive {
    /// Open a container and parse its header
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| Error::IoError(format!("Failed to open {}: {e}", path.display())))?;
        let (header, data_offset) = ContainerHeader::read_from(&mut file)?;
        let total = file.metadata()?.len();
        let payload_len = total.saturating_sub(data_offset);

        debug!(
            "Opened container {} (payload {} bytes at offset {})",
            path.display(),
            payload_len,
            data_offset
        );

        Ok(Self {
            path: path.to_path_buf(),
            file,
            header,
            data_offset,
            payload_len,
        })
    }

    pub fn header(&self) -> &ContainerHeader {
        &self.header
    }

    /// Side-store directory holding unpacked files
    pub fn unpacked_dir(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".unpacked");
        PathBuf::from(name)
    }

    /// Bounded reader over one packed file's bytes
    pub fn packed_reader(&self, entry: &FileEntry) -> Result<io::Take<&File>> {
        let offset = entry
            .payload_offset()?
            .ok_or_else(|| Error::FormatError("Entry is stored unpacked".to_string()))?;
        let end = offset
            .checked_add(entry.size)
            .ok_or_else(|| Error::FormatError("Entry range overflows".to_string()))?;
        if end > self.payload_len {
            return Err(Error::FormatError(format!(
                "Entry range {offset}..{end} exceeds payload length {}",
                self.payload_len
            )));
        }
        let mut handle = &self.file;
        handle.seek(SeekFrom::Start(self.data_offset + offset))?;
        Ok(handle.take(entry.size))
    }

    /// Materialize every entry under `dest`
    pub fn extract_to(&self, dest: &Path) -> Result<ExtractReport> {
        fs::create_dir_all(dest)?;
        let mut report = ExtractReport::default();
        self.extract_children(&self.header.files, Path::new(""), dest, &mut report);

        if report.skipped.is_empty() {
            info!(
                "Extracted {} files, {} directories, {} symlinks from {}",
                report.files,
                report.directories,
                report.symlinks,
                self.path.display()
            );
        } else {
            warn!(
                "Extracted {} files from {}, skipped {} entries",
                report.files,
                self.path.display(),
                report.skipped.len()
            );
        }
        Ok(report)
    }

    fn extract_children(
        &self,
        children: &BTreeMap<String, Entry>,
        relative: &Path,
        dest: &Path,
        report: &mut ExtractReport,
    ) {
        for (name, entry) in children {
            let shown = relative.join(name).to_string_lossy().replace('\\', "/");
            let result = sanitize_segment(name).and_then(|segment| {
                let rel = relative.join(segment);
                self.extract_entry(entry, &rel, dest, report)
            });
            if let Err(e) = result {
                warn!("Skipping entry {}: {}", shown, e);
                report.skipped.push(SkippedEntry {
                    path: shown,
                    reason: e.to_string(),
                });
            }
        }
    }

    fn extract_entry(
        &self,
        entry: &Entry,
        relative: &Path,
        dest: &Path,
        report: &mut ExtractReport,
    ) -> Result<()> {
        let target = dest.join(relative);
        match entry {
            Entry::Directory { files } => {
                if fs::symlink_metadata(&target).is_ok_and(|m| !m.is_dir()) {
                    remove_path(&target)?;
                }
                fs::create_dir_all(&target)?;
                report.directories += 1;
                self.extract_children(files, relative, dest, report);
            }
            Entry::Symlink { link } => {
                let link_target = PathBuf::from(link.replace('\\', "/"));
                let on_disk = relink_target(relative, &link_target)?;
                remove_path(&target)?;
                create_symlink(&on_disk, &target)?;
                report.symlinks += 1;
            }
            Entry::File(file) => {
                if file.unpacked {
                    self.extract_unpacked(relative, &target)?;
                } else {
                    self.extract_packed(file, &target)?;
                }
                check_integrity(file, &target, relative);
                set_executable(&target, file.executable)?;
                report.files += 1;
            }
        }
        Ok(())
    }

    fn extract_packed(&self, file: &FileEntry, target: &Path) -> Result<()> {
        let mut reader = self.packed_reader(file)?;
        remove_path(target)?;
        let mut out = File::create(target)?;
        let copied = io::copy(&mut reader, &mut out)?;
        if copied != file.size {
            drop(out);
            let _ = fs::remove_file(target);
            return Err(Error::FormatError(format!(
                "Short read: expected {} bytes, got {copied}",
                file.size
            )));
        }
        Ok(())
    }

    fn extract_unpacked(&self, relative: &Path, target: &Path) -> Result<()> {
        let source = self.unpacked_dir().join(relative);
        if !source.is_file() {
            return Err(Error::NotFoundError(format!(
                "Unpacked file missing from side store: {}",
                source.display()
            )));
        }
        remove_path(target)?;
        fs::copy(&source, target)?;
        Ok(())
    }
}

fn check_integrity(file: &FileEntry, target: &Path, relative: &Path) {
    let Some(integrity) = &file.integrity else {
        return;
    };
    if !integrity.algorithm.eq_ignore_ascii_case("sha256") {
        return;
    }
    match hash::verify_file(target, &integrity.hash) {
        Ok(true) => {}
        Ok(false) => warn!("Integrity hash mismatch for {}", relative.display()),
        Err(e) => debug!("Could not hash {}: {}", relative.display(), e),
    }
}

#[cfg(unix)]
fn set_executable(path: &Path, executable: bool) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    if executable {
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn set_executable(_path: &Path, _executable: bool) -> Result<()> {
    Ok(())
}

/// Decode `container` into `dest`
pub fn decode(container: &Path, dest: &Path) -> Result<ExtractReport> {
    Archive::open(container)?.extract_to(dest)
}
