// src/archive/header.rs

//! Container header model and its pickle framing
//!
//! On disk the header is two Chromium pickles followed by the payload:
//!
//! ```text
//! [u32 = 4][u32 header_pickle_size]                 size pickle
//! [u32 payload_size][i32 json_len][json][pad to 4]  header pickle
//! [payload bytes ...]                               starts at 8 + header_pickle_size
//! ```
//!
//! All integers are little-endian. The JSON is `{"files": {...}}` where each
//! node is a directory (`files`), a symlink (`link`) or a file (`size`,
//! `offset`, optional `unpacked`, `executable`, `integrity`).

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Upper bound for a header; anything larger is treated as corrupt
const MAX_HEADER_SIZE: u32 = 256 * 1024 * 1024;

/// Block size used for per-file integrity hashes (4 MiB)
pub const INTEGRITY_BLOCK_SIZE: u64 = 4 * 1024 * 1024;

/// Root of a container header
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerHeader {
    pub files: BTreeMap<String, Entry>,
}

/// One node of the header tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Entry {
    Directory { files: BTreeMap<String, Entry> },
    Symlink { link: String },
    File(FileEntry),
}

/// File node; packed files carry an offset, unpacked ones live in the side store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    pub size: u64,

    #[serde(
        default,
        deserialize_with = "offset_string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub offset: Option<String>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub unpacked: bool,

    #[serde(default, skip_serializing_if = "is_false")]
    pub executable: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity: Option<Integrity>,
}

/// SHA-256 of the whole file plus per-block hashes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Integrity {
    pub algorithm: String,
    pub hash: String,
    pub block_size: u64,
    pub blocks: Vec<String>,
}

fn is_false(b: &bool) -> bool {
    !*b
}

fn offset_string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Offset {
        Text(String),
        Number(u64),
    }

    Ok(Option::<Offset>::deserialize(deserializer)?.map(|o| match o {
        Offset::Text(s) => s,
        Offset::Number(n) => n.to_string(),
    }))
}

impl FileEntry {
    /// Byte offset into the payload section, if this is a packed file
    pub fn payload_offset(&self) -> Result<Option<u64>> {
        if self.unpacked {
            return Ok(None);
        }
        match &self.offset {
            Some(text) => text
                .parse::<u64>()
                .map(Some)
                .map_err(|_| Error::FormatError(format!("Invalid payload offset: {text}"))),
            None => Err(Error::FormatError("Packed file without offset".to_string())),
        }
    }
}

impl ContainerHeader {
    /// Read the pickle-framed header, returning it with the payload start offset
    pub fn read_from<R: Read>(reader: &mut R) -> Result<(Self, u64)> {
        let mut size_pickle = [0u8; 8];
        reader
            .read_exact(&mut size_pickle)
            .map_err(|e| Error::FormatError(format!("Truncated size pickle: {e}")))?;

        let size_field = u32::from_le_bytes([size_pickle[0], size_pickle[1], size_pickle[2], size_pickle[3]]);
        if size_field != 4 {
            return Err(Error::FormatError(format!(
                "Unexpected size pickle length {size_field}"
            )));
        }
        let header_pickle_size =
            u32::from_le_bytes([size_pickle[4], size_pickle[5], size_pickle[6], size_pickle[7]]);
        if !(8..=MAX_HEADER_SIZE).contains(&header_pickle_size) {
            return Err(Error::FormatError(format!(
                "Implausible header size {header_pickle_size}"
            )));
        }

        let mut pickle = vec![0u8; header_pickle_size as usize];
        reader
            .read_exact(&mut pickle)
            .map_err(|e| Error::FormatError(format!("Truncated header: {e}")))?;

        let payload_size = u32::from_le_bytes([pickle[0], pickle[1], pickle[2], pickle[3]]) as usize;
        let json_len = i32::from_le_bytes([pickle[4], pickle[5], pickle[6], pickle[7]]);
        if json_len < 0 || payload_size + 4 > pickle.len() || json_len as usize + 4 > payload_size {
            return Err(Error::FormatError(format!(
                "Header pickle lengths disagree (payload {payload_size}, json {json_len})"
            )));
        }

        let json = &pickle[8..8 + json_len as usize];
        let header: ContainerHeader = serde_json::from_slice(json)
            .map_err(|e| Error::FormatError(format!("Header JSON does not match schema: {e}")))?;

        Ok((header, 8 + u64::from(header_pickle_size)))
    }

    /// Write the pickle-framed header; returns the number of bytes written
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<u64> {
        let json = serde_json::to_vec(self)?;
        let json_len = u32::try_from(json.len())
            .map_err(|_| Error::FormatError("Header too large".to_string()))?;
        let padding = (4 - json.len() % 4) % 4;
        let payload_size = 4 + json_len + padding as u32;
        let header_pickle_size = payload_size + 4;

        writer.write_all(&4u32.to_le_bytes())?;
        writer.write_all(&header_pickle_size.to_le_bytes())?;
        writer.write_all(&payload_size.to_le_bytes())?;
        writer.write_all(&json_len.to_le_bytes())?;
        writer.write_all(&json)?;
        writer.write_all(&[0u8; 3][..padding])?;

        Ok(8 + u64::from(header_pickle_size))
    }

    /// Insert an entry at a relative path, creating parent directories
    pub fn insert(&mut self, relative: &Path, entry: Entry) -> Result<()> {
        let segments: Vec<String> = relative
            .iter()
            .map(|s| s.to_string_lossy().into_owned())
            .collect();
        let Some((leaf, parents)) = segments.split_last() else {
            return Err(Error::InvalidPath("Empty entry path".to_string()));
        };

        let mut children = &mut self.files;
        for segment in parents {
            let node = children
                .entry(segment.clone())
                .or_insert_with(|| Entry::Directory {
                    files: BTreeMap::new(),
                });
            children = match node {
                Entry::Directory { files } => files,
                _ => {
                    return Err(Error::FormatError(format!(
                        "{} is not a directory in the header",
                        segment
                    )));
                }
            };
        }
        children.insert(leaf.clone(), entry);
        Ok(())
    }

    /// Look up an entry by relative path
    pub fn get(&self, relative: &Path) -> Option<&Entry> {
        let mut children = &self.files;
        let mut found = None;
        for segment in relative.iter() {
            let entry = children.get(segment.to_str()?)?;
            found = Some(entry);
            children = match entry {
                Entry::Directory { files } => files,
                _ => &EMPTY,
            };
        }
        found
    }

    /// Every file node with its relative path, in traversal order
    pub fn files(&self) -> Vec<(PathBuf, &FileEntry)> {
        let mut out = Vec::new();
        collect_files(&self.files, PathBuf::new(), &mut out);
        out
    }
}

static EMPTY: BTreeMap<String, Entry> = BTreeMap::new();

fn collect_files<'a>(
    children: &'a BTreeMap<String, Entry>,
    prefix: PathBuf,
    out: &mut Vec<(PathBuf, &'a FileEntry)>,
) {
    for (name, entry) in children {
        let path = prefix.join(name);
        match entry {
            Entry::Directory { files } => collect_files(files, path, out),
            Entry::File(file) => out.push((path, file)),
            Entry::Symlink { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packed(size: u64, offset: u64) -> Entry {
        Entry::File(FileEntry {
            size,
            offset: Some(offset.to_string()),
            unpacked: false,
            executable: false,
            integrity: None,
        })
    }

    #[test]
    fn test_parse_entry_kinds() {
        let json = r#"{"files":{
            "lib":{"files":{"a.js":{"size":3,"offset":"0"}}},
            "link":{"link":"lib/a.js"},
            "native.node":{"size":10,"unpacked":true,"executable":true}
        }}"#;
        let header: ContainerHeader = serde_json::from_str(json).unwrap();
        assert!(matches!(header.files["lib"], Entry::Directory { .. }));
        assert!(matches!(header.files["link"], Entry::Symlink { .. }));
        match &header.files["native.node"] {
            Entry::File(f) => {
                assert!(f.unpacked);
                assert!(f.executable);
                assert_eq!(f.payload_offset().unwrap(), None);
            }
            other => panic!("unexpected entry {other:?}"),
        }
    }

    #[test]
    fn test_numeric_offset_accepted() {
        let header: ContainerHeader =
            serde_json::from_str(r#"{"files":{"a":{"size":1,"offset":7}}}"#).unwrap();
        match &header.files["a"] {
            Entry::File(f) => assert_eq!(f.payload_offset().unwrap(), Some(7)),
            other => panic!("unexpected entry {other:?}"),
        }
    }

    #[test]
    fn test_pickle_framing() {
        let mut header = ContainerHeader::default();
        header.insert(Path::new("main.js"), packed(120, 0)).unwrap();

        let mut bytes = Vec::new();
        let data_offset = header.write_to(&mut bytes).unwrap();
        assert_eq!(data_offset, bytes.len() as u64);
        assert_eq!(bytes.len() % 4, 0);
        assert_eq!(&bytes[..4], &4u32.to_le_bytes());

        let (parsed, offset) = ContainerHeader::read_from(&mut bytes.as_slice()).unwrap();
        assert_eq!(offset, data_offset);
        assert_eq!(parsed, header);
    }

    #[test]
    fn test_garbage_is_format_error() {
        let err = ContainerHeader::read_from(&mut &b"not a container at all"[..]).unwrap_err();
        assert!(matches!(err, Error::FormatError(_)));

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&4u32.to_le_bytes());
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&12u32.to_le_bytes());
        bytes.extend_from_slice(&8i32.to_le_bytes());
        bytes.extend_from_slice(b"{\"x\":1} ");
        let err = ContainerHeader::read_from(&mut bytes.as_slice()).unwrap_err();
        assert!(matches!(err, Error::FormatError(_)));
    }

    #[test]
    fn test_insert_and_get() {
        let mut header = ContainerHeader::default();
        header.insert(Path::new("a/b/c.js"), packed(1, 0)).unwrap();
        header.insert(Path::new("a/d.js"), packed(2, 1)).unwrap();
        assert!(matches!(
            header.get(Path::new("a/b")),
            Some(Entry::Directory { .. })
        ));
        assert!(header.get(Path::new("a/b/c.js/x")).is_none());
        let files: Vec<_> = header.files().into_iter().map(|(p, _)| p).collect();
        assert_eq!(
            files,
            vec![PathBuf::from("a/b/c.js"), PathBuf::from("a/d.js")]
        );
        assert!(header.insert(Path::new("a/d.js/x"), packed(1, 0)).is_err());
    }
}
