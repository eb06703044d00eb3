// src/hash.rs

//! SHA-256 helpers for container integrity blocks and backup manifests

use crate::error::{Error, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Buffer size for streaming hashes (8 KB)
const HASH_BUFFER_SIZE: usize = 8192;

/// Hex SHA-256 of a byte slice
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Hex SHA-256 of everything readable from `reader`
pub fn sha256_reader<R: Read>(reader: &mut R) -> io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; HASH_BUFFER_SIZE];
    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Hex SHA-256 of a file's contents
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)
        .map_err(|e| Error::IoError(format!("Failed to open {}: {e}", path.display())))?;
    Ok(sha256_reader(&mut file)?)
}

/// Verify a file against an expected hex digest
pub fn verify_file(path: &Path, expected: &str) -> Result<bool> {
    Ok(sha256_file(path)?.eq_ignore_ascii_case(expected))
}
