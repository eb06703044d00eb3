// src/fetch/client.rs

//! Blocking HTTP client for release artifacts
//!
//! Downloads always stream to a `.part` file in fixed-size chunks and are
//! renamed into place only once complete. The cancel token is checked
//! between chunks.

use crate::error::{Error, Result};
use crate::filesystem::ops::move_file_atomic;
use crate::session::CancelToken;
use reqwest::blocking::{Client, Response};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Buffer size for streaming downloads (8 KB)
const STREAM_BUFFER_SIZE: usize = 8192;

/// Browser-like agent; some mirrors reject unknown clients
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Progress callback: `(bytes_downloaded, total_bytes, file_name)`
///
/// `total_bytes` is 0 when the server sends no length.
pub type ProgressFn<'a> = &'a (dyn Fn(u64, u64, &str) + Send + Sync);

/// No-op progress callback
pub fn no_progress(_downloaded: u64, _total: u64, _name: &str) {}

/// HTTP client wrapper with a fixed per-request timeout
#[derive(Clone)]
pub struct DownloadClient {
    client: Client,
}

impl DownloadClient {
    /// Create a client whose requests time out after `timeout`
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::InitError(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Metadata-only request; returns the round-trip time on success
    pub fn probe(&self, url: &str, timeout: Duration) -> Result<Duration> {
        let started = Instant::now();
        let response = self
            .client
            .head(url)
            .timeout(timeout)
            .send()
            .map_err(|e| Error::DownloadError(format!("Probe of {url} failed: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::DownloadError(format!(
                "Probe of {url} returned HTTP {}",
                response.status()
            )));
        }
        Ok(started.elapsed())
    }

    /// Stream `url` into `dest`
    pub fn download(
        &self,
        url: &str,
        dest: &Path,
        progress: ProgressFn<'_>,
        cancel: &CancelToken,
    ) -> Result<u64> {
        cancel.check()?;
        info!("Downloading {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| Error::DownloadError(format!("Failed to fetch {url}: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::DownloadError(format!(
                "HTTP {} from {}",
                response.status(),
                url
            )));
        }

        let total = response.content_length().unwrap_or(0);
        let name = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        let partial = partial_path(dest);
        let result = File::create(&partial)
            .map_err(Error::from)
            .and_then(|mut file| {
                let written =
                    stream_response_to_file(response, &mut file, total, &name, progress, cancel)?;
                file.sync_all()?;
                Ok(written)
            });

        match result {
            Ok(written) => {
                if total > 0 && written != total {
                    let _ = fs::remove_file(&partial);
                    return Err(Error::DownloadError(format!(
                        "Incomplete download of {url}: {written} of {total} bytes"
                    )));
                }
                move_file_atomic(&partial, dest)?;
                debug!("Downloaded {} bytes to {}", written, dest.display());
                Ok(written)
            }
            Err(e) => {
                let _ = fs::remove_file(&partial);
                Err(e)
            }
        }
    }
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

fn stream_response_to_file(
    mut response: Response,
    file: &mut File,
    total: u64,
    name: &str,
    progress: ProgressFn<'_>,
    cancel: &CancelToken,
) -> Result<u64> {
    let mut downloaded: u64 = 0;
    let mut buffer = [0u8; STREAM_BUFFER_SIZE];

    loop {
        cancel.check()?;

        let bytes_read = response
            .read(&mut buffer)
            .map_err(|e| Error::DownloadError(format!("Failed to read response: {e}")))?;
        if bytes_read == 0 {
            break;
        }

        file.write_all(&buffer[..bytes_read])
            .map_err(|e| Error::IoError(format!("Failed to write data: {e}")))?;

        downloaded += bytes_read as u64;
        progress(downloaded, total, name);
    }

    Ok(downloaded)
}
