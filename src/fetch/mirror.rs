// src/fetch/mirror.rs

//! Multi-mirror acquisition with optional latency ranking
//!
//! Mirrors are tried in order until one succeeds. Ranking only changes the
//! order; a mirror that fails its probe stays in the list behind the ones
//! that answered.

use super::client::{DownloadClient, ProgressFn};
use crate::error::{Error, Result};
use crate::session::CancelToken;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};
use url::Url;

/// One mirror base location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorSource {
    pub base_location: String,
    /// Probe round-trip time, if the last probe succeeded
    pub measured_latency: Option<Duration>,
}

impl MirrorSource {
    pub fn new(base_location: impl Into<String>) -> Self {
        Self {
            base_location: base_location.into(),
            measured_latency: None,
        }
    }

    /// `base / version_tag / resource_name ? ts=<millis>`
    pub fn resource_url(&self, version_tag: &str, resource_name: &str) -> Result<Url> {
        let mut url = self.resource_url_without_ts(version_tag, resource_name)?;
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        url.query_pairs_mut().append_pair("ts", &millis.to_string());
        Ok(url)
    }

    fn resource_url_without_ts(&self, version_tag: &str, resource_name: &str) -> Result<Url> {
        let joined = format!(
            "{}/{}/{}",
            self.base_location.trim_end_matches('/'),
            version_tag.trim_matches('/'),
            resource_name.trim_start_matches('/')
        );
        Url::parse(&joined)
            .map_err(|e| Error::InvalidArguments(format!("Invalid mirror URL {joined}: {e}")))
    }
}

/// Build mirror sources from configured base locations
pub fn mirrors_from(bases: &[String]) -> Vec<MirrorSource> {
    bases.iter().map(MirrorSource::new).collect()
}

/// Downloads a named release resource from a list of mirrors
pub struct ResilientFetcher {
    client: DownloadClient,
    probe_timeout: Duration,
}

impl ResilientFetcher {
    pub fn new(download_timeout: Duration, probe_timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: DownloadClient::new(download_timeout)?,
            probe_timeout,
        })
    }

    /// Probe every mirror and order them by latency
    ///
    /// Mirrors that answered come first, fastest first. Mirrors whose probe
    /// failed follow in their original order. If nothing answered the
    /// original order is returned unchanged.
    pub fn rank_mirrors(
        &self,
        mirrors: &[MirrorSource],
        version_tag: &str,
        resource_name: &str,
    ) -> Vec<MirrorSource> {
        let mut answered = Vec::new();
        let mut failed = Vec::new();

        for mirror in mirrors {
            let probed = mirror
                .resource_url_without_ts(version_tag, resource_name)
                .and_then(|url| self.client.probe(url.as_str(), self.probe_timeout));
            match probed {
                Ok(latency) => {
                    debug!("Mirror {} answered in {:?}", mirror.base_location, latency);
                    answered.push(MirrorSource {
                        base_location: mirror.base_location.clone(),
                        measured_latency: Some(latency),
                    });
                }
                Err(e) => {
                    debug!("Mirror {} probe failed: {}", mirror.base_location, e);
                    failed.push(MirrorSource {
                        base_location: mirror.base_location.clone(),
                        measured_latency: None,
                    });
                }
            }
        }

        if answered.is_empty() {
            warn!("No mirror answered the latency probe, keeping configured order");
            return failed;
        }

        answered.sort_by_key(|m| m.measured_latency);
        info!(
            "Fastest mirror: {} ({:?})",
            answered[0].base_location,
            answered[0].measured_latency.unwrap_or_default()
        );
        answered.extend(failed);
        answered
    }

    /// Download `resource_name` of `version_tag` into `dest_dir`
    ///
    /// Returns the local path. Per-mirror failures are logged and the next
    /// mirror is tried; cancellation aborts immediately with
    /// [`Error::Cancelled`].
    pub fn fetch(
        &self,
        resource_name: &str,
        version_tag: &str,
        mirrors: &[MirrorSource],
        dest_dir: &Path,
        progress: ProgressFn<'_>,
        cancel: &CancelToken,
    ) -> Result<PathBuf> {
        let dest = dest_dir.join(resource_name);

        for (index, mirror) in mirrors.iter().enumerate() {
            cancel.check()?;

            let url = match mirror.resource_url(version_tag, resource_name) {
                Ok(url) => url,
                Err(e) => {
                    warn!("Skipping mirror {}: {}", mirror.base_location, e);
                    continue;
                }
            };

            info!(
                "Fetching {} from mirror {}/{}: {}",
                resource_name,
                index + 1,
                mirrors.len(),
                mirror.base_location
            );
            match self.client.download(url.as_str(), &dest, progress, cancel) {
                Ok(bytes) => {
                    info!("Downloaded {} ({} bytes)", resource_name, bytes);
                    return Ok(dest);
                }
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    warn!("Mirror {} failed: {}", mirror.base_location, e);
                }
            }
        }

        Err(Error::AcquisitionExhausted {
            resource: resource_name.to_string(),
            attempts: mirrors.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_url() {
        let mirror = MirrorSource::new("https://mirror.example/releases/download/");
        let url = mirror.resource_url("v1.2.0", "aura.zip").unwrap();
        assert_eq!(url.path(), "/releases/download/v1.2.0/aura.zip");
        assert!(url.query().unwrap().starts_with("ts="));
    }

    #[test]
    fn test_proxy_style_base_keeps_embedded_url() {
        let mirror = MirrorSource::new("https://proxy.example/https://github.com/o/r/releases/download");
        let url = mirror.resource_url_without_ts("v1", "app-patched.asar").unwrap();
        assert!(url
            .as_str()
            .ends_with("github.com/o/r/releases/download/v1/app-patched.asar"));
    }

    #[test]
    fn test_empty_mirror_list_is_exhausted() {
        let fetcher = ResilientFetcher::new(Duration::from_secs(1), Duration::from_millis(10)).unwrap();
        let tmp = tempfile::tempdir().unwrap();
        let err = fetcher
            .fetch(
                "aura.zip",
                "v1",
                &[],
                tmp.path(),
                &crate::fetch::no_progress,
                &CancelToken::new(),
            )
            .unwrap_err();
        assert!(matches!(err, Error::AcquisitionExhausted { attempts: 0, .. }));
    }

    #[test]
    fn test_cancelled_before_first_mirror() {
        let fetcher = ResilientFetcher::new(Duration::from_secs(1), Duration::from_millis(10)).unwrap();
        let tmp = tempfile::tempdir().unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = fetcher
            .fetch(
                "aura.zip",
                "v1",
                &mirrors_from(&["http://127.0.0.1:9".to_string()]),
                tmp.path(),
                &crate::fetch::no_progress,
                &cancel,
            )
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
