// src/fetch/releases.rs

//! Release catalog from the listing API with a local fallback file
//!
//! The API returns every release; drafts and auto-build tags are dropped and
//! the rest split into stable releases and prereleases, newest first. A fixed
//! CI entry is always offered. When the API cannot be reached the catalog is
//! read from a local JSON file of the same shape.

use crate::error::{Error, Result};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{info, warn};

/// Tag of the rolling CI build
pub const CI_TAG: &str = "vAutoBuild";

/// Release names starting with this are CI builds
const CI_NAME_PREFIX: &str = "[CI";

/// Release channel selectable without naming a tag
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display, strum_macros::EnumString,
)]
#[strum(serialize_all = "lowercase")]
pub enum ReleaseChannel {
    Stable,
    Prerelease,
    Ci,
}

/// Kind of a catalog entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseKind {
    Release,
    Prerelease,
    Ci,
}

/// One installable release
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseInfo {
    pub tag: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ReleaseKind,
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde(default)]
    pub download_url: Option<String>,
}

/// Where a catalog came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogSource {
    GithubApi,
    LocalJson,
    #[default]
    Empty,
}

/// Releases grouped by channel
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseCatalog {
    #[serde(default)]
    pub releases: Vec<ReleaseInfo>,
    #[serde(default)]
    pub prereleases: Vec<ReleaseInfo>,
    #[serde(default)]
    pub ci_builds: Vec<ReleaseInfo>,
    #[serde(default)]
    pub data_source: CatalogSource,
}

/// Release as returned by the listing API
#[derive(Debug, Clone, Deserialize)]
pub struct ApiRelease {
    pub tag_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde(default)]
    pub assets: Vec<ApiAsset>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiAsset {
    pub name: String,
    pub browser_download_url: String,
}

/// First asset with the container extension, else the first asset
pub fn select_asset<'a>(assets: &'a [ApiAsset], extension: &str) -> Option<&'a ApiAsset> {
    assets
        .iter()
        .find(|a| a.name.ends_with(extension))
        .or_else(|| assets.first())
}

impl ReleaseCatalog {
    /// Group API releases into channels, keeping at most `limit` per channel
    pub fn from_api(releases: &[ApiRelease], limit: usize, extension: &str) -> Self {
        let mut catalog = ReleaseCatalog {
            data_source: CatalogSource::GithubApi,
            ..Default::default()
        };

        for release in releases {
            if release.draft || release.tag_name.contains("AutoBuild") {
                continue;
            }
            let is_ci = release
                .name
                .as_deref()
                .is_some_and(|n| n.starts_with(CI_NAME_PREFIX));
            let kind = if is_ci {
                ReleaseKind::Ci
            } else if release.prerelease {
                ReleaseKind::Prerelease
            } else {
                ReleaseKind::Release
            };
            let info = ReleaseInfo {
                tag: release.tag_name.clone(),
                name: release
                    .name
                    .clone()
                    .filter(|n| !n.is_empty())
                    .unwrap_or_else(|| release.tag_name.clone()),
                kind,
                published_at: release.published_at.clone(),
                download_url: select_asset(&release.assets, extension)
                    .map(|a| a.browser_download_url.clone()),
            };
            let bucket = match kind {
                ReleaseKind::Release => &mut catalog.releases,
                ReleaseKind::Prerelease => &mut catalog.prereleases,
                ReleaseKind::Ci => &mut catalog.ci_builds,
            };
            if bucket.len() < limit {
                bucket.push(info);
            }
        }

        // The rolling auto-build release is hidden from the listing above
        if catalog.ci_builds.is_empty() {
            catalog.ci_builds.push(ReleaseInfo {
                tag: CI_TAG.to_string(),
                name: format!("{CI_NAME_PREFIX}] HugoAura Auto Build Release"),
                kind: ReleaseKind::Ci,
                published_at: None,
                download_url: None,
            });
        }
        catalog
    }

    /// Read a catalog from a local JSON file
    pub fn load_local(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::NotFoundError(format!("Local versions file {}: {e}", path.display()))
        })?;
        let mut catalog: ReleaseCatalog = serde_json::from_str(&content)?;
        catalog.data_source = CatalogSource::LocalJson;
        Ok(catalog)
    }

    pub fn is_empty(&self) -> bool {
        self.releases.is_empty() && self.prereleases.is_empty() && self.ci_builds.is_empty()
    }

    /// Newest entry of a channel
    pub fn latest(&self, channel: ReleaseChannel) -> Option<&ReleaseInfo> {
        match channel {
            ReleaseChannel::Stable => self.releases.first(),
            ReleaseChannel::Prerelease => self.prereleases.first(),
            ReleaseChannel::Ci => self.ci_builds.first(),
        }
    }

    /// Search every channel for a tag
    pub fn find(&self, tag: &str) -> Option<&ReleaseInfo> {
        self.releases
            .iter()
            .chain(&self.prereleases)
            .chain(&self.ci_builds)
            .find(|r| r.tag == tag)
    }

    /// Release picked when the caller names nothing: newest stable, else newest prerelease
    pub fn default_release(&self) -> Result<&ReleaseInfo> {
        self.latest(ReleaseChannel::Stable)
            .or_else(|| self.latest(ReleaseChannel::Prerelease))
            .ok_or_else(|| {
                Error::InvalidArguments("No release available to install".to_string())
            })
    }
}

/// Fetches and caches the release catalog
pub struct ReleaseCatalogClient {
    client: Client,
    api_url: String,
    local_file: Option<PathBuf>,
    limit: usize,
    extension: String,
    cached: Mutex<Option<ReleaseCatalog>>,
}

impl ReleaseCatalogClient {
    pub fn new(
        api_url: impl Into<String>,
        local_file: Option<PathBuf>,
        timeout: Duration,
        limit: usize,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("aura-install/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::InitError(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_url: api_url.into(),
            local_file,
            limit,
            extension: ".asar".to_string(),
            cached: Mutex::new(None),
        })
    }

    /// API first, local file second, empty catalog last; the result is cached
    pub fn catalog(&self) -> ReleaseCatalog {
        if let Ok(guard) = self.cached.lock()
            && let Some(catalog) = guard.as_ref()
        {
            return catalog.clone();
        }

        let catalog = match self.fetch_api() {
            Ok(catalog) => {
                info!(
                    "Fetched {} releases and {} prereleases from {}",
                    catalog.releases.len(),
                    catalog.prereleases.len(),
                    self.api_url
                );
                catalog
            }
            Err(e) => {
                warn!("Release API unavailable: {}", e);
                self.load_fallback()
            }
        };

        if catalog.data_source != CatalogSource::Empty
            && let Ok(mut guard) = self.cached.lock()
        {
            *guard = Some(catalog.clone());
        }
        catalog
    }

    /// Drop the cached catalog
    pub fn refresh(&self) {
        if let Ok(mut guard) = self.cached.lock() {
            *guard = None;
        }
    }

    fn fetch_api(&self) -> Result<ReleaseCatalog> {
        let response = self
            .client
            .get(&self.api_url)
            .header("Accept", "application/vnd.github+json")
            .send()
            .map_err(|e| Error::DownloadError(format!("Failed to fetch {}: {e}", self.api_url)))?;
        if !response.status().is_success() {
            return Err(Error::DownloadError(format!(
                "HTTP {} from {}",
                response.status(),
                self.api_url
            )));
        }
        let releases: Vec<ApiRelease> = response
            .json()
            .map_err(|e| Error::ParseError(format!("Failed to parse release list: {e}")))?;
        Ok(ReleaseCatalog::from_api(&releases, self.limit, &self.extension))
    }

    fn load_fallback(&self) -> ReleaseCatalog {
        let Some(path) = &self.local_file else {
            return ReleaseCatalog::default();
        };
        match ReleaseCatalog::load_local(path) {
            Ok(catalog) => {
                info!("Loaded release catalog from {}", path.display());
                catalog
            }
            Err(e) => {
                warn!("Failed to load local release catalog: {}", e);
                ReleaseCatalog::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn api(tag: &str, prerelease: bool, draft: bool, assets: &[&str]) -> ApiRelease {
        ApiRelease {
            tag_name: tag.to_string(),
            name: None,
            prerelease,
            draft,
            published_at: None,
            assets: assets
                .iter()
                .map(|n| ApiAsset {
                    name: n.to_string(),
                    browser_download_url: format!("https://dl.example/{n}"),
                })
                .collect(),
        }
    }

    #[test]
    fn test_from_api_classifies() {
        let releases = vec![
            api("v2.0.0-beta", true, false, &[]),
            api("vAutoBuild", true, false, &[]),
            api("v1.1.0", false, false, &["aura.zip", "app-patched.asar"]),
            api("v1.2.0-draft", false, true, &[]),
            api("v1.0.0", false, false, &["aura.zip"]),
        ];
        let catalog = ReleaseCatalog::from_api(&releases, 5, ".asar");
        assert_eq!(catalog.data_source, CatalogSource::GithubApi);
        assert_eq!(catalog.releases.len(), 2);
        assert_eq!(catalog.prereleases.len(), 1);
        assert_eq!(catalog.ci_builds[0].tag, CI_TAG);
        assert_eq!(
            catalog.releases[0].download_url.as_deref(),
            Some("https://dl.example/app-patched.asar")
        );
        assert_eq!(
            catalog.releases[1].download_url.as_deref(),
            Some("https://dl.example/aura.zip")
        );
        assert_eq!(catalog.releases[0].name, "v1.1.0");
        assert_eq!(catalog.default_release().unwrap().tag, "v1.1.0");
        assert!(catalog.find("v2.0.0-beta").is_some());
        assert!(catalog.find("vAutoBuild").is_some());
    }

    #[test]
    fn test_channel_limit() {
        let releases: Vec<_> = (0..8)
            .map(|i| api(&format!("v1.0.{i}"), false, false, &[]))
            .collect();
        let catalog = ReleaseCatalog::from_api(&releases, 5, ".asar");
        assert_eq!(catalog.releases.len(), 5);
        assert_eq!(catalog.releases[0].tag, "v1.0.0");
    }

    #[test]
    fn test_default_release_falls_back_to_prerelease() {
        let catalog = ReleaseCatalog::from_api(&[api("v3.0.0-rc1", true, false, &[])], 5, ".asar");
        assert_eq!(catalog.default_release().unwrap().tag, "v3.0.0-rc1");
        assert!(ReleaseCatalog::default().default_release().is_err());
    }

    #[test]
    fn test_local_fallback() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("versions.json");
        std::fs::write(
            &path,
            r#"{"releases":[{"tag":"v1.0.0","name":"First","type":"release"}],"prereleases":[],"ci_builds":[]}"#,
        )
        .unwrap();

        let client = ReleaseCatalogClient::new(
            "http://127.0.0.1:9/releases",
            Some(path),
            Duration::from_millis(200),
            5,
        )
        .unwrap();
        let catalog = client.catalog();
        assert_eq!(catalog.data_source, CatalogSource::LocalJson);
        assert_eq!(catalog.latest(ReleaseChannel::Stable).unwrap().name, "First");

        std::fs::write(
            client.local_file.as_ref().unwrap(),
            r#"{"releases":[{"tag":"v1.1.0","name":"Second","type":"release"}]}"#,
        )
        .unwrap();
        assert_eq!(client.catalog().releases[0].tag, "v1.0.0");
        client.refresh();
        assert_eq!(client.catalog().releases[0].tag, "v1.1.0");
    }

    #[test]
    fn test_channel_parse() {
        assert_eq!(ReleaseChannel::from_str("ci").unwrap(), ReleaseChannel::Ci);
        assert_eq!(ReleaseChannel::Prerelease.to_string(), "prerelease");
    }
}
