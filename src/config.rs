// src/config.rs
//! Installer settings and per-operation options
//!
//! Settings come from an optional TOML file with the following sections:
//! - [target] - Target application names, discovery pattern, filter driver
//! - [download] - Mirror list, release API, timeouts
//! - [install] - Terminator interval, locked-file retry policy
//! - [paths] - Scratch, user data and backup locations
//! - [backup] - Retention
//!
//! Every field has a default, so an empty file (or no file) yields a
//! working configuration.

use crate::error::{Error, Result};
use crate::fetch::ReleaseChannel;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level installer settings
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub target: TargetSection,

    #[serde(default)]
    pub download: DownloadSection,

    #[serde(default)]
    pub install: InstallSection,

    #[serde(default)]
    pub paths: PathsSection,

    #[serde(default)]
    pub backup: BackupSection,
}

/// Names and locations inside the target application
#[derive(Debug, Clone, Deserialize)]
pub struct TargetSection {
    /// Display name of the overlay product
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Executable force-terminated while the container is replaced
    #[serde(default = "default_process_name")]
    pub process_name: String,

    /// Container file inside the target resources directory
    #[serde(default = "default_container_name")]
    pub container_name: String,

    /// Overlay folder placed next to the container
    #[serde(default = "default_overlay_folder")]
    pub overlay_folder: String,

    /// Glob locating the target resources directory; the last match wins
    #[serde(default = "default_target_glob")]
    pub target_glob: String,

    /// Path component prefix carrying the target application version
    #[serde(default = "default_version_prefix")]
    pub version_prefix: String,

    /// Minifilter unloaded before the overlay is moved in
    #[serde(default = "default_filter_name")]
    pub filter_name: String,
}

/// Release artifacts and mirrors
#[derive(Debug, Clone, Deserialize)]
pub struct DownloadSection {
    /// Mirror base locations, in fallback order
    #[serde(default = "default_mirrors")]
    pub mirrors: Vec<String>,

    /// Release listing endpoint
    #[serde(default = "default_release_api")]
    pub release_api_url: String,

    /// Fallback release listing used when the API is unreachable
    #[serde(default)]
    pub local_versions_file: Option<PathBuf>,

    /// Already-patched container artifact published with each release
    #[serde(default = "default_patched_container")]
    pub patched_container_name: String,

    /// Companion payload archive published with each release
    #[serde(default = "default_payload_archive")]
    pub payload_archive_name: String,

    /// Per-mirror download timeout in seconds
    #[serde(default = "default_download_timeout")]
    pub timeout_secs: u64,

    /// Latency probe timeout in milliseconds
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,

    /// Release API timeout in seconds
    #[serde(default = "default_api_timeout")]
    pub api_timeout_secs: u64,

    /// Maximum releases kept per channel
    #[serde(default = "default_channel_limit")]
    pub channel_limit: usize,
}

/// Install pipeline tuning
#[derive(Debug, Clone, Deserialize)]
pub struct InstallSection {
    /// Interval between termination attempts
    #[serde(default = "default_kill_interval")]
    pub kill_interval_ms: u64,

    /// Wait after the terminator starts before touching the container
    #[serde(default = "default_kill_settle")]
    pub kill_settle_ms: u64,

    /// Attempts to delete a locked container
    #[serde(default = "default_delete_attempts")]
    pub delete_retry_attempts: u32,

    /// Delay between delete attempts
    #[serde(default = "default_delete_delay")]
    pub delete_retry_delay_ms: u64,

    /// Timeout for external commands (taskkill, fltmc)
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// Subfolder of the overlay folder merged into the decoded container
    #[serde(default = "default_core_folder")]
    pub core_folder: String,

    /// Entry patched inside the decoded container
    #[serde(default = "default_patch_entry")]
    pub patch_entry: String,
}

/// Filesystem locations
#[derive(Debug, Clone, Deserialize)]
pub struct PathsSection {
    /// Parent of per-run scratch directories
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// User data directory removed on uninstall
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Backup store root
    #[serde(default = "default_backup_dir")]
    pub backup_dir: PathBuf,

    /// Version metadata store
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,

    /// Cross-process lock file
    #[serde(default = "default_lock_file")]
    pub lock_file: PathBuf,
}

/// Backup retention
#[derive(Debug, Clone, Deserialize)]
pub struct BackupSection {
    #[serde(default = "default_max_backups")]
    pub max_backups: usize,
}

fn default_app_name() -> String {
    "HugoAura".to_string()
}

fn default_process_name() -> String {
    "SeewoServiceAssistant.exe".to_string()
}

fn default_container_name() -> String {
    "app.asar".to_string()
}

fn default_overlay_folder() -> String {
    "aura".to_string()
}

fn default_target_glob() -> String {
    r"C:\Program Files (x86)\Seewo\SeewoService\SeewoService_*\SeewoServiceAssistant\resources"
        .to_string()
}

fn default_version_prefix() -> String {
    "SeewoService_".to_string()
}

fn default_filter_name() -> String {
    "SeewoKeLiteLady".to_string()
}

fn default_mirrors() -> Vec<String> {
    const REPO: &str = "HugoAura/Seewo-HugoAura/releases/download";
    vec![
        format!("https://gh.llkk.cc/https://github.com/{REPO}"),
        format!("https://gitproxy.127731.xyz/github.com/{REPO}"),
        format!("https://bgithub.xyz/{REPO}"),
        format!("https://github.dpik.top/github.com/{REPO}"),
        format!("https://gh.catmak.name/github.com/{REPO}"),
        format!("https://ghfast.top/github.com/{REPO}"),
        format!("https://ghproxy.net/github.com/{REPO}"),
        format!("https://github.tbedu.top/github.com/{REPO}"),
        format!("https://github.com/{REPO}"),
    ]
}

fn default_release_api() -> String {
    "https://api.github.com/repos/HugoAura/Seewo-HugoAura/releases".to_string()
}

fn default_patched_container() -> String {
    "app-patched.asar".to_string()
}

fn default_payload_archive() -> String {
    "aura.zip".to_string()
}

fn default_download_timeout() -> u64 {
    60
}

fn default_probe_timeout() -> u64 {
    3000
}

fn default_api_timeout() -> u64 {
    3
}

fn default_channel_limit() -> usize {
    5
}

fn default_kill_interval() -> u64 {
    500
}

fn default_kill_settle() -> u64 {
    2000
}

fn default_delete_attempts() -> u32 {
    10
}

fn default_delete_delay() -> u64 {
    500
}

fn default_command_timeout() -> u64 {
    10
}

fn default_core_folder() -> String {
    "core".to_string()
}

fn default_patch_entry() -> String {
    "main.js".to_string()
}

fn default_temp_dir() -> PathBuf {
    std::env::temp_dir().join("Aura-Install-Temp")
}

fn default_data_dir() -> PathBuf {
    dirs::document_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(std::env::temp_dir)
        .join("HugoAura")
}

fn default_backup_dir() -> PathBuf {
    default_installer_dir().join("backups")
}

fn default_state_file() -> PathBuf {
    default_installer_dir().join("install_state.json")
}

fn default_lock_file() -> PathBuf {
    default_installer_dir().join("install.lock")
}

fn default_installer_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("HugoAura-Installer")
}

fn default_max_backups() -> usize {
    5
}

impl Default for TargetSection {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            process_name: default_process_name(),
            container_name: default_container_name(),
            overlay_folder: default_overlay_folder(),
            target_glob: default_target_glob(),
            version_prefix: default_version_prefix(),
            filter_name: default_filter_name(),
        }
    }
}

impl Default for DownloadSection {
    fn default() -> Self {
        Self {
            mirrors: default_mirrors(),
            release_api_url: default_release_api(),
            local_versions_file: None,
            patched_container_name: default_patched_container(),
            payload_archive_name: default_payload_archive(),
            timeout_secs: default_download_timeout(),
            probe_timeout_ms: default_probe_timeout(),
            api_timeout_secs: default_api_timeout(),
            channel_limit: default_channel_limit(),
        }
    }
}

impl Default for InstallSection {
    fn default() -> Self {
        Self {
            kill_interval_ms: default_kill_interval(),
            kill_settle_ms: default_kill_settle(),
            delete_retry_attempts: default_delete_attempts(),
            delete_retry_delay_ms: default_delete_delay(),
            command_timeout_secs: default_command_timeout(),
            core_folder: default_core_folder(),
            patch_entry: default_patch_entry(),
        }
    }
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            temp_dir: default_temp_dir(),
            data_dir: default_data_dir(),
            backup_dir: default_backup_dir(),
            state_file: default_state_file(),
            lock_file: default_lock_file(),
        }
    }
}

impl Default for BackupSection {
    fn default() -> Self {
        Self {
            max_backups: default_max_backups(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::IoError(format!("Failed to read config file {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
            .map_err(|e| Error::ParseError(format!("{}: {e}", path.display())))
    }

    /// Parse settings from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(content)
            .map_err(|e| Error::ParseError(format!("Failed to parse settings: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load from `path` if given, defaults otherwise
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.download.mirrors.is_empty() {
            return Err(Error::InvalidArguments(
                "download.mirrors must list at least one mirror".to_string(),
            ));
        }
        for mirror in &self.download.mirrors {
            url::Url::parse(mirror).map_err(|e| {
                Error::InvalidArguments(format!("Invalid mirror URL {mirror}: {e}"))
            })?;
        }
        if self.install.delete_retry_attempts == 0 {
            return Err(Error::InvalidArguments(
                "install.delete_retry_attempts must be at least 1".to_string(),
            ));
        }
        if self.backup.max_backups == 0 {
            return Err(Error::InvalidArguments(
                "backup.max_backups must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download.timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.download.probe_timeout_ms)
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.download.api_timeout_secs)
    }

    pub fn kill_interval(&self) -> Duration {
        Duration::from_millis(self.install.kill_interval_ms)
    }

    pub fn kill_settle(&self) -> Duration {
        Duration::from_millis(self.install.kill_settle_ms)
    }

    pub fn delete_retry_delay(&self) -> Duration {
        Duration::from_millis(self.install.delete_retry_delay_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.install.command_timeout_secs)
    }
}

/// Where the patched container comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpec {
    /// Release tag downloaded through the mirrors
    Tag(String),
    /// Local patched container; the payload archive must sit next to it
    LocalFile(PathBuf),
    /// Newest release of a channel from the release catalog
    Channel(ReleaseChannel),
}

/// Options for one install run
#[derive(Debug, Clone)]
pub struct InstallOptions {
    pub source: SourceSpec,
    /// Target resources directory; discovered when unset
    pub target_dir: Option<PathBuf>,
    /// Ask the observer for a directory when discovery fails
    pub interactive: bool,
    /// Log mutating steps instead of executing them
    pub dry_run: bool,
    /// Rank mirrors by probe latency before downloading
    pub probe_mirrors: bool,
    /// Take a full BackupStore snapshot before replacing the container
    pub create_backup: bool,
}

impl InstallOptions {
    pub fn new(source: SourceSpec) -> Self {
        Self {
            source,
            target_dir: None,
            interactive: false,
            dry_run: false,
            probe_mirrors: false,
            create_backup: true,
        }
    }
}

/// Options for one uninstall run
#[derive(Debug, Clone, Default)]
pub struct UninstallOptions {
    pub target_dir: Option<PathBuf>,
    pub interactive: bool,
    /// Proceed even when no installation is detected
    pub force: bool,
    /// Leave the user data directory in place
    pub keep_user_data: bool,
    pub dry_run: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.target.container_name, "app.asar");
        assert_eq!(settings.download.payload_archive_name, "aura.zip");
        assert_eq!(settings.kill_interval(), Duration::from_millis(500));
        assert_eq!(settings.backup.max_backups, 5);
        assert!(settings
            .download
            .mirrors
            .last()
            .unwrap()
            .starts_with("https://github.com/"));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings = Settings::from_toml(
            r#"
[download]
mirrors = ["http://127.0.0.1:9000/releases"]

[backup]
max_backups = 2
"#,
        )
        .unwrap();
        assert_eq!(settings.download.mirrors.len(), 1);
        assert_eq!(settings.backup.max_backups, 2);
        assert_eq!(settings.target.process_name, "SeewoServiceAssistant.exe");
    }

    #[test]
    fn test_invalid_mirror_rejected() {
        let err = Settings::from_toml("[download]\nmirrors = [\"not a url\"]\n").unwrap_err();
        assert!(matches!(err, Error::InvalidArguments(_)));
    }

    #[test]
    fn test_zero_retention_rejected() {
        assert!(Settings::from_toml("[backup]\nmax_backups = 0\n").is_err());
    }
}
