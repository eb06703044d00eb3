// src/pipeline/uninstall.rs

//! Uninstall pipeline and installation status

use super::install::resolve_target_dir;
use super::{InstallOutcome, PipelineEnv, PipelineState, Run};
use crate::config::UninstallOptions;
use crate::error::Result;
use crate::filesystem::{remove_file_with_retry, remove_path};
use crate::session::{CancelToken, SessionKind};
use crate::system::{InstallLock, detect_target_version};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// What is currently installed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstallationStatus {
    pub installed: bool,
    /// Recorded patched version
    pub version: Option<String>,
    pub install_time: Option<DateTime<Utc>>,
    pub target_dir: Option<PathBuf>,
    /// Version of the target application, from its install path
    pub target_version: Option<String>,
    pub container: Option<PathBuf>,
    pub overlay_folder: Option<PathBuf>,
    /// Copy of the pristine container kept by the installer
    pub original_backup: Option<PathBuf>,
    pub has_backup: bool,
    /// PID of an installer process currently holding the install lock
    pub busy_pid: Option<u32>,
}

/// Names the pristine container may have been kept under, in lookup order
pub fn original_backup_names(container_name: &str) -> Vec<String> {
    let path = Path::new(container_name);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(container_name);
    let renamed = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{stem}_original.{ext}"),
        None => format!("{stem}_original"),
    };
    vec![
        format!("{container_name}.backup"),
        format!("{container_name}.original"),
        format!("{container_name}.bak"),
        renamed,
    ]
}

/// First existing copy of the pristine container in `target_dir`
pub fn find_original_backup(target_dir: &Path, container_name: &str) -> Option<PathBuf> {
    original_backup_names(container_name)
        .into_iter()
        .map(|name| target_dir.join(name))
        .find(|path| path.is_file())
}

/// Inspect the version store and the target directory
///
/// An installation is detected from a recorded version, an overlay folder,
/// or a kept original container.
pub fn installation_status(env: &PipelineEnv, target_dir: Option<&Path>) -> InstallationStatus {
    let settings = &env.settings;
    let mut status = InstallationStatus::default();

    match env.versions.read() {
        Ok(Some(record)) => {
            status.version = Some(record.version);
            status.install_time = Some(record.install_time);
        }
        Ok(None) => {}
        Err(e) => warn!("Failed to read installed version: {}", e),
    }

    if let Ok(dir) = resolve_target_dir(env, target_dir, false) {
        let container = dir.join(&settings.target.container_name);
        let overlay = dir.join(&settings.target.overlay_folder);
        status.target_version = detect_target_version(&dir, &settings.target.version_prefix);
        status.container = container.is_file().then_some(container);
        status.overlay_folder = overlay.is_dir().then_some(overlay);
        status.original_backup = find_original_backup(&dir, &settings.target.container_name);
        status.has_backup = status.original_backup.is_some();
        status.target_dir = Some(dir);
    }

    let lock_file = &settings.paths.lock_file;
    if InstallLock::is_held(lock_file) {
        status.busy_pid = InstallLock::holder_pid(lock_file);
    }

    status.installed =
        status.version.is_some() || status.overlay_folder.is_some() || status.has_backup;
    status
}

/// Runs one uninstall end to end
pub struct UninstallPipeline {
    env: PipelineEnv,
    options: UninstallOptions,
    cancel: CancelToken,
}

impl UninstallPipeline {
    pub fn new(env: PipelineEnv, options: UninstallOptions) -> Self {
        Self {
            env,
            options,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn run(&self) -> InstallOutcome {
        let mut run = match Run::begin(&self.env, SessionKind::Uninstall, self.cancel.clone()) {
            Ok(run) => run,
            Err(e) => {
                warn!("Cannot start uninstall: {}", e);
                let outcome = InstallOutcome::from_error(PipelineState::Idle, &e);
                self.env
                    .observer
                    .completed(false, &outcome.message().unwrap_or_default());
                return outcome;
            }
        };
        let result = self.execute(&mut run);
        run.finish(result, "Uninstall completed")
    }

    fn execute(&self, run: &mut Run<'_>) -> Result<InstallOutcome> {
        let settings = &self.env.settings;
        let dry_run = self.options.dry_run;

        run.enter_at(PipelineState::LocatingTarget, 10, "[1/7] Checking installation")?;
        let explicit = match &self.options.target_dir {
            Some(dir) => Some(dir.clone()),
            None => resolve_target_dir(&self.env, None, self.options.interactive).ok(),
        };
        let status = installation_status(&self.env, explicit.as_deref());
        if !status.installed {
            if !self.options.force {
                warn!("No installation detected, nothing to do");
                run.status("No installation detected");
                return Ok(InstallOutcome::success(PipelineState::LocatingTarget));
            }
            warn!("No installation detected, continuing because of --force");
        }
        if let Some(version) = &status.version {
            info!("Installed version: {}", version);
        }
        if let Some(dir) = &status.target_dir {
            info!("Target directory: {}", dir.display());
        }

        run.enter_at(
            PipelineState::TerminatingTargetProcess,
            20,
            "[2/7] Stopping target process",
        )?;
        if dry_run {
            info!("[dry run] Would terminate {}", settings.target.process_name);
        } else {
            run.start_terminator()?;
        }

        run.enter_at(
            PipelineState::SuspendingSystemFilter,
            30,
            "[3/7] Unloading filesystem filter driver",
        )?;
        if dry_run {
            info!("[dry run] Would unload {}", settings.target.filter_name);
        } else if let Err(e) = self.env.system.unload_filter(&settings.target.filter_name) {
            run.warn_step(&format!("Filter driver not unloaded: {e}"));
        }

        run.enter_at(
            PipelineState::RelocatingOverlayFolder,
            40,
            "[4/7] Removing overlay folder",
        )?;
        if let Some(overlay) = &status.overlay_folder {
            if dry_run {
                info!("[dry run] Would remove {}", overlay.display());
            } else {
                remove_path(overlay)?;
                info!("Removed {}", overlay.display());
            }
        }

        run.enter_at(
            PipelineState::ReplacingContainer,
            50,
            "[5/7] Restoring original container",
        )?;
        match (&status.target_dir, &status.original_backup) {
            (Some(dir), Some(original)) => self.restore_original(dir, original)?,
            (Some(_), None) => warn!(
                "No copy of the original container found; reinstall the target application to restore it"
            ),
            (None, _) => warn!("Target directory unknown, container left as is"),
        }

        run.enter_at(
            PipelineState::PersistingVersionMetadata,
            60,
            "[6/7] Clearing version record",
        )?;
        if dry_run {
            info!("[dry run] Would clear the version record");
        } else if let Err(e) = self.env.versions.clear() {
            run.warn_step(&format!("Failed to clear version record: {e}"));
        }

        run.enter_at(PipelineState::Finalizing, 70, "[7/7] Cleaning up user data")?;
        self.remove_user_data();
        run.stop_terminator();

        Ok(InstallOutcome::success(PipelineState::Finalizing))
    }

    fn restore_original(&self, target_dir: &Path, original: &Path) -> Result<()> {
        let settings = &self.env.settings;
        let container = target_dir.join(&settings.target.container_name);
        if self.options.dry_run {
            info!(
                "[dry run] Would restore {} from {}",
                container.display(),
                original.display()
            );
            return Ok(());
        }

        remove_file_with_retry(
            &container,
            settings.install.delete_retry_attempts,
            settings.delete_retry_delay(),
        )?;
        fs::copy(original, &container)?;
        fs::remove_file(original)?;
        info!("Restored {} from {}", container.display(), original.display());
        Ok(())
    }

    fn remove_user_data(&self) {
        let data_dir = &self.env.settings.paths.data_dir;
        if self.options.keep_user_data {
            info!("Keeping user data in {}", data_dir.display());
            return;
        }
        if !data_dir.exists() {
            return;
        }
        if self.options.dry_run {
            info!("[dry run] Would remove {}", data_dir.display());
            return;
        }
        match fs::remove_dir_all(data_dir) {
            Ok(()) => info!("Removed user data {}", data_dir.display()),
            Err(e) => warn!("Failed to remove user data: {}", e),
        }
    }
}
