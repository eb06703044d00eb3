// src/pipeline/install.rs

//! Install pipeline: acquire, patch, and swap the target container

use super::{InstallOutcome, PipelineEnv, PipelineState, Run};
use crate::archive;
use crate::backup::{BackupStore, BackupTarget};
use crate::compression;
use crate::config::{InstallOptions, SourceSpec};
use crate::error::{Error, Result};
use crate::fetch::{ReleaseCatalogClient, ReleaseChannel, ResilientFetcher, mirrors_from};
use crate::filesystem::{move_dir, move_file_atomic, remove_file_with_retry, remove_path};
use crate::patch::PatchTransform;
use crate::progress::InstallObserver;
use crate::session::{CancelToken, SessionKind};
use crate::system;
use crate::version_store::InstalledVersion;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use tempfile::TempDir;
use tracing::{info, warn};

/// Version recorded for installs from a local file
const LOCAL_VERSION: &str = "local";

/// Patched container and payload archive ready on disk
struct AcquiredSource {
    container: PathBuf,
    payload: PathBuf,
    version: String,
}

/// Find the target resources directory
///
/// An explicit directory wins; otherwise the configured glob is searched,
/// and in interactive mode the observer is asked as a last resort.
pub fn resolve_target_dir(
    env: &PipelineEnv,
    explicit: Option<&Path>,
    interactive: bool,
) -> Result<PathBuf> {
    if let Some(dir) = explicit {
        return if dir.is_dir() {
            Ok(dir.to_path_buf())
        } else {
            Err(Error::TargetNotFound(format!(
                "{} is not a directory",
                dir.display()
            )))
        };
    }

    let pattern = &env.settings.target.target_glob;
    if let Some(dir) = system::locate_target(pattern) {
        return Ok(dir);
    }

    if interactive {
        warn!("No installation matches {}, asking for a directory", pattern);
        if let Some(dir) = env.observer.prompt_target_dir()
            && dir.is_dir()
        {
            return Ok(dir);
        }
    }
    Err(Error::TargetNotFound(format!("nothing matches {pattern}")))
}

/// Payload archive expected next to a local container
///
/// The container's known file-name suffix is swapped for the archive's,
/// so `x/app-patched.asar` pairs with `x/aura.zip`.
pub fn payload_beside(container: &Path, container_name: &str, archive_name: &str) -> PathBuf {
    let file_name = container
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    match file_name.strip_suffix(container_name) {
        Some(prefix) => container.with_file_name(format!("{prefix}{archive_name}")),
        None => container.with_file_name(archive_name),
    }
}

/// Maps per-file download progress into a band of the overall percentage
struct DownloadReporter {
    observer: Arc<dyn InstallObserver>,
    from: u8,
    span: u8,
    last: AtomicU8,
}

impl DownloadReporter {
    fn new(observer: Arc<dyn InstallObserver>, from: u8, span: u8) -> Self {
        Self {
            observer,
            from,
            span,
            last: AtomicU8::new(u8::MAX),
        }
    }

    fn report(&self, downloaded: u64, total: u64, name: &str) {
        if total == 0 {
            return;
        }
        let file_percent = (downloaded.saturating_mul(100) / total).min(100) as u8;
        if self.last.swap(file_percent, Ordering::Relaxed) == file_percent {
            return;
        }
        let overall = self.from + (u16::from(self.span) * u16::from(file_percent) / 100) as u8;
        self.observer.progress(
            overall,
            &format!("Downloading {name}: {file_percent}%"),
            None,
        );
    }
}

/// Runs one install end to end
pub struct InstallPipeline {
    env: PipelineEnv,
    options: InstallOptions,
    cancel: CancelToken,
}

impl InstallPipeline {
    pub fn new(env: PipelineEnv, options: InstallOptions) -> Self {
        Self {
            env,
            options,
            cancel: CancelToken::new(),
        }
    }

    /// Use an externally owned cancel token
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn options(&self) -> &InstallOptions {
        &self.options
    }

    /// Run the pipeline to a terminal state
    pub fn run(&self) -> InstallOutcome {
        let mut run = match Run::begin(&self.env, SessionKind::Install, self.cancel.clone()) {
            Ok(run) => run,
            Err(e) => {
                warn!("Cannot start install: {}", e);
                let outcome = InstallOutcome::from_error(PipelineState::Idle, &e);
                self.env
                    .observer
                    .completed(false, &outcome.message().unwrap_or_default());
                return outcome;
            }
        };

        if self.options.dry_run {
            info!("Dry run: the target installation will not be modified");
        }

        let mut scratch = None;
        let result = self.execute(&mut run, &mut scratch);
        let mut outcome = run.finish(result, "Installation completed");

        if let Some(dir) = scratch {
            if self.options.dry_run {
                let kept = dir.keep();
                info!("Dry run artifacts kept in {}", kept.display());
                outcome.scratch_dir = Some(kept);
            } else if let Err(e) = dir.close() {
                warn!("Failed to remove scratch directory: {}", e);
            }
        }
        outcome
    }

    fn execute(&self, run: &mut Run<'_>, scratch_slot: &mut Option<TempDir>) -> Result<InstallOutcome> {
        let settings = &self.env.settings;
        let dry_run = self.options.dry_run;

        run.enter(
            PipelineState::LocatingTarget,
            PipelineState::LocatingTarget.describe(),
        )?;
        let target_dir = resolve_target_dir(
            &self.env,
            self.options.target_dir.as_deref(),
            self.options.interactive,
        )?;
        info!("Target directory: {}", target_dir.display());

        fs::create_dir_all(&settings.paths.temp_dir)?;
        let scratch = tempfile::Builder::new()
            .prefix("aura-install-")
            .tempdir_in(&settings.paths.temp_dir)?;
        let scratch_path = scratch.path().to_path_buf();
        *scratch_slot = Some(scratch);

        run.enter(
            PipelineState::AcquiringSource,
            PipelineState::AcquiringSource.describe(),
        )?;
        let source = self.acquire(run, &scratch_path.join("download"))?;

        run.enter(PipelineState::Decoding, PipelineState::Decoding.describe())?;
        let overlay_source = self.unpack_payload(&source.payload, &scratch_path.join("payload"))?;
        let tree = scratch_path.join("tree");
        let report = archive::decode(&source.container, &tree)?;
        if !report.is_complete() {
            warn!(
                "{} entries of {} could not be extracted",
                report.skipped.len(),
                source.container.display()
            );
        }

        run.enter(PipelineState::Patching, PipelineState::Patching.describe())?;
        let core = overlay_source.join(&settings.install.core_folder);
        let transform = PatchTransform::with_default_rules(&settings.install.patch_entry);
        transform.apply_with_overlay(&tree, core.is_dir().then_some(core.as_path()))?;
        let built = scratch_path.join("build").join(&settings.target.container_name);
        fs::create_dir_all(scratch_path.join("build"))?;
        archive::encode(&tree, &built)?;

        run.enter(
            PipelineState::SuspendingSystemFilter,
            PipelineState::SuspendingSystemFilter.describe(),
        )?;
        let filter = &settings.target.filter_name;
        if dry_run {
            info!("[dry run] Would unload filter driver {}", filter);
        } else if let Err(e) = self.env.system.unload_filter(filter) {
            run.warn_step(&format!("Filter driver {filter} not unloaded: {e}"));
        }

        run.enter(
            PipelineState::RelocatingOverlayFolder,
            PipelineState::RelocatingOverlayFolder.describe(),
        )?;
        let target_overlay = target_dir.join(&settings.target.overlay_folder);
        if dry_run {
            info!(
                "[dry run] Would move {} to {}",
                overlay_source.display(),
                target_overlay.display()
            );
        } else {
            if target_overlay.exists() {
                warn!("Removing previous {}", target_overlay.display());
                remove_path(&target_overlay)?;
            }
            move_dir(&overlay_source, &target_overlay)?;
        }

        run.enter(
            PipelineState::TerminatingTargetProcess,
            PipelineState::TerminatingTargetProcess.describe(),
        )?;
        if dry_run {
            info!(
                "[dry run] Would terminate {} every {} ms",
                settings.target.process_name, settings.install.kill_interval_ms
            );
        } else {
            run.start_terminator()?;
        }

        run.enter(
            PipelineState::BackingUpPrevious,
            PipelineState::BackingUpPrevious.describe(),
        )?;
        let backup_id = if self.options.create_backup {
            self.snapshot(&target_dir)
        } else {
            None
        };
        self.keep_original(&target_dir);

        run.enter(
            PipelineState::ReplacingContainer,
            PipelineState::ReplacingContainer.describe(),
        )?;
        self.replace_container(&built, &target_dir)?;

        run.enter(
            PipelineState::PersistingVersionMetadata,
            PipelineState::PersistingVersionMetadata.describe(),
        )?;
        if dry_run {
            info!("[dry run] Would record version {}", source.version);
        } else if let Err(e) = self
            .env
            .versions
            .write(&InstalledVersion::now(&source.version))
        {
            run.warn_step(&format!("Failed to record installed version: {e}"));
        }

        run.enter(PipelineState::Finalizing, PipelineState::Finalizing.describe())?;
        run.stop_terminator();

        let mut outcome = InstallOutcome::success(PipelineState::Finalizing);
        outcome.installed_version = Some(source.version);
        outcome.backup_id = backup_id;
        Ok(outcome)
    }

    fn acquire(&self, run: &Run<'_>, download_dir: &Path) -> Result<AcquiredSource> {
        match &self.options.source {
            SourceSpec::LocalFile(path) => self.local_source(path),
            SourceSpec::Tag(tag) => self.download(run, tag, download_dir),
            SourceSpec::Channel(channel) => {
                let tag = self.resolve_channel(*channel)?;
                self.download(run, &tag, download_dir)
            }
        }
    }

    fn local_source(&self, container: &Path) -> Result<AcquiredSource> {
        let settings = &self.env.settings;
        if !container.is_file() {
            return Err(Error::InvalidArguments(format!(
                "Local file {} does not exist",
                container.display()
            )));
        }
        let payload = payload_beside(
            container,
            &settings.download.patched_container_name,
            &settings.download.payload_archive_name,
        );
        if !payload.is_file() {
            return Err(Error::InvalidArguments(format!(
                "{} must sit next to {}",
                payload.display(),
                container.display()
            )));
        }
        info!("Installing from local file {}", container.display());
        Ok(AcquiredSource {
            container: container.to_path_buf(),
            payload,
            version: LOCAL_VERSION.to_string(),
        })
    }

    fn resolve_channel(&self, channel: ReleaseChannel) -> Result<String> {
        let settings = &self.env.settings;
        let catalog = ReleaseCatalogClient::new(
            &settings.download.release_api_url,
            settings.download.local_versions_file.clone(),
            settings.api_timeout(),
            settings.download.channel_limit,
        )?
        .catalog();
        let release = catalog.latest(channel).ok_or_else(|| {
            Error::InvalidArguments(format!("No {channel} release is available"))
        })?;
        info!("Latest {} release is {}", channel, release.tag);
        Ok(release.tag.clone())
    }

    fn download(&self, run: &Run<'_>, tag: &str, download_dir: &Path) -> Result<AcquiredSource> {
        let settings = &self.env.settings;
        fs::create_dir_all(download_dir)?;
        let fetcher = ResilientFetcher::new(settings.download_timeout(), settings.probe_timeout())?;

        let mut mirrors = mirrors_from(&settings.download.mirrors);
        if self.options.probe_mirrors {
            run.status("Measuring mirror latency");
            mirrors = fetcher.rank_mirrors(&mirrors, tag, &settings.download.patched_container_name);
        }

        let base = PipelineState::AcquiringSource.percent();
        let container_progress = DownloadReporter::new(self.env.observer.clone(), base, 10);
        let container = fetcher.fetch(
            &settings.download.patched_container_name,
            tag,
            &mirrors,
            download_dir,
            &|done, total, name| container_progress.report(done, total, name),
            run.cancel(),
        )?;

        let payload_progress = DownloadReporter::new(self.env.observer.clone(), base + 10, 10);
        let payload = fetcher.fetch(
            &settings.download.payload_archive_name,
            tag,
            &mirrors,
            download_dir,
            &|done, total, name| payload_progress.report(done, total, name),
            run.cancel(),
        )?;

        Ok(AcquiredSource {
            container,
            payload,
            version: tag.to_string(),
        })
    }

    /// Extract the payload and find its overlay folder
    fn unpack_payload(&self, payload: &Path, dest: &Path) -> Result<PathBuf> {
        let overlay_name = &self.env.settings.target.overlay_folder;
        compression::extract_zip(payload, dest).map_err(|e| {
            Error::ExtractionFailed(format!("{}: {e}", payload.display()))
        })?;

        let top = dest.join(overlay_name);
        if top.is_dir() {
            return Ok(top);
        }

        let stem = payload
            .file_stem()
            .map(|s| s.to_os_string())
            .unwrap_or_default();
        let nested = dest.join(stem).join(overlay_name);
        if nested.is_dir() {
            warn!("Payload is nested one level deep, using {}", nested.display());
            return Ok(nested);
        }

        Err(Error::ExtractionFailed(format!(
            "{} holds no {} folder",
            payload.display(),
            overlay_name
        )))
    }

    /// Full snapshot before replacing anything; failures only warn
    fn snapshot(&self, target_dir: &Path) -> Option<String> {
        let settings = &self.env.settings;
        if self.options.dry_run {
            info!("[dry run] Would back up {}", target_dir.display());
            return None;
        }
        let previous = self.env.versions.read().ok().flatten().map(|v| v.version);
        let store = BackupStore::from_settings(settings);
        match store.create(&BackupTarget::from_settings(target_dir, settings), previous.as_deref()) {
            Ok(record) => Some(record.backup_id),
            Err(e) => {
                warn!("Backup failed, continuing without one: {}", e);
                None
            }
        }
    }

    /// Copy the pristine container aside once, for uninstall
    fn keep_original(&self, target_dir: &Path) {
        let name = &self.env.settings.target.container_name;
        let container = target_dir.join(name);
        let original = target_dir.join(format!("{name}.bak"));
        if !container.exists() || original.exists() {
            return;
        }
        if self.options.dry_run {
            info!("[dry run] Would copy {} to {}", container.display(), original.display());
            return;
        }
        match fs::copy(&container, &original) {
            Ok(_) => info!("Kept original container as {}", original.display()),
            Err(e) => warn!("Failed to keep original container: {}", e),
        }
    }

    fn replace_container(&self, built: &Path, target_dir: &Path) -> Result<()> {
        let settings = &self.env.settings;
        let container = target_dir.join(&settings.target.container_name);
        if self.options.dry_run {
            info!(
                "[dry run] Would replace {} with {}",
                container.display(),
                built.display()
            );
            return Ok(());
        }

        if container.exists() {
            remove_file_with_retry(
                &container,
                settings.install.delete_retry_attempts,
                settings.delete_retry_delay(),
            )?;
        } else {
            info!("No existing {}, nothing to delete", container.display());
        }

        move_file_atomic(built, &container)?;
        if !container.exists() {
            return Err(Error::IoError(format!(
                "{} is missing after the move",
                container.display()
            )));
        }
        info!("Replaced {}", container.display());
        Ok(())
    }
}
