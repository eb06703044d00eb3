// src/commands/install.rs
//! Install command

use super::progress::ProgressObserver;
use super::report_outcome;
use anyhow::Result;
use aura_install::config::{InstallOptions, Settings, SourceSpec};
use aura_install::fetch::{ReleaseCatalogClient, ReleaseChannel};
use aura_install::pipeline::{OperationController, PipelineEnv};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Arguments of `aura-install install`
pub struct InstallArgs {
    pub tag: Option<String>,
    pub local: Option<PathBuf>,
    pub channel: Option<ReleaseChannel>,
    pub target_dir: Option<PathBuf>,
    pub dry_run: bool,
    pub probe: bool,
    pub no_backup: bool,
    pub non_interactive: bool,
    pub json: bool,
}

/// Run an install and return the process exit code
pub fn cmd_install(settings: Settings, args: InstallArgs) -> Result<i32> {
    let source = match (args.tag, args.local, args.channel) {
        (Some(tag), _, _) => SourceSpec::Tag(tag),
        (None, Some(path), _) => SourceSpec::LocalFile(path),
        (None, None, Some(channel)) => SourceSpec::Channel(channel),
        (None, None, None) => SourceSpec::Tag(default_tag(&settings)?),
    };

    let mut options = InstallOptions::new(source);
    options.target_dir = args.target_dir;
    options.interactive = !args.non_interactive;
    options.dry_run = args.dry_run;
    options.probe_mirrors = args.probe;
    options.create_backup = !args.no_backup;

    let observer = Arc::new(ProgressObserver::new("Installing HugoAura", options.interactive));
    let env = PipelineEnv::new(settings).with_observer(observer);
    let handle = OperationController::new(env).spawn_install(options)?;
    let outcome = handle.join()?;
    report_outcome(&outcome, args.json)
}

/// Newest stable release, else newest prerelease
fn default_tag(settings: &Settings) -> Result<String> {
    let client = ReleaseCatalogClient::new(
        &settings.download.release_api_url,
        settings.download.local_versions_file.clone(),
        settings.api_timeout(),
        settings.download.channel_limit,
    )?;
    let catalog = client.catalog();
    let release = catalog.default_release()?;
    info!("No version given, installing {} ({})", release.tag, release.name);
    Ok(release.tag.clone())
}
