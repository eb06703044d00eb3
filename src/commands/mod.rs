// src/commands/mod.rs
//! Command handlers for the aura-install CLI

mod backup;
mod install;
pub mod progress;
mod status;
mod uninstall;
mod versions;

pub use backup::{
    cmd_backup_create, cmd_backup_delete, cmd_backup_list, cmd_backup_restore, cmd_backup_verify,
};
pub use install::{InstallArgs, cmd_install};
pub use status::cmd_status;
pub use uninstall::cmd_uninstall;
pub use versions::cmd_versions;

use anyhow::Result;
use aura_install::config::Settings;
use aura_install::pipeline::InstallOutcome;
use std::path::Path;
use tracing::debug;

/// Load settings from `path`, or defaults when no file is given
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let settings = Settings::load_or_default(path)?;
    settings.validate()?;
    debug!("Backups in {}", settings.paths.backup_dir.display());
    Ok(settings)
}

/// Print a pipeline outcome and return its exit code
fn report_outcome(outcome: &InstallOutcome, json: bool) -> Result<i32> {
    if json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
        return Ok(outcome.exit_code());
    }

    if outcome.success {
        if let Some(version) = &outcome.installed_version {
            println!("Installed version: {}", version);
        }
        if let Some(id) = &outcome.backup_id {
            println!("Backup: {}", id);
        }
        if let Some(dir) = &outcome.scratch_dir {
            println!("Dry run output kept in {}", dir.display());
        }
    } else {
        eprintln!(
            "{} during {} (exit code {})",
            outcome.state,
            outcome.last_step,
            outcome.exit_code()
        );
        if let Some(message) = outcome.message() {
            eprintln!("  {}", message);
        }
    }
    Ok(outcome.exit_code())
}
