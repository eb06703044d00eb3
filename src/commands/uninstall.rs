// src/commands/uninstall.rs
//! Uninstall command

use super::progress::ProgressObserver;
use super::report_outcome;
use anyhow::Result;
use aura_install::config::{Settings, UninstallOptions};
use aura_install::pipeline::{OperationController, PipelineEnv};
use std::sync::Arc;

/// Run an uninstall and return the process exit code
pub fn cmd_uninstall(settings: Settings, options: UninstallOptions, json: bool) -> Result<i32> {
    let observer = Arc::new(ProgressObserver::new("Removing HugoAura", options.interactive));
    let env = PipelineEnv::new(settings).with_observer(observer);
    let handle = OperationController::new(env).spawn_uninstall(options)?;
    let outcome = handle.join()?;
    report_outcome(&outcome, json)
}
