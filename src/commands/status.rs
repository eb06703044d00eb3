// src/commands/status.rs
//! Installation status command

use anyhow::Result;
use aura_install::config::Settings;
use aura_install::pipeline::{PipelineEnv, installation_status};
use chrono::Local;
use std::path::PathBuf;

pub fn cmd_status(settings: Settings, target_dir: Option<PathBuf>, json: bool) -> Result<()> {
    let env = PipelineEnv::new(settings);
    let status = installation_status(&env, target_dir.as_deref());

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    match &status.target_dir {
        Some(dir) => {
            println!("Target directory: {}", dir.display());
            if let Some(version) = &status.target_version {
                println!("Target version:   {}", version);
            }
        }
        None => println!("Target directory: not found"),
    }

    if let Some(pid) = status.busy_pid {
        println!("Installer running: pid {}", pid);
    }

    if !status.installed {
        println!("HugoAura is not installed");
        return Ok(());
    }

    println!(
        "Installed version: {}",
        status.version.as_deref().unwrap_or("unknown")
    );
    if let Some(time) = status.install_time {
        println!(
            "Installed at:      {}",
            time.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
        );
    }
    if let Some(overlay) = &status.overlay_folder {
        println!("Overlay folder:    {}", overlay.display());
    }
    match &status.original_backup {
        Some(path) => println!("Original package:  {}", path.display()),
        None => println!("Original package:  no copy found"),
    }
    Ok(())
}
