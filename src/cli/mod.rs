// src/cli/mod.rs
//! CLI definitions for the HugoAura installer
//!
//! The command implementations live in the `commands` module.
//!
//! - `install` - Patch the target application and install the overlay
//! - `uninstall` - Remove the overlay and restore the original package
//! - `backup` - Manage snapshots of the target installation
//! - `versions` - List installable releases
//! - `status` - Show what is currently installed

use aura_install::fetch::ReleaseChannel;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod backup;

pub use backup::BackupCommands;

#[derive(Parser)]
#[command(name = "aura-install")]
#[command(author = "HugoAura Contributors")]
#[command(version)]
#[command(about = "Install, update and remove the HugoAura overlay", long_about = None)]
pub struct Cli {
    /// Settings file (TOML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Patch the target application and install the overlay
    ///
    /// Without --tag, --local or --channel the newest stable release is
    /// installed, falling back to the newest prerelease.
    Install {
        /// Release tag to download
        #[arg(short, long, conflicts_with_all = ["local", "channel"])]
        tag: Option<String>,

        /// Local patched package; the payload archive must sit next to it
        #[arg(short, long, conflicts_with = "channel")]
        local: Option<PathBuf>,

        /// Install the newest release of a channel (stable, prerelease, ci)
        #[arg(long)]
        channel: Option<ReleaseChannel>,

        /// Target resources directory (discovered when omitted)
        #[arg(long)]
        target_dir: Option<PathBuf>,

        /// Show what would be done without touching the target
        #[arg(long)]
        dry_run: bool,

        /// Rank mirrors by latency before downloading
        #[arg(long)]
        probe: bool,

        /// Skip the snapshot of the current installation
        #[arg(long)]
        no_backup: bool,

        /// Never prompt; fail when the target cannot be found
        #[arg(long)]
        non_interactive: bool,

        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove the overlay and restore the original package
    Uninstall {
        /// Target resources directory (discovered when omitted)
        #[arg(long)]
        target_dir: Option<PathBuf>,

        /// Proceed even when no installation is detected
        #[arg(short, long)]
        force: bool,

        /// Leave the user data directory in place
        #[arg(long)]
        keep_user_data: bool,

        /// Show what would be done without touching the target
        #[arg(long)]
        dry_run: bool,

        /// Never prompt; fail when the target cannot be found
        #[arg(long)]
        non_interactive: bool,

        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage snapshots of the target installation
    #[command(subcommand)]
    Backup(BackupCommands),

    /// List installable releases
    Versions {
        /// Print the catalog as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show what is currently installed
    Status {
        /// Target resources directory (discovered when omitted)
        #[arg(long)]
        target_dir: Option<PathBuf>,

        /// Print the status as JSON
        #[arg(long)]
        json: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_install_sources_conflict() {
        let result = Cli::try_parse_from(["aura-install", "install", "--tag", "v1", "--local", "x.asar"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_channel_parses() {
        let cli = Cli::try_parse_from(["aura-install", "-v", "install", "--channel", "prerelease"]).unwrap();
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Commands::Install { channel, .. } => assert_eq!(channel, Some(ReleaseChannel::Prerelease)),
            _ => panic!("expected install"),
        }
    }
}
