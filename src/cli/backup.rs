// src/cli/backup.rs
//! Backup management commands

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum BackupCommands {
    /// Snapshot the current package and overlay folder
    Create {
        /// Target resources directory (discovered when omitted)
        #[arg(long)]
        target_dir: Option<PathBuf>,
    },

    /// List snapshots, newest first
    List {
        /// Print the records as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check a snapshot's archive and file hashes
    Verify {
        /// Backup id (backup_YYYYmmdd_HHMMSS_mmm)
        backup_id: String,
    },

    /// Put a snapshot back in place
    ///
    /// The files it replaces are kept next to them with a .bak extension.
    Restore {
        /// Backup id
        backup_id: String,

        /// Target resources directory (discovered when omitted)
        #[arg(long)]
        target_dir: Option<PathBuf>,
    },

    /// Delete a snapshot
    Delete {
        /// Backup id
        backup_id: String,
    },
}
