// src/main.rs

mod cli;
mod commands;

use anyhow::Result;
use aura_install::config::UninstallOptions;
use clap::Parser;
use cli::{BackupCommands, Cli, Commands};
use commands::InstallArgs;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            let code = e
                .downcast_ref::<aura_install::Error>()
                .map_or(1, aura_install::Error::exit_code);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let settings = commands::load_settings(cli.config.as_deref())?;

    match cli.command {
        Commands::Install {
            tag,
            local,
            channel,
            target_dir,
            dry_run,
            probe,
            no_backup,
            non_interactive,
            json,
        } => commands::cmd_install(
            settings,
            InstallArgs {
                tag,
                local,
                channel,
                target_dir,
                dry_run,
                probe,
                no_backup,
                non_interactive,
                json,
            },
        ),

        Commands::Uninstall {
            target_dir,
            force,
            keep_user_data,
            dry_run,
            non_interactive,
            json,
        } => {
            let options = UninstallOptions {
                target_dir,
                interactive: !non_interactive,
                force,
                keep_user_data,
                dry_run,
            };
            commands::cmd_uninstall(settings, options, json)
        }

        Commands::Backup(command) => match command {
            BackupCommands::Create { target_dir } => {
                commands::cmd_backup_create(&settings, target_dir).map(|_| 0)
            }
            BackupCommands::List { json } => commands::cmd_backup_list(&settings, json).map(|_| 0),
            BackupCommands::Verify { backup_id } => commands::cmd_backup_verify(&settings, &backup_id),
            BackupCommands::Restore {
                backup_id,
                target_dir,
            } => commands::cmd_backup_restore(&settings, &backup_id, target_dir).map(|_| 0),
            BackupCommands::Delete { backup_id } => {
                commands::cmd_backup_delete(&settings, &backup_id).map(|_| 0)
            }
        },

        Commands::Versions { json } => commands::cmd_versions(&settings, json).map(|_| 0),

        Commands::Status { target_dir, json } => {
            commands::cmd_status(settings, target_dir, json).map(|_| 0)
        }
    }
}
