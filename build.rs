// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Common argument: target resources directory
fn target_dir_arg() -> Arg {
    Arg::new("target_dir")
        .long("target-dir")
        .value_name("DIR")
        .help("Target resources directory (discovered when omitted)")
}

fn flag(name: &'static str, long: &'static str, help: &'static str) -> Arg {
    Arg::new(name).long(long).action(ArgAction::SetTrue).help(help)
}

fn backup_id_arg() -> Arg {
    Arg::new("backup_id").required(true).help("Backup id")
}

fn build_cli() -> Command {
    Command::new("aura-install")
        .version(env!("CARGO_PKG_VERSION"))
        .author("HugoAura Contributors")
        .about("Install, update and remove the HugoAura overlay")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Settings file (TOML)"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .help("Increase log verbosity (-v debug, -vv trace)"),
        )
        .subcommand(
            Command::new("install")
                .about("Patch the target application and install the overlay")
                .arg(Arg::new("tag").short('t').long("tag").help("Release tag to download"))
                .arg(
                    Arg::new("local")
                        .short('l')
                        .long("local")
                        .value_name("FILE")
                        .help("Local patched package; the payload archive must sit next to it"),
                )
                .arg(
                    Arg::new("channel")
                        .long("channel")
                        .value_parser(["stable", "prerelease", "ci"])
                        .help("Install the newest release of a channel"),
                )
                .arg(target_dir_arg())
                .arg(flag("dry_run", "dry-run", "Show what would be done without touching the target"))
                .arg(flag("probe", "probe", "Rank mirrors by latency before downloading"))
                .arg(flag("no_backup", "no-backup", "Skip the snapshot of the current installation"))
                .arg(flag("non_interactive", "non-interactive", "Never prompt"))
                .arg(flag("json", "json", "Print the outcome as JSON")),
        )
        .subcommand(
            Command::new("uninstall")
                .about("Remove the overlay and restore the original package")
                .arg(target_dir_arg())
                .arg(
                    Arg::new("force")
                        .short('f')
                        .long("force")
                        .action(ArgAction::SetTrue)
                        .help("Proceed even when no installation is detected"),
                )
                .arg(flag("keep_user_data", "keep-user-data", "Leave the user data directory in place"))
                .arg(flag("dry_run", "dry-run", "Show what would be done without touching the target"))
                .arg(flag("non_interactive", "non-interactive", "Never prompt"))
                .arg(flag("json", "json", "Print the outcome as JSON")),
        )
        .subcommand(
            Command::new("backup")
                .about("Manage snapshots of the target installation")
                .subcommand(
                    Command::new("create")
                        .about("Snapshot the current package and overlay folder")
                        .arg(target_dir_arg()),
                )
                .subcommand(
                    Command::new("list")
                        .about("List snapshots, newest first")
                        .arg(flag("json", "json", "Print the records as JSON")),
                )
                .subcommand(
                    Command::new("verify")
                        .about("Check a snapshot's archive and file hashes")
                        .arg(backup_id_arg()),
                )
                .subcommand(
                    Command::new("restore")
                        .about("Put a snapshot back in place")
                        .arg(backup_id_arg())
                        .arg(target_dir_arg()),
                )
                .subcommand(
                    Command::new("delete")
                        .about("Delete a snapshot")
                        .arg(backup_id_arg()),
                ),
        )
        .subcommand(
            Command::new("versions")
                .about("List installable releases")
                .arg(flag("json", "json", "Print the catalog as JSON")),
        )
        .subcommand(
            Command::new("status")
                .about("Show what is currently installed")
                .arg(target_dir_arg())
                .arg(flag("json", "json", "Print the status as JSON")),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = manifest_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();

    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = man_dir.join("aura-install.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
