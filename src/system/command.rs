// src/system/command.rs

//! [`SystemOps`] backed by external commands

use super::SystemOps;
use crate::error::{Error, Result};
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::debug;
use wait_timeout::ChildExt;

/// Default timeout for external commands (10 seconds)
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Output of a finished command
struct CommandOutput {
    success: bool,
    code: i32,
    stdout: String,
    stderr: String,
}

/// Runs `taskkill` / `fltmc` with a timeout
#[derive(Debug, Clone)]
pub struct CommandOps {
    timeout: Duration,
}

impl Default for CommandOps {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl CommandOps {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        debug!("Executing: {} {:?}", program, args);

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        hide_console(&mut command);

        let mut child = command
            .spawn()
            .map_err(|e| Error::IoError(format!("Failed to spawn '{program}': {e}")))?;

        match child.wait_timeout(self.timeout)? {
            Some(status) => {
                let output = child.wait_with_output()?;
                Ok(CommandOutput {
                    success: status.success(),
                    code: status.code().unwrap_or(-1),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                })
            }
            None => {
                let _ = child.kill();
                let _ = child.wait();
                Err(Error::IoError(format!(
                    "'{}' timed out after {} seconds",
                    program,
                    self.timeout.as_secs()
                )))
            }
        }
    }
}

#[cfg(windows)]
fn hide_console(command: &mut Command) {
    use std::os::windows::process::CommandExt;
    const CREATE_NO_WINDOW: u32 = 0x0800_0000;
    command.creation_flags(CREATE_NO_WINDOW);
}

#[cfg(not(windows))]
fn hide_console(_command: &mut Command) {}

impl SystemOps for CommandOps {
    fn kill_process(&self, image_name: &str) -> Result<bool> {
        #[cfg(windows)]
        let output = self.run("taskkill", &["/f", "/im", image_name])?;
        #[cfg(not(windows))]
        let output = self.run("pkill", &["-9", "-x", image_name])?;

        if output.success {
            debug!("Terminated {}: {}", image_name, output.stdout.trim());
            return Ok(true);
        }
        // taskkill exits 128 and pkill exits 1 when nothing matched
        if output.code == 128 || output.code == 1 {
            return Ok(false);
        }
        Err(Error::IoError(format!(
            "Failed to terminate {image_name} (exit {}): {}",
            output.code,
            output.stderr.trim()
        )))
    }

    fn unload_filter(&self, filter_name: &str) -> Result<()> {
        let output = self.run("fltmc", &["unload", filter_name])?;
        if output.success {
            return Ok(());
        }
        let detail = if output.stderr.trim().is_empty() {
            output.stdout
        } else {
            output.stderr
        };
        Err(Error::IoError(format!(
            "fltmc unload {filter_name} exited with {}: {}",
            output.code,
            detail.trim()
        )))
    }
}
