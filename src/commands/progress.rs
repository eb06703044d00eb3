// src/commands/progress.rs
//! Terminal progress display for install and uninstall runs
//!
//! Shows an overall percentage bar with a status spinner below it. Pipeline
//! callbacks arrive on the worker thread; indicatif bars are safe to update
//! from there.

use aura_install::progress::{InstallObserver, Severity};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

/// indicatif-backed pipeline observer
pub struct ProgressObserver {
    multi: MultiProgress,
    overall: ProgressBar,
    status: ProgressBar,
    interactive: bool,
}

impl ProgressObserver {
    /// Create the bars
    ///
    /// # Arguments
    /// * `operation` - Shown left of the bar until the first step arrives
    /// * `interactive` - Whether `prompt_target_dir` may read from stdin
    pub fn new(operation: &str, interactive: bool) -> Self {
        let multi = MultiProgress::new();

        let overall = ProgressBar::new(100);
        overall.set_style(
            ProgressStyle::default_bar()
                .template("{msg} [{bar:40.green/dim}] {percent}%")
                .expect("Invalid progress bar template")
                .progress_chars("##-"),
        );
        overall.set_message(operation.to_string());

        let status = ProgressBar::new_spinner();
        status.set_style(
            ProgressStyle::default_spinner()
                .template("  {spinner:.cyan} {msg}")
                .expect("Invalid spinner template"),
        );
        status.enable_steady_tick(Duration::from_millis(100));

        let overall = multi.add(overall);
        let status = multi.add(status);

        Self {
            multi,
            overall,
            status,
            interactive,
        }
    }
}

impl InstallObserver for ProgressObserver {
    fn progress(&self, percent: u8, step: &str, severity: Option<Severity>) {
        self.overall.set_position(u64::from(percent.min(100)));
        match severity {
            None | Some(Severity::Info) => self.overall.set_message(step.to_string()),
            Some(Severity::Success) => self.status.set_message(format!("{step} [done]")),
            Some(Severity::Warn) => self.status.set_message(format!("{step} [warning]")),
            Some(Severity::Error) => self.status.set_message(format!("{step} [FAILED]")),
        }
    }

    fn status(&self, text: &str) {
        self.status.set_message(text.to_string());
    }

    fn completed(&self, success: bool, message: &str) {
        self.status.finish_and_clear();
        if success {
            self.overall.finish_with_message(message.to_string());
        } else {
            self.overall.abandon_with_message(message.to_string());
        }
    }

    fn prompt_target_dir(&self) -> Option<PathBuf> {
        if !self.interactive {
            return None;
        }
        self.multi.suspend(|| {
            print!("Target installation not found. Enter its resources directory (empty to abort): ");
            io::stdout().flush().ok()?;
            let mut line = String::new();
            io::stdin().lock().read_line(&mut line).ok()?;
            let line = line.trim().trim_matches('"');
            (!line.is_empty()).then(|| PathBuf::from(line))
        })
    }
}
