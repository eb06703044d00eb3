// src/progress.rs

//! Observer interface for pipeline progress
//!
//! Pipelines report through [`InstallObserver`]. Implementations:
//! - `SilentObserver`: no-op for scripted use
//! - `LogObserver`: forwards everything to tracing
//! - `CallbackObserver`: hands [`ObserverEvent`]s to a closure, for GUI
//!   front ends that marshal onto their own thread
//!
//! Callbacks run on the pipeline's worker thread.

use std::path::PathBuf;
use tracing::{error, info, warn};

/// Severity attached to a progress step
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warn,
    Error,
}

/// Receives progress from a running pipeline
pub trait InstallObserver: Send + Sync {
    /// Overall percentage and the current step
    fn progress(&self, percent: u8, step: &str, severity: Option<Severity>);

    /// Free-form status line
    fn status(&self, text: &str);

    /// Final result
    fn completed(&self, success: bool, message: &str);

    /// Ask for the target directory when discovery failed
    ///
    /// Only called in interactive mode. `None` means the user gave up.
    fn prompt_target_dir(&self) -> Option<PathBuf> {
        None
    }
}

/// Observer that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentObserver;

impl InstallObserver for SilentObserver {
    fn progress(&self, _percent: u8, _step: &str, _severity: Option<Severity>) {}
    fn status(&self, _text: &str) {}
    fn completed(&self, _success: bool, _message: &str) {}
}

/// Observer that logs through tracing
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl InstallObserver for LogObserver {
    fn progress(&self, percent: u8, step: &str, severity: Option<Severity>) {
        match severity {
            Some(Severity::Warn) => warn!("[{:>3}%] {}", percent, step),
            Some(Severity::Error) => error!("[{:>3}%] {}", percent, step),
            _ => info!("[{:>3}%] {}", percent, step),
        }
    }

    fn status(&self, text: &str) {
        info!("{}", text);
    }

    fn completed(&self, success: bool, message: &str) {
        if success {
            info!("Completed: {}", message);
        } else {
            error!("Failed: {}", message);
        }
    }
}

/// Events emitted by [`CallbackObserver`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObserverEvent {
    Progress {
        percent: u8,
        step: String,
        severity: Option<Severity>,
    },
    Status(String),
    Completed {
        success: bool,
        message: String,
    },
}

/// Observer that forwards events to a closure
pub struct CallbackObserver<F>
where
    F: Fn(ObserverEvent) + Send + Sync,
{
    callback: F,
}

impl<F> CallbackObserver<F>
where
    F: Fn(ObserverEvent) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> InstallObserver for CallbackObserver<F>
where
    F: Fn(ObserverEvent) + Send + Sync,
{
    fn progress(&self, percent: u8, step: &str, severity: Option<Severity>) {
        (self.callback)(ObserverEvent::Progress {
            percent,
            step: step.to_string(),
            severity,
        });
    }

    fn status(&self, text: &str) {
        (self.callback)(ObserverEvent::Status(text.to_string()));
    }

    fn completed(&self, success: bool, message: &str) {
        (self.callback)(ObserverEvent::Completed {
            success,
            message: message.to_string(),
        });
    }
}
