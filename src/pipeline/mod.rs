// src/pipeline/mod.rs

//! Install and uninstall pipelines
//!
//! A pipeline runs on one worker thread from start to finish. It claims the
//! process-wide session, walks its states in order, checks for cancellation
//! at every transition, and always stops the background terminator and
//! removes its scratch directory before reporting an [`InstallOutcome`].

mod controller;
mod install;
mod state;
mod uninstall;

pub use controller::{OperationController, OperationHandle};
pub use install::{InstallPipeline, payload_beside, resolve_target_dir};
pub use state::PipelineState;
pub use uninstall::{
    InstallationStatus, UninstallPipeline, find_original_backup, installation_status,
    original_backup_names,
};

use crate::config::Settings;
use crate::error::{Error, OutcomeCode, Result};
use crate::progress::{InstallObserver, LogObserver, Severity};
use crate::session::{CancelToken, InstallSession};
use crate::system::{CommandOps, ProcessTerminator, SystemOps};
use crate::version_store::{JsonVersionStore, VersionStore};
use serde::Serialize;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Slice used when sleeping with cancellation checks
const SETTLE_SLICE: Duration = Duration::from_millis(50);

/// Collaborators a pipeline runs against
#[derive(Clone)]
pub struct PipelineEnv {
    pub settings: Settings,
    pub system: Arc<dyn SystemOps>,
    pub versions: Arc<dyn VersionStore>,
    pub observer: Arc<dyn InstallObserver>,
}

impl PipelineEnv {
    /// Real commands, JSON version store, log observer
    pub fn new(settings: Settings) -> Self {
        let system = Arc::new(CommandOps::new(settings.command_timeout()));
        let versions = Arc::new(JsonVersionStore::new(&settings.paths.state_file));
        Self {
            settings,
            system,
            versions,
            observer: Arc::new(LogObserver),
        }
    }

    pub fn with_system(mut self, system: Arc<dyn SystemOps>) -> Self {
        self.system = system;
        self
    }

    pub fn with_versions(mut self, versions: Arc<dyn VersionStore>) -> Self {
        self.versions = versions;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn InstallObserver>) -> Self {
        self.observer = observer;
        self
    }
}

/// Result of a pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct InstallOutcome {
    pub success: bool,
    /// Terminal state
    #[serde(serialize_with = "serialize_display")]
    pub state: PipelineState,
    /// Last non-terminal state entered
    #[serde(serialize_with = "serialize_display")]
    pub last_step: PipelineState,
    #[serde(serialize_with = "serialize_display")]
    pub exit_code: OutcomeCode,
    /// Stable detail code for localization
    pub error_code: Option<String>,
    pub error_detail: Option<String>,
    pub installed_version: Option<String>,
    pub backup_id: Option<String>,
    /// Scratch directory kept by a dry run
    pub scratch_dir: Option<std::path::PathBuf>,
}

fn serialize_display<T: std::fmt::Display, S: serde::Serializer>(
    value: &T,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

impl InstallOutcome {
    fn success(last_step: PipelineState) -> Self {
        Self {
            success: true,
            state: PipelineState::Completed,
            last_step,
            exit_code: OutcomeCode::Success,
            error_code: None,
            error_detail: None,
            installed_version: None,
            backup_id: None,
            scratch_dir: None,
        }
    }

    /// Outcome for an error raised while in `last_step`
    pub fn from_error(last_step: PipelineState, error: &Error) -> Self {
        let state = if error.is_cancelled() {
            PipelineState::Cancelled
        } else {
            PipelineState::Failed
        };
        Self {
            success: false,
            state,
            last_step,
            exit_code: error.outcome(),
            error_code: Some(error.detail_code().to_string()),
            error_detail: Some(error.to_string()),
            installed_version: None,
            backup_id: None,
            scratch_dir: None,
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.exit_code.as_i32()
    }

    /// Localized failure message, if the run failed
    pub fn message(&self) -> Option<String> {
        let code = self.error_code.as_deref()?;
        let raw = self.error_detail.as_deref().unwrap_or(code);
        Some(crate::error::localize(code, raw).into_owned())
    }
}

/// Per-run bookkeeping shared by both pipelines
pub(crate) struct Run<'a> {
    env: &'a PipelineEnv,
    session: InstallSession,
    terminator: Option<ProcessTerminator>,
}

impl<'a> Run<'a> {
    pub(crate) fn begin(
        env: &'a PipelineEnv,
        kind: crate::session::SessionKind,
        cancel: CancelToken,
    ) -> Result<Self> {
        let session =
            InstallSession::begin_locked(kind, cancel, Some(env.settings.paths.lock_file.as_path()))?;
        Ok(Self {
            env,
            session,
            terminator: None,
        })
    }

    pub(crate) fn cancel(&self) -> &CancelToken {
        self.session.cancel_token()
    }

    /// Transition to `state`, failing with `Cancelled` if cancellation was requested
    pub(crate) fn enter(&mut self, state: PipelineState, text: &str) -> Result<()> {
        self.enter_at(state, state.percent(), text)
    }

    /// Like [`Run::enter`] with an explicit progress percentage
    pub(crate) fn enter_at(&mut self, state: PipelineState, percent: u8, text: &str) -> Result<()> {
        self.session.cancel_token().check()?;
        debug!("{} -> {}", self.session.state, state);
        self.session.state = state;
        self.session.progress_percent = percent;
        self.session.current_step_text = text.to_string();
        info!("{}", text);
        self.env.observer.progress(percent, text, None);
        Ok(())
    }

    /// Surface a best-effort failure without leaving the current step
    pub(crate) fn warn_step(&self, text: &str) {
        warn!("{}", text);
        self.env
            .observer
            .progress(self.session.progress_percent, text, Some(Severity::Warn));
    }

    pub(crate) fn status(&self, text: &str) {
        self.env.observer.status(text);
    }

    /// Start the terminator loop and give the target time to exit
    pub(crate) fn start_terminator(&mut self) -> Result<()> {
        let settings = &self.env.settings;
        let terminator = ProcessTerminator::start(
            self.env.system.clone(),
            &settings.target.process_name,
            settings.kill_interval(),
        )?;
        self.terminator = Some(terminator);
        self.settle(settings.kill_settle())
    }

    pub(crate) fn stop_terminator(&mut self) {
        if let Some(mut terminator) = self.terminator.take()
            && !terminator.stop()
        {
            warn!("Process terminator did not shut down cleanly");
        }
    }

    /// Sleep for `duration`, waking early on cancellation
    pub(crate) fn settle(&self, duration: Duration) -> Result<()> {
        let deadline = Instant::now() + duration;
        loop {
            self.cancel().check()?;
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            thread::sleep(SETTLE_SLICE.min(deadline - now));
        }
    }

    /// Stop background work and report the terminal state
    pub(crate) fn finish(mut self, result: Result<InstallOutcome>, done_text: &str) -> InstallOutcome {
        self.stop_terminator();
        let last_step = self.session.state;

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                if e.is_cancelled() {
                    warn!("Cancelled during {}", last_step);
                } else {
                    tracing::error!("Failed during {}: {}", last_step, e);
                }
                InstallOutcome::from_error(last_step, &e)
            }
        };

        self.session.state = outcome.state;
        self.session.progress_percent = 100;
        let (text, severity) = match outcome.state {
            PipelineState::Completed => (done_text.to_string(), Severity::Success),
            PipelineState::Cancelled => ("Operation cancelled".to_string(), Severity::Warn),
            _ => (
                format!("Failed: {}", outcome.message().unwrap_or_default()),
                Severity::Error,
            ),
        };
        self.env.observer.progress(100, &text, Some(severity));
        self.env.observer.completed(outcome.success, &text);
        outcome
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::progress::SilentObserver;
    use crate::version_store::MemoryVersionStore;
    use std::path::Path;
    use std::sync::Mutex;

    /// Records every call instead of touching the system
    #[derive(Default)]
    pub(crate) struct FakeSystem {
        pub(crate) calls: Mutex<Vec<String>>,
        pub(crate) fail_filter: bool,
    }

    impl SystemOps for FakeSystem {
        fn kill_process(&self, image_name: &str) -> Result<bool> {
            self.calls.lock().unwrap().push(format!("kill {image_name}"));
            Ok(false)
        }

        fn unload_filter(&self, filter_name: &str) -> Result<()> {
            self.calls.lock().unwrap().push(format!("unload {filter_name}"));
            if self.fail_filter {
                return Err(Error::IoError(format!("{filter_name} is busy")));
            }
            Ok(())
        }
    }

    /// Environment rooted in `root` with fakes and fast timings
    pub(crate) fn env(root: &Path) -> (PipelineEnv, Arc<FakeSystem>, Arc<MemoryVersionStore>) {
        let mut settings = Settings::default();
        settings.paths.temp_dir = root.join("tmp");
        settings.paths.data_dir = root.join("data");
        settings.paths.backup_dir = root.join("backups");
        settings.paths.state_file = root.join("state/version.json");
        settings.paths.lock_file = root.join("state/install.lock");
        settings.target.target_glob = root.join("nowhere/*").display().to_string();
        settings.install.kill_interval_ms = 10;
        settings.install.kill_settle_ms = 0;
        settings.install.delete_retry_attempts = 2;
        settings.install.delete_retry_delay_ms = 1;

        let system = Arc::new(FakeSystem::default());
        let versions = Arc::new(MemoryVersionStore::default());
        let env = PipelineEnv::new(settings)
            .with_system(system.clone())
            .with_versions(versions.clone())
            .with_observer(Arc::new(SilentObserver));
        (env, system, versions)
    }
}
