// src/pipeline/controller.rs

//! Runs a pipeline on its own worker thread

use super::{InstallOutcome, InstallPipeline, PipelineEnv, UninstallPipeline};
use crate::config::{InstallOptions, UninstallOptions};
use crate::error::{Error, Result};
use crate::session::{CancelToken, InstallSession};
use std::thread::{self, JoinHandle};
use tracing::debug;

/// Handle to a pipeline running on a worker thread
pub struct OperationHandle<T> {
    cancel: CancelToken,
    handle: JoinHandle<T>,
}

impl<T> OperationHandle<T> {
    /// Request cooperative cancellation; the run stops at its next state transition
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the worker to finish
    pub fn join(self) -> Result<T> {
        self.handle
            .join()
            .map_err(|_| Error::InitError("pipeline worker panicked".to_string()))
    }
}

/// Starts install and uninstall runs
pub struct OperationController {
    env: PipelineEnv,
}

impl OperationController {
    pub fn new(env: PipelineEnv) -> Self {
        Self { env }
    }

    pub fn env(&self) -> &PipelineEnv {
        &self.env
    }

    /// Start an install on a worker thread
    ///
    /// Fails with [`Error::SessionBusy`] when another operation is active.
    pub fn spawn_install(&self, options: InstallOptions) -> Result<OperationHandle<InstallOutcome>> {
        let pipeline = InstallPipeline::new(self.env.clone(), options);
        let cancel = pipeline.cancel_token();
        self.spawn("aura-install", cancel, move || pipeline.run())
    }

    /// Start an uninstall on a worker thread
    pub fn spawn_uninstall(
        &self,
        options: UninstallOptions,
    ) -> Result<OperationHandle<InstallOutcome>> {
        let pipeline = UninstallPipeline::new(self.env.clone(), options);
        let cancel = pipeline.cancel_token();
        self.spawn("aura-uninstall", cancel, move || pipeline.run())
    }

    fn spawn<F>(&self, name: &str, cancel: CancelToken, work: F) -> Result<OperationHandle<InstallOutcome>>
    where
        F: FnOnce() -> InstallOutcome + Send + 'static,
    {
        // The run claims the session itself; this only fails fast
        if InstallSession::is_active() {
            return Err(Error::SessionBusy);
        }
        debug!("Spawning {} worker", name);
        let handle = thread::Builder::new().name(name.to_string()).spawn(work)?;
        Ok(OperationHandle { cancel, handle })
    }
}
