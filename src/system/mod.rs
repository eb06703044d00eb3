// src/system/mod.rs

//! Operating-system collaborators of the pipelines
//!
//! Killing the target process and unloading its filter driver go through
//! the [`SystemOps`] trait so pipelines can run against a fake in tests.
//! [`CommandOps`] is the real implementation, shelling out to `taskkill`
//! and `fltmc` on Windows.

mod command;
mod locate;
pub mod lock;
mod terminator;

pub use command::CommandOps;
pub use locate::{detect_target_version, locate_target};
pub use lock::InstallLock;
pub use terminator::ProcessTerminator;

use crate::Result;

/// Process and driver control used while an install is running
pub trait SystemOps: Send + Sync {
    /// Force-terminate every process with this image name
    ///
    /// Returns `Ok(true)` if a process was terminated, `Ok(false)` if none
    /// was running.
    fn kill_process(&self, image_name: &str) -> Result<bool>;

    /// Unload a filesystem minifilter
    fn unload_filter(&self, filter_name: &str) -> Result<()>;
}
