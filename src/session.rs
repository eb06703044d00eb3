// src/session.rs

//! Operation sessions and cooperative cancellation
//!
//! Only one install or uninstall may run in a process at a time. A session
//! claims a process-wide flag when it begins and releases it on drop; a
//! second [`InstallSession::begin`] while one is active fails with
//! [`Error::SessionBusy`]. When a lock path is given the session also holds
//! an exclusive file lock so two installer processes cannot overlap either.

use crate::error::{Error, Result};
use crate::pipeline::PipelineState;
use crate::system::lock::InstallLock;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Set while a session is alive
static SESSION_ACTIVE: AtomicBool = AtomicBool::new(false);

/// Shared cancel flag, checked at defined suspension points
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Error::Cancelled)` once cancellation was requested
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Which operation a session runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum SessionKind {
    Install,
    Uninstall,
    Restore,
}

/// Releases the process-wide flag on drop
#[derive(Debug)]
struct SessionGuard;

impl SessionGuard {
    fn acquire() -> Result<Self> {
        SESSION_ACTIVE
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| SessionGuard)
            .map_err(|_| Error::SessionBusy)
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        SESSION_ACTIVE.store(false, Ordering::SeqCst);
    }
}

/// State of the one running operation
#[derive(Debug)]
pub struct InstallSession {
    pub kind: SessionKind,
    pub state: PipelineState,
    pub progress_percent: u8,
    pub current_step_text: String,
    cancel: CancelToken,
    _lock: Option<InstallLock>,
    _guard: SessionGuard,
}

impl InstallSession {
    /// Claim the process-wide session slot
    pub fn begin(kind: SessionKind, cancel: CancelToken) -> Result<Self> {
        Self::begin_locked(kind, cancel, None)
    }

    /// Claim the slot and, if `lock_path` is given, the cross-process lock
    pub fn begin_locked(
        kind: SessionKind,
        cancel: CancelToken,
        lock_path: Option<&Path>,
    ) -> Result<Self> {
        let guard = SessionGuard::acquire()?;
        let lock = match lock_path {
            Some(path) => Some(InstallLock::try_acquire(path)?.ok_or(Error::SessionBusy)?),
            None => None,
        };
        debug!("{} session started", kind);

        Ok(Self {
            kind,
            state: PipelineState::Idle,
            progress_percent: 0,
            current_step_text: String::new(),
            cancel,
            _lock: lock,
            _guard: guard,
        })
    }

    /// True while any session is alive in this process
    pub fn is_active() -> bool {
        SESSION_ACTIVE.load(Ordering::SeqCst)
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn cancel_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn request_cancel(&self) {
        self.cancel.cancel();
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(token.check().is_ok());
        clone.cancel();
        assert!(token.is_cancelled());
        assert!(matches!(token.check(), Err(Error::Cancelled)));
    }

    #[test]
    fn test_single_session() {
        let _serial = test_support::serial();
        let first = InstallSession::begin(SessionKind::Install, CancelToken::new()).unwrap();
        assert!(InstallSession::is_active());
        let second = InstallSession::begin(SessionKind::Uninstall, CancelToken::new());
        assert!(matches!(second, Err(Error::SessionBusy)));
        drop(first);
        assert!(!InstallSession::is_active());
        let third = InstallSession::begin(SessionKind::Uninstall, CancelToken::new()).unwrap();
        assert_eq!(third.state, PipelineState::Idle);
    }

    #[test]
    fn test_file_lock_excludes_second_holder() {
        let _serial = test_support::serial();
        let tmp = tempfile::tempdir().unwrap();
        let lock_path = tmp.path().join("install.lock");
        let held = InstallLock::try_acquire(&lock_path).unwrap().unwrap();
        let session =
            InstallSession::begin_locked(SessionKind::Install, CancelToken::new(), Some(&lock_path));
        assert!(matches!(session, Err(Error::SessionBusy)));
        assert!(!InstallSession::is_active());
        drop(held);
        assert!(
            InstallSession::begin_locked(SessionKind::Install, CancelToken::new(), Some(&lock_path))
                .is_ok()
        );
    }
}
