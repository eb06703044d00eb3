// src/system/terminator.rs

//! Background loop that keeps the target process from holding the container
//!
//! The target application restarts itself, so a single kill is not enough.
//! The loop kills it every interval until stopped. Stopping sends a signal
//! over a channel and waits a bounded time for the thread to exit.

use super::SystemOps;
use crate::error::{Error, Result};
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Lower bound for the shutdown wait
const MIN_STOP_WAIT: Duration = Duration::from_secs(1);

/// Handle on a running terminator loop; stops on drop
pub struct ProcessTerminator {
    process_name: String,
    interval: Duration,
    stop_tx: Option<Sender<()>>,
    done_rx: Option<mpsc::Receiver<()>>,
    handle: Option<JoinHandle<u64>>,
}

impl ProcessTerminator {
    /// Start killing `process_name` every `interval`
    pub fn start(ops: Arc<dyn SystemOps>, process_name: &str, interval: Duration) -> Result<Self> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let (done_tx, done_rx) = mpsc::channel::<()>();
        let name = process_name.to_string();

        let handle = thread::Builder::new()
            .name("process-terminator".to_string())
            .spawn(move || {
                let mut kills = 0u64;
                loop {
                    match ops.kill_process(&name) {
                        Ok(true) => {
                            kills += 1;
                            debug!("Terminated {}", name);
                        }
                        Ok(false) => {}
                        Err(e) => debug!("Terminate {} failed: {}", name, e),
                    }
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                let _ = done_tx.send(());
                kills
            })
            .map_err(|e| Error::InitError(format!("Failed to start terminator thread: {e}")))?;

        info!(
            "Started terminating {} every {} ms",
            process_name,
            interval.as_millis()
        );
        Ok(Self {
            process_name: process_name.to_string(),
            interval,
            stop_tx: Some(stop_tx),
            done_rx: Some(done_rx),
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal the loop and wait a bounded time for it to exit
    ///
    /// Returns true if the thread exited within the wait. Calling it again
    /// after the first stop does nothing.
    pub fn stop(&mut self) -> bool {
        let Some(stop_tx) = self.stop_tx.take() else {
            return true;
        };
        let _ = stop_tx.send(());

        let wait = (self.interval * 4).max(MIN_STOP_WAIT);
        let exited = match self.done_rx.take() {
            Some(done_rx) => !matches!(done_rx.recv_timeout(wait), Err(RecvTimeoutError::Timeout)),
            None => true,
        };

        if exited {
            if let Some(handle) = self.handle.take() {
                match handle.join() {
                    Ok(kills) => info!(
                        "Stopped terminating {} ({} kills)",
                        self.process_name, kills
                    ),
                    Err(_) => warn!("Terminator thread for {} panicked", self.process_name),
                }
            }
        } else {
            warn!(
                "Terminator for {} did not stop within {:?}, detaching",
                self.process_name, wait
            );
            self.handle.take();
        }
        exited
    }
}

impl Drop for ProcessTerminator {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingOps {
        kills: AtomicUsize,
    }

    impl SystemOps for CountingOps {
        fn kill_process(&self, _image_name: &str) -> Result<bool> {
            self.kills.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        }

        fn unload_filter(&self, _filter_name: &str) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_terminator_repeats_until_stopped() {
        let ops = Arc::new(CountingOps {
            kills: AtomicUsize::new(0),
        });
        let mut terminator =
            ProcessTerminator::start(ops.clone(), "target.exe", Duration::from_millis(10)).unwrap();
        thread::sleep(Duration::from_millis(80));
        assert!(terminator.is_running());
        assert!(terminator.stop());
        assert!(!terminator.is_running());

        let after_stop = ops.kills.load(Ordering::SeqCst);
        assert!(after_stop >= 2);
        thread::sleep(Duration::from_millis(40));
        assert_eq!(ops.kills.load(Ordering::SeqCst), after_stop);
        assert!(terminator.stop());
    }

    #[test]
    fn test_drop_stops_loop() {
        let ops = Arc::new(CountingOps {
            kills: AtomicUsize::new(0),
        });
        let terminator =
            ProcessTerminator::start(ops.clone(), "target.exe", Duration::from_millis(10)).unwrap();
        drop(terminator);
        let count = ops.kills.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(40));
        assert_eq!(ops.kills.load(Ordering::SeqCst), count);
    }
}
