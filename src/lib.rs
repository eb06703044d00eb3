// src/lib.rs

//! HugoAura installer
//!
//! Patches the target Electron application's package and installs the
//! HugoAura overlay next to it.
//!
//! # Architecture
//!
//! - `archive`: asar container codec (decode to a tree, encode a tree back)
//! - `patch`: idempotent source rewrites applied to the decoded tree
//! - `fetch`: multi-mirror downloads and the release catalog
//! - `backup`: zip snapshots with hash manifests, verify, restore, retention
//! - `pipeline`: install and uninstall state machines on a worker thread
//! - `system`: process termination, filter driver control, target discovery

pub mod archive;
pub mod backup;
pub mod compression;
pub mod config;
mod error;
pub mod fetch;
pub mod filesystem;
pub mod hash;
pub mod patch;
pub mod pipeline;
pub mod progress;
pub mod session;
pub mod system;
pub mod version_store;

pub use config::{InstallOptions, Settings, SourceSpec, UninstallOptions};
pub use error::{Error, OutcomeCode, Result, localize};
pub use pipeline::{InstallOutcome, InstallPipeline, OperationController, PipelineState, UninstallPipeline};
pub use progress::{CallbackObserver, InstallObserver, LogObserver, ObserverEvent, Severity, SilentObserver};
