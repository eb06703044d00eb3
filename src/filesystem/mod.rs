// src/filesystem/mod.rs

//! Filesystem helpers shared by the codec, backup store and pipelines
//!
//! This module provides:
//! - Path sanitization for names read from container headers
//! - Cross-volume file and directory moves
//! - Recursive overlay copies
//! - The bounded retry used to delete a container held open by the target

pub mod ops;
pub mod path;

pub use ops::{copy_dir_all, move_dir, move_file_atomic, remove_file_with_retry, remove_path};
pub use path::{safe_join, sanitize_relative, sanitize_segment};
