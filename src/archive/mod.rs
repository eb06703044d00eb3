// src/archive/mod.rs

//! Codec for the asar resource container
//!
//! A container is a pickle-framed JSON header describing an entry tree
//! followed by a payload section addressed by byte offset. Files marked
//! `unpacked` live beside the container under `<container>.unpacked/`.
//!
//! Decoding materializes the tree on disk; encoding walks a directory and
//! writes a fresh container. Decoding an encoded tree reproduces the bytes
//! of every file, though offsets and header layout may differ from the
//! original container.

mod decode;
mod encode;
pub mod header;

pub use decode::{Archive, ExtractReport, SkippedEntry, decode};
pub use encode::{EncodeReport, encode};
pub use header::{ContainerHeader, Entry, FileEntry, Integrity};
