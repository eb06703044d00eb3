// src/fetch/mod.rs

//! Network acquisition of release artifacts
//!
//! - [`DownloadClient`]: streamed, cancellable single-URL downloads
//! - [`ResilientFetcher`]: mirror fallback and latency ranking
//! - [`ReleaseCatalogClient`]: release listing with a local fallback

mod client;
mod mirror;
pub mod releases;

pub use client::{DownloadClient, ProgressFn, no_progress};
pub use mirror::{MirrorSource, ResilientFetcher, mirrors_from};
pub use releases::{
    CI_TAG, CatalogSource, ReleaseCatalog, ReleaseCatalogClient, ReleaseChannel, ReleaseInfo,
    ReleaseKind,
};
