//! Repodata Patch Overlay
//!
//! Keeps a cached `repodata.json` current by applying JLAP patches to a
//! small copy-on-write overlay instead of rewriting the whole document.
//! Readers see baseline and overlay as one document through
//! [`views::OverlayView`].

pub mod baseline;
pub mod cache;
pub mod concurrency;
pub mod config;
pub mod error;
pub mod hasher;
pub mod jlap;
pub mod logging;
pub mod patch;
pub mod pointer;
pub mod state;
pub mod store;
pub mod tooling;
pub mod types;
pub mod views;

pub use cache::{ApplyOutcome, CacheHandle, Snapshot};
pub use error::{ApiError, PatchError, StorageError};
pub use state::Staleness;
