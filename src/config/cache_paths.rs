//! CacheConfig and cache file locations.

use crate::config::xdg;
use crate::error::ApiError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

fn default_max_overlay_bytes() -> usize {
    32 * 1024 * 1024
}

fn default_ttl_secs() -> u64 {
    3600
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory holding repodata caches; None means `$XDG_CACHE_HOME/repodata-overlay`
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    /// Overlay size above which patching gives up and a full download is requested
    #[serde(default = "default_max_overlay_bytes")]
    pub max_overlay_bytes: usize,

    /// Seconds a cache entry is considered fresh without asking the server
    #[serde(default = "default_ttl_secs")]
    pub local_repodata_ttl_secs: u64,
}

impl CacheConfig {
    /// Resolve the cache directory to an actual filesystem location.
    pub fn resolve_cache_dir(&self) -> Result<PathBuf, ApiError> {
        match &self.cache_dir {
            Some(dir) => Ok(dir.clone()),
            None => xdg::cache_dir(),
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.local_repodata_ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            max_overlay_bytes: default_max_overlay_bytes(),
            local_repodata_ttl_secs: default_ttl_secs(),
        }
    }
}

/// Files making up one cache entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePaths {
    /// Baseline `repodata.json`
    pub json: PathBuf,
    /// Provenance sidecar
    pub state: PathBuf,
    /// Overlay side file
    pub overlay: PathBuf,
}

impl CachePaths {
    /// Paths for cache entry `name` (a file stem such as `09cdf8bf`) under `dir`
    pub fn new(dir: &Path, name: &str) -> Self {
        Self {
            json: dir.join(format!("{name}.json")),
            state: dir.join(format!("{name}.info.json")),
            overlay: dir.join(format!("{name}.overlay.json")),
        }
    }
}
