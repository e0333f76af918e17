//! Configuration
//!
//! Layered with the `config` crate: built-in defaults, the global file
//! (`$XDG_CONFIG_HOME/repodata-overlay/config.toml`), an optional explicit
//! file, then `REPODATA_OVERLAY__*` environment variables.

pub mod cache_paths;
pub mod facade;
pub mod merge;
pub mod paths;
pub mod sources;

pub use cache_paths::CacheConfig;
pub use facade::ConfigLoader;
pub use paths::xdg_root as xdg;

use crate::error::ApiError;
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OverlayConfig {
    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl OverlayConfig {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.cache.max_overlay_bytes == 0 {
            return Err(ApiError::ConfigError(
                "cache.max_overlay_bytes must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
