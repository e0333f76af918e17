//! ConfigLoader facade delegating to merge service.

use super::merge::service::MergeService;
use super::OverlayConfig;
use crate::error::ApiError;
use std::path::Path;

/// Configuration loader facade.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from the global file and environment.
    pub fn load() -> Result<OverlayConfig, ApiError> {
        let config = MergeService::load()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> Result<OverlayConfig, ApiError> {
        let config = MergeService::load_from_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` when given, otherwise from the standard sources.
    pub fn load_optional(path: Option<&Path>) -> Result<OverlayConfig, ApiError> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => Self::load(),
        }
    }
}
