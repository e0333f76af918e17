//! MergeService: orchestrates sources, applies merge policy, deserializes to OverlayConfig.

use crate::config::sources::{environment, global_file};
use crate::config::OverlayConfig;
use config::ConfigError;
use std::path::Path;

use super::merge_policy;

/// Merge service for config composition.
pub struct MergeService;

impl MergeService {
    /// Load config from standard sources.
    /// Precedence: defaults (lowest) -> global file -> environment (highest).
    pub fn load() -> Result<OverlayConfig, ConfigError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = environment::add_to_builder(builder)?;

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load config from a specific file with environment overlay.
    /// The global file is not consulted.
    pub fn load_from_file(path: &Path) -> Result<OverlayConfig, ConfigError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_file(builder, path, true)?;
        let builder = environment::add_to_builder(builder)?;

        let config = builder.build()?;
        config.try_deserialize()
    }
}
