//! Environment variable source: REPODATA_OVERLAY__ prefix with __ separator

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::ConfigError;
use config::Environment;

/// Prefix shared by every configuration variable
pub const ENV_PREFIX: &str = "REPODATA_OVERLAY";

/// Add environment variable overlay to builder.
/// `REPODATA_OVERLAY__CACHE__MAX_OVERLAY_BYTES=1048576` sets `cache.max_overlay_bytes`.
pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true),
    );
    Ok(builder)
}
