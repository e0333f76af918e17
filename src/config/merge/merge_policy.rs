//! Built-in defaults, the lowest precedence layer.

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError};

/// Builder seeded with defaults matching `OverlayConfig::default()`.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("cache.max_overlay_bytes", 32_i64 * 1024 * 1024)?
        .set_default("cache.local_repodata_ttl_secs", 3600_i64)?
        .set_default("logging.enabled", true)?
        .set_default("logging.level", "info")?
        .set_default("logging.format", "text")?
        .set_default("logging.output", "stderr")?
        .set_default("logging.color", true)
}
