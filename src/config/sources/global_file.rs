//! Global config file source: `$XDG_CONFIG_HOME/repodata-overlay/config.toml`

use crate::config::xdg;
use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError, File, FileFormat};
use std::path::Path;

/// Add the global file, if present, to builder.
pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    match xdg::global_config_path() {
        Ok(path) => add_file(builder, &path, false),
        Err(e) => {
            tracing::debug!("Skipping global config file: {}", e);
            Ok(builder)
        }
    }
}

/// Add a TOML file to builder; a missing optional file is skipped.
pub fn add_file(
    builder: ConfigBuilder<DefaultState>,
    path: &Path,
    required: bool,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let name = path
        .to_str()
        .ok_or_else(|| ConfigError::Message(format!("Non UTF-8 config path: {:?}", path)))?;
    Ok(builder.add_source(File::new(name, FileFormat::Toml).required(required)))
}
