//! XDG Base Directory locations for configuration and cache data.

use crate::error::ApiError;
use std::path::PathBuf;

const APP_DIR: &str = "repodata-overlay";

/// Get XDG config home directory
///
/// Returns `$XDG_CONFIG_HOME` if set, otherwise defaults to `$HOME/.config`
pub fn config_home() -> Result<PathBuf, ApiError> {
    env_dir("XDG_CONFIG_HOME", &[".config"])
}

/// Get XDG cache home directory
///
/// Returns `$XDG_CACHE_HOME` if set, otherwise defaults to `$HOME/.cache`
pub fn cache_home() -> Result<PathBuf, ApiError> {
    env_dir("XDG_CACHE_HOME", &[".cache"])
}

/// Global configuration file: `$XDG_CONFIG_HOME/repodata-overlay/config.toml`
pub fn global_config_path() -> Result<PathBuf, ApiError> {
    Ok(config_home()?.join(APP_DIR).join("config.toml"))
}

/// Default cache directory: `$XDG_CACHE_HOME/repodata-overlay`
pub fn cache_dir() -> Result<PathBuf, ApiError> {
    Ok(cache_home()?.join(APP_DIR))
}

fn env_dir(var: &str, home_relative: &[&str]) -> Result<PathBuf, ApiError> {
    if let Ok(dir) = std::env::var(var) {
        if !dir.is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }

    let home = std::env::var("HOME").map_err(|_| {
        ApiError::ConfigError(format!("Could not determine {} (HOME not set)", var))
    })?;
    let mut path = PathBuf::from(home);
    for part in home_relative {
        path.push(part);
    }
    Ok(path)
}
