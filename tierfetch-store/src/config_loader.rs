//! YAML configuration loading.

use std::path::{Path, PathBuf};
use tracing::{debug, info};

use tierfetch_core::Config;

use crate::error::StoreError;
use crate::persistence::default_config_path;

/// Loads and validates configuration from the default path.
pub fn load_config() -> Result<Config, StoreError> {
    load_config_from(&default_config_path())
}

/// Loads and validates configuration from a specific path.
///
/// A missing file yields the defaults. Missing keys take their defaults
/// and unknown keys are ignored.
pub fn load_config_from(path: &Path) -> Result<Config, StoreError> {
    let config = if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config = parse_config(&content)?;
        info!(path = %path.display(), "Loaded configuration");
        config
    } else {
        info!(path = %path.display(), "Config file not found, using defaults");
        Config::default()
    };

    config.validate()?;
    Ok(config)
}

/// Loads from `path` when given, otherwise from the default path.
pub fn load_config_or_default_path(path: Option<&Path>) -> Result<Config, StoreError> {
    match path {
        Some(path) => load_config_from(path),
        None => load_config(),
    }
}

/// Parses YAML text into a configuration without validating it.
pub fn parse_config(content: &str) -> Result<Config, StoreError> {
    // An empty YAML document is null, not an empty mapping.
    if content.trim().is_empty() {
        debug!("Empty config document, using defaults");
        return Ok(Config::default());
    }
    Ok(serde_yaml::from_str(content)?)
}

/// Renders a configuration as YAML.
pub fn render_config(config: &Config) -> Result<String, StoreError> {
    Ok(serde_yaml::to_string(config)?)
}

/// Returns the path a config would be loaded from.
pub fn resolve_config_path(path: Option<&Path>) -> PathBuf {
    path.map_or_else(default_config_path, Path::to_path_buf)
}
