//! Configuration loading for the service binary.
//!
//! The YAML file path comes from `CONFIG_FILE` (default `config.yaml`).
//! Unknown source names and out-of-range fields are startup errors.

use std::collections::BTreeMap;

use thiserror::Error;

use pricefeed_types::{AppConfig, ConfigError, SourceConfig, SourceName};

/// Error raised while loading the config file.
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    /// The file could not be read.
    #[error("cannot read config file {path}: {source}")]
    Io {
        /// Path that failed.
        path: String,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// The file is not valid YAML for the expected shape.
    #[error("cannot parse config file {path}: {source}")]
    Parse {
        /// Path that failed.
        path: String,
        /// Underlying YAML error.
        source: serde_yaml::Error,
    },
    /// The file parsed but holds invalid values.
    #[error(transparent)]
    Invalid(#[from] ConfigError),
}

/// Load and validate the application config.
///
/// # Errors
/// IO, parse, or validation failures; all are startup-fatal.
pub fn load() -> Result<(AppConfig, BTreeMap<SourceName, SourceConfig>), ConfigLoadError> {
    let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.yaml".to_owned());
    load_from(&path)
}

/// Load and validate a config file at `path`.
///
/// # Errors
/// IO, parse, or validation failures; all are startup-fatal.
pub fn load_from(
    path: &str,
) -> Result<(AppConfig, BTreeMap<SourceName, SourceConfig>), ConfigLoadError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
        path: path.to_owned(),
        source,
    })?;
    let cfg: AppConfig = serde_yaml::from_str(&text).map_err(|source| ConfigLoadError::Parse {
        path: path.to_owned(),
        source,
    })?;
    let sources = cfg.resolve_sources()?;
    Ok((cfg, sources))
}
