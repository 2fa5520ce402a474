//! Configuration loading for replay runs.
//!
//! Configuration is an explicit value handed to the pipeline. It is read from
//! a camelCase JSON document (optionally nested under a `"replay"` key),
//! merged over defaults and validated.

pub mod schema;

pub use schema::{ProxyAddress, ReplayConfig};

use log::debug;
use serde_json::Value;
use std::fmt;
use std::fs;
use std::path::Path;

/// Errors that can occur while loading configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// IO error occurred while reading the configuration file
    IoError(String),

    /// Failed to parse the configuration document
    ParseError(String),

    /// The configuration parsed but a setting is out of range
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(msg) => write!(f, "IO error: {}", msg),
            ConfigError::ParseError(msg) => write!(f, "Failed to parse configuration: {}", msg),
            ConfigError::Invalid(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

/// Loads configuration from a JSON value.
///
/// Reads the `"replay"` object when present, otherwise the value itself,
/// merges it with defaults and validates the result.
///
/// # Arguments
///
/// * `settings_json` - Optional JSON value containing user settings
///
/// # Returns
///
/// `Ok(ReplayConfig)` with the loaded configuration, or `Err` if the settings
/// do not parse or fail validation.
///
/// # Example
///
/// ```
/// use collection_replay::config::load_config;
/// use serde_json::json;
///
/// let settings = json!({
///     "replay": {
///         "proxyPort": 8090,
///         "verifySsl": true
///     }
/// });
///
/// let config = load_config(Some(settings)).unwrap();
/// assert_eq!(config.proxy_port, 8090);
/// ```
pub fn load_config(settings_json: Option<Value>) -> Result<ReplayConfig, ConfigError> {
    let mut config = ReplayConfig::default();

    if let Some(settings) = settings_json {
        let settings = match settings.get("replay") {
            Some(nested) => nested.clone(),
            None => settings,
        };
        let user_config: ReplayConfig = serde_json::from_value(settings)?;
        config = config.merge(&user_config);
    }

    config.validate().map_err(ConfigError::Invalid)?;
    Ok(config)
}

/// Loads configuration from a JSON file.
///
/// A missing file yields the defaults; an unreadable or malformed file is an
/// error.
pub fn load_config_file(path: &Path) -> Result<ReplayConfig, ConfigError> {
    if !path.exists() {
        debug!("No configuration at {}, using defaults", path.display());
        return load_config(None);
    }

    let content = fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&content)?;
    load_config(Some(value))
}
