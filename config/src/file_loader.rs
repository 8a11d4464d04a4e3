//! # Configuration File Loading
//!
//! Loads configuration from TOML or YAML files.
//!
//! Supports automatic format detection based on file extension.

use crate::config::PosConfig;
use std::path::Path;

/// Configuration file loading error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    TomlParse(String),

    #[error("Failed to parse YAML: {0}")]
    YamlParse(String),

    #[error("Config file has no extension")]
    NoExtension,

    #[error("Unsupported config file format: {0}")]
    UnsupportedFormat(String),
}

/// Load configuration from a TOML file.
///
/// Missing sections and fields fall back to their defaults.
pub fn load_from_toml(path: &Path) -> Result<PosConfig, ConfigFileError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|_e| ConfigFileError::FileNotFound(path.display().to_string()))?;

    toml::from_str(&contents).map_err(|e| ConfigFileError::TomlParse(e.to_string()))
}

/// Load configuration from a YAML file.
pub fn load_from_yaml(path: &Path) -> Result<PosConfig, ConfigFileError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|_e| ConfigFileError::FileNotFound(path.display().to_string()))?;

    serde_yaml::from_str(&contents).map_err(|e| ConfigFileError::YamlParse(e.to_string()))
}

/// Load configuration from file, detecting the format from the extension.
///
/// ## Supported Formats
/// - `.toml`
/// - `.yaml` / `.yml`
pub fn load_from_file(path: &Path) -> Result<PosConfig, ConfigFileError> {
    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .ok_or(ConfigFileError::NoExtension)?;

    match extension.to_lowercase().as_str() {
        "toml" => load_from_toml(path),
        "yaml" | "yml" => load_from_yaml(path),
        other => Err(ConfigFileError::UnsupportedFormat(other.to_string())),
    }
}
