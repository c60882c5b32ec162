//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::normalize::{normalize_with, NormalizeError, NormalizeOptions};
use crate::config::schema::{FriendlyConfig, NormalizedConfig};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Toml(toml::de::Error),
    Json(serde_json::Error),
    Validation(Vec<ValidationError>),
    Normalize(NormalizeError),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Toml(e) => write!(f, "Parse error: {}", e),
            ConfigError::Json(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
            ConfigError::Normalize(e) => write!(f, "Normalization failed: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<NormalizeError> for ConfigError {
    fn from(e: NormalizeError) -> Self {
        ConfigError::Normalize(e)
    }
}

/// Parse configuration text. JSON when `json` is set, TOML otherwise.
pub fn parse_config(content: &str, json: bool) -> Result<FriendlyConfig, ConfigError> {
    let config: FriendlyConfig = if json {
        serde_json::from_str(content).map_err(ConfigError::Json)?
    } else {
        toml::from_str(content).map_err(ConfigError::Toml)?
    };

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Load and validate configuration from a TOML or JSON file.
pub fn load_config(path: &Path) -> Result<FriendlyConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    let json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    parse_config(&content, json)
}

/// Load, validate and normalize in one step.
pub fn load_normalized(path: &Path, options: &NormalizeOptions) -> Result<NormalizedConfig, ConfigError> {
    let config = load_config(path)?;
    Ok(normalize_with(&config, options)?)
}
