//! Scoring config file loading and serialization.

use super::ScoringConfig;
use crate::error::ConfigError;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigFormat {
    Toml,
    Json,
}

/// Default user override: ~/.config/corebench/scoring.toml
pub fn default_scoring_config_path() -> Result<PathBuf, ConfigError> {
    let config_dir = dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
        .ok_or_else(|| {
            ConfigError::ValidationFailed("Cannot determine home directory".to_string())
        })?;

    Ok(config_dir.join("corebench").join("scoring.toml"))
}

/// Validate config path (.toml or .json extension required).
pub fn validate_config_path(path: &Path) -> Result<(), ConfigError> {
    format_of(path).map(|_| ())
}

fn format_of(path: &Path) -> Result<ConfigFormat, ConfigError> {
    if path.as_os_str().is_empty() {
        return Err(ConfigError::ValidationFailed(
            "Configuration path cannot be empty".to_string(),
        ));
    }

    match path.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => Ok(ConfigFormat::Toml),
        Some("json") => Ok(ConfigFormat::Json),
        Some(other) => Err(ConfigError::UnsupportedFormat(format!(
            "expected .toml or .json, got .{}",
            other
        ))),
        None => Err(ConfigError::UnsupportedFormat(
            "configuration file needs a .toml or .json extension".to_string(),
        )),
    }
}

/// Load and validate a scoring config.
pub fn load_scoring_config(path: &Path) -> Result<ScoringConfig, ConfigError> {
    let format = format_of(path)?;

    let content = fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ConfigError::FileNotFound(path.display().to_string())
        } else {
            ConfigError::IoError(e)
        }
    })?;

    let config = match format {
        ConfigFormat::Toml => ScoringConfig::from_toml_str(&content)?,
        ConfigFormat::Json => ScoringConfig::from_json_str(&content)?,
    };

    log::info!(
        "[CONFIG] Loaded scoring reference {} from {}",
        config.version,
        path.display()
    );
    Ok(config)
}

/// Write a scoring config, format chosen by extension. Invalid configs are refused.
pub fn save_scoring_config(config: &ScoringConfig, path: &Path) -> Result<(), ConfigError> {
    let format = format_of(path)?;
    config.validate()?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let content = match format {
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
    };
    fs::write(path, content)?;
    Ok(())
}

/// Explicit path if given, else the user override if present, else the shipped reference.
pub fn load_or_builtin(explicit: Option<&Path>) -> Result<ScoringConfig, ConfigError> {
    if let Some(path) = explicit {
        return load_scoring_config(path);
    }

    match default_scoring_config_path() {
        Ok(path) if path.is_file() => load_scoring_config(&path),
        _ => {
            log::debug!("[CONFIG] Using built-in scoring reference");
            ScoringConfig::builtin()
        }
    }
}
