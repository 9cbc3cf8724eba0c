//! File-based configuration loading

use std::fs;
use std::path::Path;

use super::model::TrellisConfig;
use crate::error::{TrellisError, TrellisResult};

/// Load configuration from a file
///
/// Supports JSON, TOML, and YAML formats based on file extension.
/// Returns default config if file doesn't exist.
pub fn load_from_file(path: &Path) -> TrellisResult<TrellisConfig> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        return Ok(TrellisConfig::default());
    }

    let content = fs::read_to_string(path).map_err(|e| {
        TrellisError::config_with_context(
            format!("Failed to read config file: {}", e),
            format!("Reading configuration from '{}'", path.display()),
        )
    })?;

    parse(&content, path)
}

/// Load, then validate
pub fn load_and_validate(path: &Path) -> TrellisResult<TrellisConfig> {
    let config = load_from_file(path)?;
    config.validate()?;
    Ok(config)
}

fn parse(content: &str, path: &Path) -> TrellisResult<TrellisConfig> {
    let (format, result) = match path.extension().and_then(|s| s.to_str()) {
        Some("toml") => ("TOML", toml::from_str(content).map_err(|e| e.to_string())),
        Some("yaml") | Some("yml") => (
            "YAML",
            serde_yaml::from_str(content).map_err(|e| e.to_string()),
        ),
        _ => (
            "JSON",
            serde_json::from_str(content).map_err(|e| e.to_string()),
        ),
    };

    result.map_err(|e| {
        TrellisError::config_with_context(
            format!("Failed to parse {} config: {}", format, e),
            format!("Deserializing {} configuration from '{}'", format, path.display()),
        )
    })
}
