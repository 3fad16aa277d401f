mod schema;

pub use schema::{Config, LogConfig, WinnersConfig};

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::Level;

/// Get the config directory path (~/.config/score-tally/)
pub fn get_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".config").join("score-tally"))
}

/// Get the default config file path (~/.config/score-tally/config.yaml)
pub fn get_config_path() -> Option<PathBuf> {
    get_config_dir().map(|dir| dir.join("config.yaml"))
}

/// Get the default state file path (~/.config/score-tally/state.json)
pub fn get_state_path() -> Option<PathBuf> {
    get_config_dir().map(|dir| dir.join("state.json"))
}

/// Load configuration from a YAML file
///
/// # Arguments
///
/// * `path` - Optional path to config file. If None, uses default path (~/.config/score-tally/config.yaml)
///
/// # Errors
///
/// Returns an error if:
/// - An explicitly given config file does not exist
/// - The config file cannot be read
/// - The YAML cannot be parsed
///
/// A missing default config file is not an error; defaults apply.
pub fn load_config(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("Config file not found at {}", path.display());
            }
            path
        }
        None => match get_config_path() {
            Some(path) if path.exists() => path,
            _ => return Ok(Config::default()),
        },
    };

    let config_content = fs::read_to_string(&config_path)
        .with_context(|| format!("Failed to read config file at {}", config_path.display()))?;

    let config: Config = serde_saphyr::from_str(&config_content)
        .with_context(|| format!("Failed to parse config: invalid YAML in {}", config_path.display()))?;

    Ok(config)
}

/// Validate configuration at startup.
/// Returns all validation errors at once (not just the first).
pub fn validate_config(config: &Config) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();

    if let Some(ref level) = config.log.level {
        if Level::from_str(level).is_err() {
            errors.push(format!(
                "log.level: invalid '{}' - expected trace, debug, info, warn or error",
                level
            ));
        }
    }

    if config.winners.count == 0 {
        errors.push("winners.count: must be at least 1".to_string());
    }

    if let Some(ref path) = config.state_path {
        if path.as_os_str().is_empty() {
            errors.push("state_path: must not be empty".to_string());
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Log level from config, `warn` when unset or invalid.
pub fn log_level(config: &Config) -> Level {
    config
        .log
        .level
        .as_deref()
        .and_then(|level| Level::from_str(level).ok())
        .unwrap_or(Level::WARN)
}

/// State file from config, falling back to the default location.
pub fn state_path(config: &Config) -> Option<PathBuf> {
    config.state_path.clone().or_else(get_state_path)
}
