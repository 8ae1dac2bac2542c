use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::app::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdbSettings {
    /// Path to the adb executable; empty means "adb" on PATH.
    pub command_path: String,
    /// Pass -r (replace existing app) to install / install-multiple.
    pub replace_existing: bool,
}

impl Default for AdbSettings {
    fn default() -> Self {
        Self {
            command_path: String::new(),
            replace_existing: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingSettings {
    pub log_level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub adb: AdbSettings,
    pub logging: LoggingSettings,
}

pub fn config_file_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("droidbridge").join("config.json"))
}

/// Missing or unreadable config means defaults; a present but malformed file
/// is surfaced so a typo does not silently reset every setting.
pub fn load_config_from(path: &Path) -> Result<AppConfig, AppError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(AppConfig::default())
        }
        Err(err) => {
            return Err(AppError::system(
                format!("Failed to read config: {err}"),
                "config",
            ))
        }
    };
    serde_json::from_str(&raw)
        .map_err(|err| AppError::validation(format!("Invalid config file: {err}"), "config"))
}

pub fn load_config() -> Result<AppConfig, AppError> {
    match config_file_path() {
        Some(path) => load_config_from(&path),
        None => Ok(AppConfig::default()),
    }
}

pub fn save_config_to(config: &AppConfig, path: &Path) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| {
            AppError::system(format!("Failed to create config dir: {err}"), "config")
        })?;
    }
    let raw = serde_json::to_string_pretty(config)
        .map_err(|err| AppError::system(format!("Failed to encode config: {err}"), "config"))?;
    fs::write(path, raw)
        .map_err(|err| AppError::system(format!("Failed to write config: {err}"), "config"))
}

pub fn save_config(config: &AppConfig) -> Result<(), AppError> {
    let path = config_file_path()
        .ok_or_else(|| AppError::system("No config directory available", "config"))?;
    save_config_to(config, &path)
}
