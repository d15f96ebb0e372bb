//! Configuration paths
//!
//! Uses the directories crate for platform-appropriate locations:
//! - Linux: `~/.config/widgeteer/`
//! - macOS: `~/Library/Application Support/widgeteer/`
//! - Windows: `%APPDATA%\widgeteer\`

use std::path::PathBuf;

/// Application name used for config directories
const APP_NAME: &str = "widgeteer";

/// Environment variable that overrides the config file location
pub const CONFIG_ENV: &str = "WIDGETEER_CONFIG";

/// Get the configuration directory path
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the configuration file
///
/// `WIDGETEER_CONFIG` takes precedence over the platform default.
pub fn config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    config_dir().map(|dir| dir.join("config.toml"))
}
