//! Configuration loading

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

pub const APP_NAME: &str = "razer-device-core";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Device catalog file or directory. The built-in catalog is used
    /// when unset.
    #[serde(default)]
    pub catalog: Option<PathBuf>,
    /// Refresh calls closer together than this are dropped
    #[serde(default = "default_refresh_throttle_ms")]
    pub refresh_throttle_ms: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Poll interval for `--watch`
    #[serde(default = "default_watch_interval_secs")]
    pub watch_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            catalog: None,
            refresh_throttle_ms: default_refresh_throttle_ms(),
            log_level: default_log_level(),
            watch_interval_secs: default_watch_interval_secs(),
        }
    }
}

fn default_refresh_throttle_ms() -> u64 {
    2000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_watch_interval_secs() -> u64 {
    5
}

impl Config {
    pub fn refresh_throttle(&self) -> Duration {
        Duration::from_millis(self.refresh_throttle_ms)
    }

    /// Never zero; tokio intervals reject a zero period.
    pub fn watch_interval(&self) -> Duration {
        Duration::from_secs(self.watch_interval_secs.max(1))
    }

    /// `<config dir>/razer-device-core/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_NAME).join("config.json"))
    }
}

/// Load configuration from a JSON file. A missing file yields defaults.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        debug!("Config file not found at {:?}, using defaults", path);
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&content)?;
    info!("Loaded config from {:?}", path);
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("absent.json")).unwrap();

        assert_eq!(config, Config::default());
        assert_eq!(config.refresh_throttle(), Duration::from_millis(2000));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"catalog": "/etc/razer/devices", "log_level": "debug"}"#).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.catalog, Some(PathBuf::from("/etc/razer/devices")));
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.refresh_throttle_ms, 2000);
        assert_eq!(config.watch_interval_secs, 5);
    }

    #[test]
    fn test_zero_watch_interval_is_clamped() {
        let config = Config {
            watch_interval_secs: 0,
            ..Config::default()
        };
        assert_eq!(config.watch_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "refresh_throttle_ms = 5").unwrap();

        assert!(matches!(load_config(&path), Err(ConfigError::ParseError(_))));
    }
}
