//! Configuration file loading and management
//!
//! This module handles loading and parsing the bridge configuration from
//! `$XDG_CONFIG_HOME/hostbridge/config.toml`. If the configuration file doesn't
//! exist, a default configuration is created with documented comments.

use anyhow::{Context, Result};
use bridge_reload::{is_valid_endpoint, ReloadConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main bridge configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BridgeConfig {
    /// Reference host settings
    #[serde(default)]
    pub host: HostConfig,
    /// VM service reload settings
    #[serde(default)]
    pub reload: ReloadConfig,
}

/// Reference host configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HostConfig {
    /// Log level (trace, debug, info, warn, error)
    /// Default: "info"
    pub log_level: String,
    /// Interval between host ticks, in milliseconds
    /// Default: 50
    pub tick_interval_ms: u64,
    /// How long scripts may register objects before the host registry seals
    /// Default: 5000
    pub startup_window_ms: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            tick_interval_ms: 50,
            startup_window_ms: 5000,
        }
    }
}

impl HostConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn startup_window(&self) -> Duration {
        Duration::from_millis(self.startup_window_ms)
    }
}

impl BridgeConfig {
    /// Load configuration from the specified path
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: BridgeConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the default XDG config location
    ///
    /// If the configuration file doesn't exist, creates a default configuration
    /// file with documented comments.
    pub fn load_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if !config_path.exists() {
            Self::create_default_file(&config_path)?;
        }

        Self::load(&config_path)
    }

    /// Returns `$XDG_CONFIG_HOME/hostbridge/config.toml`
    pub fn default_config_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("", "", "hostbridge")
            .context("Failed to determine project directories")?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    fn create_default_file(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, Self::default_config_content())
            .with_context(|| format!("Failed to write default config file: {}", path.display()))?;

        tracing::info!("Created default configuration file at: {}", path.display());
        Ok(())
    }

    fn default_config_content() -> String {
        r#"# Host bridge configuration

[host]
# Log level: trace, debug, info, warn, error
# Default: "info"
log_level = "info"

# Milliseconds between host ticks
# Default: 50
tick_interval_ms = 50

# Milliseconds scripts have to register objects before the host
# object registry is sealed
# Default: 5000
startup_window_ms = 5000

[reload]
# WebSocket endpoint of the script VM's service protocol
# Overridden by the BRIDGE_RELOAD_ENDPOINT environment variable
# Default: "ws://127.0.0.1:5858/ws"
endpoint = "ws://127.0.0.1:5858/ws"

# Connection attempts before giving up
# Default: 60
max_attempts = 60

# Milliseconds to wait between attempts
# Default: 2000
retry_delay_ms = 2000
"#
        .to_string()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.host.log_level.as_str()) {
            anyhow::bail!(
                "Invalid log_level: {}. Must be one of: {}",
                self.host.log_level,
                valid_log_levels.join(", ")
            );
        }

        if self.host.tick_interval_ms == 0 {
            anyhow::bail!("host.tick_interval_ms must be greater than 0");
        }

        if self.reload.max_attempts == 0 {
            anyhow::bail!("reload.max_attempts must be greater than 0");
        }

        if !is_valid_endpoint(&self.reload.endpoint) {
            anyhow::bail!(
                "Invalid reload.endpoint: {}. Expected ws:// or wss:// URL",
                self.reload.endpoint
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(content.as_bytes()).unwrap();
        temp_file
    }

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert_eq!(config.host.log_level, "info");
        assert_eq!(config.host.tick_interval(), Duration::from_millis(50));
        assert_eq!(config.host.startup_window(), Duration::from_secs(5));
        assert_eq!(config.reload.endpoint, "ws://127.0.0.1:5858/ws");
        assert_eq!(config.reload.max_attempts, 60);
    }

    #[test]
    fn test_default_content_parses() {
        let config: BridgeConfig = toml::from_str(&BridgeConfig::default_config_content()).unwrap();
        assert_eq!(config, BridgeConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_valid_config() {
        let file = write_config(
            r#"
[host]
log_level = "debug"
tick_interval_ms = 20
startup_window_ms = 100

[reload]
endpoint = "ws://10.0.0.5:8181/ws"
max_attempts = 3
retry_delay_ms = 250
"#,
        );

        let config = BridgeConfig::load(file.path()).unwrap();
        assert_eq!(config.host.log_level, "debug");
        assert_eq!(config.host.tick_interval_ms, 20);
        assert_eq!(config.reload.endpoint, "ws://10.0.0.5:8181/ws");
        assert_eq!(config.reload.retry_delay(), Duration::from_millis(250));
    }

    #[test]
    fn test_load_partial_config() {
        let file = write_config(
            r#"
[reload]
max_attempts = 5
"#,
        );

        let config = BridgeConfig::load(file.path()).unwrap();
        assert_eq!(config.host, HostConfig::default());
        assert_eq!(config.reload.max_attempts, 5);
        assert_eq!(config.reload.retry_delay_ms, 2000);
    }

    #[test]
    fn test_load_rejects_garbage() {
        let file = write_config("host = [");
        assert!(BridgeConfig::load(file.path()).is_err());
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = BridgeConfig::default();
        config.host.log_level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_tick_interval() {
        let mut config = BridgeConfig::default();
        config.host.tick_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_attempts() {
        let mut config = BridgeConfig::default();
        config.reload.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_bad_endpoint() {
        let mut config = BridgeConfig::default();
        config.reload.endpoint = "http://127.0.0.1:5858".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_config_path() {
        let path = BridgeConfig::default_config_path().unwrap();
        assert!(path.to_string_lossy().contains("hostbridge"));
        assert!(path.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn test_config_roundtrip() {
        let mut config = BridgeConfig::default();
        config.host.log_level = "warn".to_string();
        config.reload.retry_delay_ms = 10;

        let toml_str = toml::to_string(&config).unwrap();
        let deserialized: BridgeConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(config, deserialized);
    }
}
