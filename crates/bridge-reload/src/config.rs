//! Reload session settings.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable that overrides the configured endpoint.
pub const ENDPOINT_ENV: &str = "BRIDGE_RELOAD_ENDPOINT";

/// Where to find the VM service and how long to keep trying.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReloadConfig {
    /// WebSocket URL of the VM service.
    pub endpoint: String,

    /// Connection attempts before giving up.
    pub max_attempts: u32,

    /// Fixed delay between attempts, in milliseconds.
    pub retry_delay_ms: u64,
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://127.0.0.1:5858/ws".to_string(),
            max_attempts: 60,
            retry_delay_ms: 2000,
        }
    }
}

impl ReloadConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Apply `BRIDGE_RELOAD_ENDPOINT` if it is set and non-empty.
    pub fn with_env_override(self) -> Self {
        let endpoint = std::env::var(ENDPOINT_ENV).ok();
        self.with_endpoint_override(endpoint)
    }

    fn with_endpoint_override(mut self, endpoint: Option<String>) -> Self {
        if let Some(endpoint) = endpoint.filter(|e| !e.trim().is_empty()) {
            self.endpoint = endpoint;
        }
        self
    }
}

/// Whether `endpoint` looks like a WebSocket URL with a host.
pub fn is_valid_endpoint(endpoint: &str) -> bool {
    let rest = endpoint
        .strip_prefix("ws://")
        .or_else(|| endpoint.strip_prefix("wss://"));
    match rest {
        Some(rest) => rest
            .split('/')
            .next()
            .is_some_and(|authority| !authority.is_empty()),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ReloadConfig::default();
        assert_eq!(config.endpoint, "ws://127.0.0.1:5858/ws");
        assert_eq!(config.max_attempts, 60);
        assert_eq!(config.retry_delay(), Duration::from_secs(2));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: ReloadConfig = serde_json::from_str(r#"{ "max_attempts": 5 }"#).unwrap();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.retry_delay_ms, 2000);
    }

    #[test]
    fn test_endpoint_override() {
        let config = ReloadConfig::default()
            .with_endpoint_override(Some("ws://10.0.0.2:8181/ws".to_string()));
        assert_eq!(config.endpoint, "ws://10.0.0.2:8181/ws");

        let config = ReloadConfig::default().with_endpoint_override(Some("  ".to_string()));
        assert_eq!(config.endpoint, "ws://127.0.0.1:5858/ws");
    }

    #[test]
    fn test_endpoint_validation() {
        assert!(is_valid_endpoint("ws://127.0.0.1:5858/ws"));
        assert!(is_valid_endpoint("wss://vm.local"));
        assert!(!is_valid_endpoint("http://127.0.0.1:5858/ws"));
        assert!(!is_valid_endpoint("ws:///ws"));
        assert!(!is_valid_endpoint("127.0.0.1:5858"));
    }
}
