//! Backend configuration: dispatcher endpoint, framing limits, logging.

use serde::{Deserialize, Serialize};

/// Environment variable carrying the master-side dispatcher endpoint.
pub const ENDPOINT_ENV_VAR: &str = "FMUBRIDGE_DISPATCHER_ENDPOINT";

/// Environment variable overriding the tracing filter.
pub const LOG_ENV_VAR: &str = "FMUBRIDGE_LOG";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub channel: ChannelConfig,
    pub logging: LoggingConfig,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            channel: ChannelConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Endpoint of the wrapper's command socket, e.g. `127.0.0.1:7000`.
    pub endpoint: String,
    /// Upper bound on a single frame body; oversized frames are fatal.
    pub max_frame_bytes: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            endpoint: "127.0.0.1:0".to_string(),
            max_frame_bytes: 16 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Tracing filter directive, e.g. `info` or `fmubridge=debug`.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl BackendConfig {
    /// Apply environment overrides on top of a loaded or default config.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(endpoint) = std::env::var(ENDPOINT_ENV_VAR) {
            if !endpoint.is_empty() {
                self.channel.endpoint = endpoint;
            }
        }
        if let Ok(filter) = std::env::var(LOG_ENV_VAR) {
            if !filter.is_empty() {
                self.logging.filter = filter;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = BackendConfig::default();
        assert!(config.channel.max_frame_bytes >= 1024);
        assert_eq!(config.logging.filter, "info");
    }
}
