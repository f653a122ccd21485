//! Server configuration.

use crate::registry::HostReconnectPolicy;
use derive_getters::Getters;
use derive_more::{Display, Error};
use derive_setters::Setters;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, instrument};

/// Settings for `simulturn serve`.
///
/// Every field has a default, so a TOML file only needs the values it
/// changes. Command-line flags are applied on top with the `with_*`
/// setters.
#[derive(Debug, Clone, PartialEq, Eq, Getters, Setters, Serialize, Deserialize)]
#[setters(prefix = "with_")]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind.
    bind_host: String,

    /// TCP port to bind.
    port: u16,

    /// SQLite database path. `None` keeps everything in memory.
    database: Option<String>,

    /// What happens when a second host connects to a game.
    host_reconnect: HostReconnectPolicy,

    /// Number of cells on each board.
    board_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_host: "127.0.0.1".to_string(),
            port: 3000,
            database: Some("simulturn.db".to_string()),
            host_reconnect: HostReconnectPolicy::default(),
            board_size: 9,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a TOML file.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        debug!("Loading config from file");
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("Failed to read config file: {}", e)))?;
        let config = Self::from_toml(&content)?;
        info!(port = config.port, "Config loaded successfully");
        Ok(config)
    }

    /// Parses configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ConfigError::new(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks values serde cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.board_size == 0 {
            return Err(ConfigError::new("board_size must be at least 1".to_string()));
        }
        Ok(())
    }

    /// `host:port` to bind.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }
}

/// Configuration error.
#[derive(Debug, Clone, Display, Error)]
#[display("Config error: {} at {}:{}", message, file, line)]
pub struct ConfigError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(message: String) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message,
            line: loc.line(),
            file: loc.file(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = ServerConfig::from_toml(
            r#"
            port = 8080
            host_reconnect = "reject"
            "#,
        )
        .expect("valid config");
        assert_eq!(*config.port(), 8080);
        assert_eq!(*config.host_reconnect(), HostReconnectPolicy::Reject);
        assert_eq!(config.bind_host(), "127.0.0.1");
        assert_eq!(*config.board_size(), 9);
    }

    #[test]
    fn test_zero_board_rejected() {
        let err = ServerConfig::from_toml("board_size = 0").expect_err("invalid");
        assert!(err.message.contains("board_size"));
    }

    #[test]
    fn test_setters_override() {
        let config = ServerConfig::default()
            .with_port(4000)
            .with_database(None);
        assert_eq!(config.bind_addr(), "127.0.0.1:4000");
        assert!(config.database().is_none());
    }
}
