//! Server configuration.
//!
//! Every field is optional in the file; anything left out takes the default.
//!
//! ```toml
//! addr = "127.0.0.1:8080"
//! request_timeout_ms = 5000
//! shutdown_timeout_ms = 10000
//! shutdown_buffer = 1
//! ```

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::shutdown;

pub const DEFAULT_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 30_000;

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// `host:port` to listen on.
    pub addr: String,
    /// Per-request deadline. `None` means requests are only cancelled by the client.
    pub request_timeout_ms: Option<u64>,
    /// How long in-flight requests get to finish once shutdown starts.
    pub shutdown_timeout_ms: u64,
    /// Capacity of the shutdown channel.
    pub shutdown_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_owned(),
            request_timeout_ms: None,
            shutdown_timeout_ms: DEFAULT_SHUTDOWN_TIMEOUT_MS,
            shutdown_buffer: shutdown::DEFAULT_BUFFER,
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.socket_addr()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.addr.parse().map_err(|_| ConfigError::InvalidAddr(self.addr.clone()))
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = ServerConfig::from_toml_str("").unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.socket_addr().unwrap().port(), 3000);
        assert_eq!(config.request_timeout(), None);
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn reads_every_field() {
        let config = ServerConfig::from_toml_str(
            r#"
            addr = "127.0.0.1:8080"
            request_timeout_ms = 250
            shutdown_timeout_ms = 1000
            shutdown_buffer = 4
            "#,
        )
        .unwrap();

        assert_eq!(config.socket_addr().unwrap(), "127.0.0.1:8080".parse().unwrap());
        assert_eq!(config.request_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(1));
        assert_eq!(config.shutdown_buffer, 4);
    }

    #[test]
    fn rejects_bad_addr_and_unknown_keys() {
        assert!(matches!(
            ServerConfig::from_toml_str(r#"addr = "localhost""#),
            Err(ConfigError::InvalidAddr(addr)) if addr == "localhost"
        ));
        assert!(matches!(
            ServerConfig::from_toml_str("port = 80"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        assert!(matches!(
            ServerConfig::load("/nonexistent/kiln.toml"),
            Err(ConfigError::Io(_))
        ));
    }
}
