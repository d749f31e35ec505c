//! Server configuration
//!
//! Manages server configuration settings, defaults, and validation.

use serde::Deserialize;
use std::path::Path;

use crate::error::InitError;

/// Fixed default applied when `max_clients` is configured as zero.
pub const DEFAULT_MAX_CLIENTS: usize = 64;

/// Server configuration structure
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Admission limit. Zero means "use the fixed default", never
    /// "unlimited".
    pub max_clients: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            max_clients: DEFAULT_MAX_CLIENTS,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a file, applying defaults for missing
    /// fields and normalizing the result.
    pub fn load(path: &Path) -> Result<Self, InitError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .build()
            .map_err(|e| InitError::Config(e.to_string()))?;

        let cfg: ServerConfig = settings
            .try_deserialize()
            .map_err(|e| InitError::Config(e.to_string()))?;
        Ok(cfg.normalized())
    }

    /// Maps a zero `max_clients` to the fixed default.
    pub fn normalized(mut self) -> Self {
        if self.max_clients == 0 {
            self.max_clients = DEFAULT_MAX_CLIENTS;
        }
        self
    }

    /// The listen endpoint as `host:port`.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn defaults_are_sane() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.max_clients, DEFAULT_MAX_CLIENTS);
        assert_eq!(cfg.endpoint(), "127.0.0.1:8080");
    }

    #[test]
    fn zero_max_clients_maps_to_default() {
        let cfg = ServerConfig {
            max_clients: 0,
            ..ServerConfig::default()
        }
        .normalized();
        assert_eq!(cfg.max_clients, DEFAULT_MAX_CLIENTS);
    }

    #[test]
    fn loads_from_file_with_partial_settings() {
        let path = std::env::temp_dir().join(format!("ws-relay-cfg-{}.toml", std::process::id()));
        fs::write(&path, "port = 9001\nmax_clients = 0\n").unwrap();

        let cfg = ServerConfig::load(&path).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(cfg.port, 9001);
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.max_clients, DEFAULT_MAX_CLIENTS);
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let result = ServerConfig::load(Path::new("/nonexistent/ws-relay.toml"));
        assert!(matches!(result, Err(InitError::Config(_))));
    }
}
