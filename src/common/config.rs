//! Configuration file handling

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use super::paths::config_path;
use super::{Error, Result};

/// Main configuration structure
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Server connection settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Timeout settings
    #[serde(default)]
    pub timeouts: Timeouts,
}

/// Where the Widgeteer server listens
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Host name or address
    #[serde(default = "default_host")]
    pub host: String,

    /// WebSocket port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Opaque auth token, sent as `?token=` on the connection URL
    #[serde(default)]
    pub token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            token: None,
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    9000
}

impl ServerConfig {
    /// Build the WebSocket URL, percent-encoding the token if one is set
    pub fn url(&self) -> String {
        let mut url = format!("ws://{}:{}", self.host, self.port);
        if let Some(token) = self.token.as_deref().filter(|t| !t.is_empty()) {
            let encoded: String = url::form_urlencoded::byte_serialize(token.as_bytes()).collect();
            url.push_str("?token=");
            url.push_str(&encoded);
        }
        url
    }
}

/// Timeout settings
#[derive(Debug, Deserialize, Clone)]
pub struct Timeouts {
    /// Timeout for a single command or batch
    #[serde(default = "default_command")]
    pub command_secs: u64,

    /// Timeout for a whole transaction
    #[serde(default = "default_transaction")]
    pub transaction_secs: u64,

    /// How long to wait for the server to come up
    #[serde(default = "default_connect_wait")]
    pub connect_wait_secs: u64,

    /// Delay between readiness probes
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            command_secs: default_command(),
            transaction_secs: default_transaction(),
            connect_wait_secs: default_connect_wait(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

fn default_command() -> u64 {
    30
}
fn default_transaction() -> u64 {
    60
}
fn default_connect_wait() -> u64 {
    5
}
fn default_poll_interval() -> u64 {
    500
}

impl Timeouts {
    pub fn command(&self) -> Duration {
        Duration::from_secs(self.command_secs)
    }

    pub fn transaction(&self) -> Duration {
        Duration::from_secs(self.transaction_secs)
    }

    pub fn connect_wait(&self) -> Duration {
        Duration::from_secs(self.connect_wait_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        match config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::ConfigParse(e.to_string()))
    }
}
