//! Configuration management

use crate::protocol::{DEFAULT_MAX_MESSAGE_SIZE, MAX_MESSAGE_SIZE};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default TCP port shared by server and client
pub const DEFAULT_PORT: u16 = 65432;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub history: HistoryConfig,
    pub client: ClientConfig,
}

/// Relay server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to listen on
    pub host: String,

    /// Port to listen on (0 picks a free port)
    pub port: u16,

    /// Outbound messages buffered per session before it is evicted
    pub conduit_capacity: usize,

    /// Seconds a new connection has to send its identity
    pub handshake_timeout_secs: u64,

    /// Largest accepted message payload in bytes
    pub max_message_size: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            conduit_capacity: 256,
            handshake_timeout_secs: 30,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl ServerConfig {
    /// `host:port` string suitable for binding
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }
}

/// Chat history settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// JSON-lines file to append history to (disabled when unset)
    pub path: Option<PathBuf>,

    /// Records buffered in memory before the oldest are dropped
    pub queue_capacity: usize,

    /// Attempts made to open the history file at startup
    pub open_retries: u32,

    /// Seconds between open attempts
    pub retry_delay_secs: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            path: None,
            queue_capacity: 1024,
            open_retries: 10,
            retry_delay_secs: 5,
        }
    }
}

impl HistoryConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

/// Terminal client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server host to connect to
    pub host: String,

    /// Server port to connect to
    pub port: u16,

    /// Connection attempts before giving up
    pub connect_retries: u32,

    /// Milliseconds between connection attempts
    pub retry_delay_millis: u64,

    /// Largest relayed frame accepted from the server in bytes
    pub max_message_size: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            connect_retries: 5,
            retry_delay_millis: 500,
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }
}

impl ClientConfig {
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_millis)
    }
}

impl Config {
    /// Load config from the default location, or return defaults if not found
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load config from `path`, or return defaults if it does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {:?}", path))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file {:?}", path))?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("relaychat")
            .join("config.toml")
    }
}
