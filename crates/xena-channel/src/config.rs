//! Connection and channel configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};
use xena_protocol::DEFAULT_PORT;

/// Default connect and read timeout
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;

/// Default keepalive period
pub const DEFAULT_KEEPALIVE_INTERVAL_MS: u64 = 10_000;

/// Where and how to reach one chassis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Host name or IP address
    pub host: String,
    /// TCP port
    pub port: u16,
    /// Connect and per-read timeout in milliseconds
    pub timeout_ms: u64,
}

impl ConnectionConfig {
    /// Configuration for `host` with default port and timeout
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    /// Connect and per-read timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// `host:port` form used for resolution and logging
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

/// Command channel settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub connection: ConnectionConfig,
    /// Keepalive period in milliseconds; zero disables the keepalive task
    pub keepalive_interval_ms: u64,
}

impl ChannelConfig {
    /// Keepalive period, if enabled
    pub fn keepalive_interval(&self) -> Option<Duration> {
        (self.keepalive_interval_ms > 0).then(|| Duration::from_millis(self.keepalive_interval_ms))
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            keepalive_interval_ms: DEFAULT_KEEPALIVE_INTERVAL_MS,
        }
    }
}
