//! Client configuration.

use std::time::Duration;

/// Configuration for a single-connection client.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP target host.
    pub host: String,
    /// TCP target port.
    pub port: u16,
    /// Connect timeout, also applied to socket writes.
    pub timeout: Duration,
    /// Logical database to SELECT after connect. Replayed on reconnect.
    pub db: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: "localhost".to_string(),
            port: 6379,
            timeout: Duration::from_millis(500),
            db: 0,
        }
    }
}

impl Config {
    /// Configuration for the given host and port with default timeouts.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Config {
            host: host.into(),
            port,
            ..Config::default()
        }
    }
}
