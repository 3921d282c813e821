//! Connection configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_RECONNECT_INTERVAL_MS: u64 = 5000;
const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_CLOSE_TIMEOUT_MS: u64 = 5000;

/// Configuration surface exposed to embedding code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// WebSocket endpoint (`ws://` or `wss://`).
    pub endpoint: String,
    /// Delay before each automatic reconnect.
    #[serde(default = "default_interval_ms")]
    pub reconnect_interval_ms: u64,
    /// Automatic reconnects allowed after consecutive abnormal closures.
    #[serde(default = "default_max_attempts")]
    pub max_reconnect_attempts: u32,
    /// Upper bound on the opening handshake.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// How long to wait for the peer to answer our close frame.
    #[serde(default = "default_close_timeout_ms")]
    pub close_timeout_ms: u64,
}

fn default_interval_ms() -> u64 {
    DEFAULT_RECONNECT_INTERVAL_MS
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_RECONNECT_ATTEMPTS
}

fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}

fn default_close_timeout_ms() -> u64 {
    DEFAULT_CLOSE_TIMEOUT_MS
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl ClientConfig {
    /// Config for `endpoint` with the default reconnect policy.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            reconnect_interval_ms: DEFAULT_RECONNECT_INTERVAL_MS,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            close_timeout_ms: DEFAULT_CLOSE_TIMEOUT_MS,
        }
    }

    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval_ms = millis(interval);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = millis(timeout);
        self
    }

    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout_ms = millis(timeout);
        self
    }

    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            interval: Duration::from_millis(self.reconnect_interval_ms),
            max_attempts: self.max_reconnect_attempts,
        }
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            connect: Duration::from_millis(self.connect_timeout_ms),
            close: Duration::from_millis(self.close_timeout_ms),
        }
    }

    /// Check that the endpoint looks like a WebSocket URL.
    ///
    /// The endpoint is used verbatim, so surrounding whitespace is rejected
    /// rather than trimmed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let endpoint = self.endpoint.as_str();
        if endpoint.trim().is_empty() {
            return Err(ConfigError::EmptyEndpoint);
        }
        if endpoint.trim() != endpoint {
            return Err(ConfigError::SurroundingWhitespace(endpoint.to_string()));
        }
        let (scheme, rest) = endpoint
            .split_once("://")
            .ok_or_else(|| ConfigError::MissingScheme(endpoint.to_string()))?;
        if !scheme.eq_ignore_ascii_case("ws") && !scheme.eq_ignore_ascii_case("wss") {
            return Err(ConfigError::UnsupportedScheme(scheme.to_string()));
        }
        if rest.is_empty() {
            return Err(ConfigError::MissingHost(endpoint.to_string()));
        }
        Ok(())
    }
}

/// Immutable retry policy consumed by the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_RECONNECT_INTERVAL_MS),
            max_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
        }
    }
}

/// Deadlines applied to a single transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Duration,
    pub close: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            close: Duration::from_millis(DEFAULT_CLOSE_TIMEOUT_MS),
        }
    }
}

/// Invalid configuration.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("endpoint cannot be empty")]
    EmptyEndpoint,
    #[error("endpoint has leading or trailing whitespace: {0:?}")]
    SurroundingWhitespace(String),
    #[error("endpoint must contain a scheme, got: {0}")]
    MissingScheme(String),
    #[error("unsupported endpoint scheme '{0}', expected ws or wss")]
    UnsupportedScheme(String),
    #[error("endpoint has no host: {0}")]
    MissingHost(String),
}
