//! Error types for the client.

use panelwire_core::ConfigError;
use tokio_tungstenite::tungstenite;

/// Errors surfaced to code embedding the connection manager.
///
/// Runtime failures of the connection itself are never returned here; they
/// are logged and recovered from by the reconnect policy.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("no tokio runtime is running; create the connection manager inside one")]
    NoRuntime,
    #[error("connection manager has shut down")]
    Shutdown,
    #[error("payload does not have the expected shape: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Failures of the underlying transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error("handshake did not complete within {0:?}")]
    HandshakeTimeout(std::time::Duration),
    #[error("transport closed")]
    Closed,
}
