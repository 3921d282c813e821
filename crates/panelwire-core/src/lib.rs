//! Core types for panelwire.
//!
//! This crate provides the protocol primitives shared by the connection
//! manager and the backends it talks to: lifecycle status, close codes,
//! configuration, and the inbound/outbound frame shapes. It does no I/O.

mod comic;
mod config;
mod message;
mod notification;
mod work_item;

pub use comic::{Chat, Comic, ComicTag, Tag};
pub use config::{ClientConfig, ConfigError, ReconnectPolicy, Timeouts};
pub use message::{ClientMessage, EventKind, InboundMessage, ServerEvent};
pub use notification::{Notification, NotificationVariant};
pub use work_item::{WorkItemId, WorkItemIdError};

use serde::{Deserialize, Serialize};
use std::fmt;

/// WebSocket close code for a deliberate, normal closure.
///
/// This is the only code that suppresses automatic reconnection.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Close code reported when the transport ends without a close frame,
/// including failures to establish the connection at all.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Connection lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// No connection attempt has been made yet.
    Uninstantiated,
    /// An open attempt is in flight.
    Connecting,
    /// Handshake completed; frames may be sent.
    Open,
    /// Graceful shutdown requested, waiting for the transport to end.
    Closing,
    /// The transport has ended, gracefully or not.
    Closed,
}

impl ConnectionStatus {
    /// Lowercase wire name (`uninstantiated`, `connecting`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninstantiated => "uninstantiated",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }

    /// Short human-readable label for status indicators.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Open => "Connected",
            Self::Connecting => "Connecting...",
            Self::Closed => "Disconnected (click to reconnect)",
            Self::Closing => "Disconnecting...",
            Self::Uninstantiated => "Not connected",
        }
    }

    /// Whether a transport exists that is attempting or holding a connection.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Connecting | Self::Open)
    }

    /// Whether moving from `self` to `next` is a legal lifecycle edge.
    pub fn can_transition_to(&self, next: ConnectionStatus) -> bool {
        use ConnectionStatus::*;
        matches!(
            (self, next),
            (Uninstantiated, Connecting)
                | (Connecting, Open)
                | (Connecting, Closing)
                | (Connecting, Closed)
                | (Open, Closing)
                | (Open, Closed)
                | (Closing, Closed)
                | (Closed, Connecting)
        )
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
