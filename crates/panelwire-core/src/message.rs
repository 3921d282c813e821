//! Wire messages.
//!
//! Outbound frames are a small closed set and are modelled as a tagged enum.
//! Inbound frames are best-effort: anything the backend pushes is accepted,
//! and only the `event` discriminant is inspected.

use crate::WorkItemId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reserved inbound discriminants.
pub struct ServerEvent;

impl ServerEvent {
    /// The generated asset bundle for a work item is ready.
    pub const COMIC_IMAGES: &'static str = "createdComicImages";
    /// The tag catalog for a work item is ready.
    pub const COMIC_TAGS: &'static str = "createdComicTags";
}

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Bind this connection to a work item so its push events are routed here.
    RegisterClient(WorkItemId),
}

/// Classification of an inbound message by its discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// `createdComicImages`
    ComicImages,
    /// `createdComicTags`
    ComicTags,
    /// Any other discriminant; opaque to the core.
    Other,
    /// Not JSON, or JSON without a string `event` field.
    Unclassified,
}

/// A frame received from the server.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Text that parsed as JSON.
    Json(serde_json::Value),
    /// Text that did not parse, kept verbatim.
    Raw(String),
}

impl InboundMessage {
    /// Parse inbound text, degrading to [`InboundMessage::Raw`] on failure.
    pub fn parse(text: &str) -> Self {
        match serde_json::from_str(text) {
            Ok(value) => Self::Json(value),
            Err(_) => Self::Raw(text.to_string()),
        }
    }

    /// The `event` discriminant, if this is a JSON object carrying one.
    pub fn event(&self) -> Option<&str> {
        match self {
            Self::Json(value) => value.get("event").and_then(|e| e.as_str()),
            Self::Raw(_) => None,
        }
    }

    /// The `data` payload, if present.
    pub fn data(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(value) => value.get("data"),
            Self::Raw(_) => None,
        }
    }

    pub fn kind(&self) -> EventKind {
        match self.event() {
            Some(ServerEvent::COMIC_IMAGES) => EventKind::ComicImages,
            Some(ServerEvent::COMIC_TAGS) => EventKind::ComicTags,
            Some(_) => EventKind::Other,
            None => EventKind::Unclassified,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Raw(_) => None,
        }
    }

    pub fn as_raw(&self) -> Option<&str> {
        match self {
            Self::Json(_) => None,
            Self::Raw(text) => Some(text),
        }
    }
}

impl fmt::Display for InboundMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(value) => write!(f, "{value}"),
            Self::Raw(text) => f.write_str(text),
        }
    }
}
