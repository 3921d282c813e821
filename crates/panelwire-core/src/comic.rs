//! Domain payloads carried by the reserved push events.
//!
//! The connection manager never validates these shapes; consumers decode a
//! classified payload into them before use.

use serde::{Deserialize, Serialize};

/// A generated comic, as carried by `createdComicImages`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Comic {
    pub id: String,
    pub tone: String,
    pub difficulty: String,
    pub topic: String,
    /// Image URLs, in panel order.
    pub images: Vec<String>,
    pub tags: Vec<Tag>,
    pub chats: Vec<Chat>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tag {
    pub id: String,
    pub name: String,
}

/// One exchange in a comic's chat panel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Chat {
    pub id: String,
    pub message: String,
    pub response: String,
    pub is_system: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Tags suggested for a comic, as carried by `createdComicTags`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComicTag {
    pub id: String,
    pub tags: Vec<String>,
}
