//! User-facing notifications derived from inbound messages.

use crate::InboundMessage;
use serde::{Deserialize, Serialize};

const DEFAULT_TITLE: &str = "New notification";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationVariant {
    Default,
    Destructive,
}

/// A toast-style summary of a pushed message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub description: String,
    pub variant: NotificationVariant,
}

impl Notification {
    /// Summarize a message.
    ///
    /// Title comes from a `title` field; description from `message` or
    /// `description`, falling back to the raw text or the compact JSON.
    /// Messages with `"type": "error"` are destructive.
    pub fn from_message(message: &InboundMessage) -> Self {
        match message {
            InboundMessage::Raw(text) => Self {
                title: DEFAULT_TITLE.to_string(),
                description: text.clone(),
                variant: NotificationVariant::Default,
            },
            InboundMessage::Json(value) => {
                let field = |name: &str| {
                    value
                        .get(name)
                        .and_then(|v| v.as_str())
                        .filter(|s| !s.is_empty())
                };

                let title = field("title").unwrap_or(DEFAULT_TITLE).to_string();
                let description = field("message")
                    .or_else(|| field("description"))
                    .map(str::to_string)
                    .or_else(|| value.as_str().map(str::to_string))
                    .unwrap_or_else(|| value.to_string());
                let variant = if field("type") == Some("error") {
                    NotificationVariant::Destructive
                } else {
                    NotificationVariant::Default
                };

                Self {
                    title,
                    description,
                    variant,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn uses_title_and_message() {
        let msg = InboundMessage::Json(json!({
            "title": "Done",
            "message": "Your comic is ready",
        }));
        let n = Notification::from_message(&msg);
        assert_eq!(n.title, "Done");
        assert_eq!(n.description, "Your comic is ready");
        assert_eq!(n.variant, NotificationVariant::Default);
    }

    #[test]
    fn error_type_is_destructive() {
        let msg = InboundMessage::Json(json!({"type": "error", "description": "quota"}));
        let n = Notification::from_message(&msg);
        assert_eq!(n.title, "New notification");
        assert_eq!(n.description, "quota");
        assert_eq!(n.variant, NotificationVariant::Destructive);
    }

    #[test]
    fn falls_back_to_json_or_raw_text() {
        let msg = InboundMessage::Json(json!({"event": "progress"}));
        assert_eq!(
            Notification::from_message(&msg).description,
            r#"{"event":"progress"}"#
        );

        let msg = InboundMessage::Raw("plain text".to_string());
        assert_eq!(Notification::from_message(&msg).description, "plain text");

        let msg = InboundMessage::Json(json!("quoted"));
        assert_eq!(Notification::from_message(&msg).description, "quoted");
    }
}
