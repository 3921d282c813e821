//! Server-to-client push frames.

use panelwire_core::{Comic, ComicTag, ServerEvent};
use serde::Serialize;

/// One pushed event, serialized as `{"event": ..., "data": ...}`.
#[derive(Debug, Clone, Serialize)]
pub struct Push<T> {
    pub event: &'static str,
    pub data: T,
}

impl Push<Vec<ComicTag>> {
    pub fn tags(id: &str, tags: &[&str]) -> Self {
        Self {
            event: ServerEvent::COMIC_TAGS,
            data: vec![ComicTag {
                id: id.to_string(),
                tags: tags.iter().map(|t| t.to_string()).collect(),
            }],
        }
    }
}

impl Push<Comic> {
    pub fn images(id: &str, topic: &str, panels: usize) -> Self {
        Self {
            event: ServerEvent::COMIC_IMAGES,
            data: Comic {
                id: id.to_string(),
                topic: topic.to_string(),
                tone: "playful".to_string(),
                difficulty: "easy".to_string(),
                images: (1..=panels)
                    .map(|n| format!("https://cdn.example.test/{id}/{n}.png"))
                    .collect(),
                ..Comic::default()
            },
        }
    }
}

/// Status frame sent right after the handshake, like a toast from the backend.
#[derive(Debug, Clone, Serialize)]
pub struct Notice<'a> {
    #[serde(rename = "type")]
    pub kind: &'a str,
    pub title: &'a str,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tags_push_shape() {
        let value = serde_json::to_value(Push::tags("42", &["space"])).unwrap();
        assert_eq!(
            value,
            json!({"event": "createdComicTags", "data": [{"id": "42", "tags": ["space"]}]})
        );
    }

    #[test]
    fn images_push_carries_id() {
        let value = serde_json::to_value(Push::images("42", "space", 2)).unwrap();
        assert_eq!(value["event"], "createdComicImages");
        assert_eq!(value["data"]["id"], "42");
        assert_eq!(value["data"]["images"].as_array().unwrap().len(), 2);
    }
}
