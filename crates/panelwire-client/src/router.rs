//! Inbound message routing.
//!
//! Every inbound frame is parsed, classified by its `event` discriminant,
//! used to update the matching [`LatestSlot`], recorded as the most recent
//! message, and finally fanned out through the [`SubscriptionRegistry`].

use crate::registry::SubscriptionRegistry;
use panelwire_core::{EventKind, InboundMessage};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;

/// Last-write-wins cell.
///
/// Reads are non-destructive and no history is kept. Consumers that want to
/// react to writes can [`watch`](Self::watch) it.
pub struct LatestSlot<T> {
    tx: watch::Sender<Option<Arc<T>>>,
}

impl<T> LatestSlot<T> {
    pub fn new() -> Self {
        Self {
            tx: watch::Sender::new(None),
        }
    }

    /// Replace the current value, returning the stored handle.
    pub fn set(&self, value: T) -> Arc<T> {
        let value = Arc::new(value);
        self.tx.send_replace(Some(value.clone()));
        value
    }

    pub fn get(&self) -> Option<Arc<T>> {
        self.tx.borrow().clone()
    }

    /// Subscribe to future writes. The receiver starts at the current value.
    pub fn watch(&self) -> watch::Receiver<Option<Arc<T>>> {
        self.tx.subscribe()
    }
}

impl<T> Default for LatestSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Classifies inbound frames and keeps the classified state.
#[derive(Default)]
pub struct MessageRouter {
    comic_images: LatestSlot<Value>,
    comic_tags: LatestSlot<Value>,
    last_message: LatestSlot<InboundMessage>,
    subscriptions: SubscriptionRegistry,
}

impl MessageRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route one inbound text frame.
    ///
    /// Slot updates and subscriber notifications are complete when this
    /// returns.
    pub fn route(&self, text: &str) -> EventKind {
        self.route_message(InboundMessage::parse(text))
    }

    pub fn route_message(&self, message: InboundMessage) -> EventKind {
        let kind = message.kind();
        let payload = || message.data().cloned().unwrap_or(Value::Null);

        match kind {
            EventKind::ComicImages => {
                self.comic_images.set(payload());
            }
            EventKind::ComicTags => {
                self.comic_tags.set(payload());
            }
            EventKind::Other | EventKind::Unclassified => {}
        }

        let message = self.last_message.set(message);
        let delivered = self.subscriptions.dispatch(&message);
        tracing::debug!(?kind, event = message.event(), delivered, "routed inbound frame");
        kind
    }

    /// Payload of the most recent `createdComicImages` event, from any work item.
    pub fn comic_images(&self) -> Option<Arc<Value>> {
        self.comic_images.get()
    }

    /// Payload of the most recent `createdComicTags` event, from any work item.
    pub fn comic_tags(&self) -> Option<Arc<Value>> {
        self.comic_tags.get()
    }

    pub fn last_message(&self) -> Option<Arc<InboundMessage>> {
        self.last_message.get()
    }

    pub fn comic_images_slot(&self) -> &LatestSlot<Value> {
        &self.comic_images
    }

    pub fn comic_tags_slot(&self) -> &LatestSlot<Value> {
        &self.comic_tags
    }

    pub fn last_message_slot(&self) -> &LatestSlot<InboundMessage> {
        &self.last_message
    }

    pub fn subscriptions(&self) -> &SubscriptionRegistry {
        &self.subscriptions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn comic_images_replace_slot_and_notify() {
        let router = MessageRouter::new();
        let mut sub = router.subscriptions().subscribe_channel();

        let kind = router
            .route(r#"{"event":"createdComicImages","data":{"id":"42","images":["a.png"]}}"#);

        assert_eq!(kind, EventKind::ComicImages);
        assert_eq!(
            router.comic_images().as_deref(),
            Some(&json!({"id": "42", "images": ["a.png"]}))
        );
        assert!(router.comic_tags().is_none());
        assert_eq!(
            sub.try_recv().unwrap(),
            InboundMessage::Json(json!({
                "event": "createdComicImages",
                "data": {"id": "42", "images": ["a.png"]}
            }))
        );
    }

    #[test]
    fn slots_are_replaced_whole() {
        let router = MessageRouter::new();
        router.route(r#"{"event":"createdComicImages","data":{"id":"1","topic":"cats"}}"#);
        router.route(r#"{"event":"createdComicImages","data":{"id":"2"}}"#);

        assert_eq!(router.comic_images().as_deref(), Some(&json!({"id": "2"})));
    }

    #[test]
    fn comic_tags_slot() {
        let router = MessageRouter::new();
        router.route(r#"{"event":"createdComicTags","data":[{"id":"42","tags":["fun"]}]}"#);

        assert_eq!(
            router.comic_tags().as_deref(),
            Some(&json!([{"id": "42", "tags": ["fun"]}]))
        );
        assert!(router.comic_images().is_none());
    }

    #[test]
    fn reserved_event_without_data_stores_null() {
        let router = MessageRouter::new();
        router.route(r#"{"event":"createdComicTags"}"#);
        assert_eq!(router.comic_tags().as_deref(), Some(&Value::Null));
    }

    #[test]
    fn other_events_only_update_last_message() {
        let router = MessageRouter::new();
        let kind = router.route(r#"{"event":"progress","data":{"id":"42","pct":50}}"#);

        assert_eq!(kind, EventKind::Other);
        assert!(router.comic_images().is_none());
        assert!(router.comic_tags().is_none());
        assert_eq!(router.last_message().unwrap().event(), Some("progress"));
    }

    #[test]
    fn malformed_frame_is_delivered_raw() {
        let router = MessageRouter::new();
        let mut sub = router.subscriptions().subscribe_channel();

        let kind = router.route("server restarting");

        assert_eq!(kind, EventKind::Unclassified);
        assert!(router.comic_images().is_none());
        assert!(router.comic_tags().is_none());
        assert_eq!(
            router.last_message().as_deref(),
            Some(&InboundMessage::Raw("server restarting".to_string()))
        );
        assert_eq!(
            sub.try_recv().unwrap(),
            InboundMessage::Raw("server restarting".to_string())
        );
    }

    #[tokio::test]
    async fn slot_watchers_see_writes() {
        let router = MessageRouter::new();
        let mut rx = router.comic_images_slot().watch();
        assert!(rx.borrow_and_update().is_none());

        router.route(r#"{"event":"createdComicImages","data":{"id":"7"}}"#);

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().as_deref(), Some(&json!({"id": "7"})));
    }
}
