//! Client registration.
//!
//! A consumer that learns its work-item id tells the backend by sending
//! `{"event":"registerClient","data":<id>}`. There is no acknowledgement;
//! success shows up later as a classified event carrying the same id.

use crate::connection::{ConnectionManager, WeakConnection};
use crate::error::ClientError;
use panelwire_core::{ClientMessage, Comic, ConnectionStatus, WorkItemId};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

impl ConnectionManager {
    /// Bind this connection to `id`. Returns `false` unless the connection
    /// is open, in which case nothing is sent.
    pub fn register_client(&self, id: &WorkItemId) -> bool {
        self.send_json(&ClientMessage::RegisterClient(id.clone()))
    }
}

/// Tracks the push events for one work item.
///
/// Registers the id every time the connection opens while the watch is
/// alive, so a reconnect does not lose the binding. Classified payloads are
/// only surfaced when their embedded `id` matches.
pub struct WorkItemWatch {
    id: WorkItemId,
    images: watch::Receiver<Option<Arc<Value>>>,
    tags: watch::Receiver<Option<Arc<Value>>>,
    resend: JoinHandle<()>,
}

impl WorkItemWatch {
    pub fn new(manager: &ConnectionManager, id: WorkItemId) -> Self {
        let resend = manager.runtime().spawn(register_on_open(
            manager.downgrade(),
            manager.watch_status(),
            id.clone(),
        ));

        Self {
            images: manager.router().comic_images_slot().watch(),
            tags: manager.router().comic_tags_slot().watch(),
            id,
            resend,
        }
    }

    pub fn id(&self) -> &WorkItemId {
        &self.id
    }

    /// The latest asset bundle, if it belongs to this work item.
    pub fn comic_images(&self) -> Option<Arc<Value>> {
        let latest = self.images.borrow().clone()?;
        self.id.matches(&latest).then_some(latest)
    }

    /// The latest tag catalog entries for this work item.
    ///
    /// The catalog is either a single object or a list of `{id, tags}`
    /// entries; lists are narrowed to the entries for this id.
    pub fn comic_tags(&self) -> Option<Value> {
        let latest = self.tags.borrow().clone()?;
        match &*latest {
            Value::Array(entries) => {
                let mine: Vec<Value> = entries
                    .iter()
                    .filter(|entry| self.id.matches(entry))
                    .cloned()
                    .collect();
                (!mine.is_empty()).then_some(Value::Array(mine))
            }
            other => self.id.matches(other).then(|| other.clone()),
        }
    }

    /// Wait for the asset bundle of this work item and decode it.
    pub async fn wait_for_comic(&mut self) -> Result<Comic, ClientError> {
        let id = self.id.clone();
        let latest = self
            .images
            .wait_for(|slot| slot.as_deref().is_some_and(|value| id.matches(value)))
            .await
            .map_err(|_| ClientError::Shutdown)?
            .clone();

        match latest {
            Some(value) => Ok(serde_json::from_value(Value::clone(&value))?),
            None => Err(ClientError::Shutdown),
        }
    }
}

impl Drop for WorkItemWatch {
    fn drop(&mut self) {
        self.resend.abort();
    }
}

async fn register_on_open(
    connection: WeakConnection,
    mut status: watch::Receiver<ConnectionStatus>,
    id: WorkItemId,
) {
    let message = ClientMessage::RegisterClient(id);
    loop {
        if *status.borrow_and_update() == ConnectionStatus::Open {
            match connection.send_json(&message) {
                Some(true) => tracing::debug!("registered client"),
                Some(false) => tracing::debug!("registration not sent, connection not open"),
                None => return,
            }
        }
        if status.changed().await.is_err() {
            return;
        }
    }
}
