//! Realtime connection manager for panelwire.
//!
//! A [`ConnectionManager`] owns one WebSocket connection to the generation
//! backend. It reconnects after abnormal closures according to a
//! [`ReconnectPolicy`](panelwire_core::ReconnectPolicy), classifies pushed
//! events into last-write-wins slots, and fans every inbound message out to
//! subscribers.
//!
//! ```ignore
//! use panelwire_client::{ConnectionManager, WorkItemWatch};
//! use panelwire_core::{ClientConfig, WorkItemId};
//!
//! let manager = ConnectionManager::new(ClientConfig::new("ws://localhost:3001"))?;
//! manager.subscribe(|msg| {
//!     println!("pushed: {msg}");
//!     Ok(())
//! });
//!
//! let mut watch = WorkItemWatch::new(&manager, WorkItemId::new("42")?);
//! let comic = watch.wait_for_comic().await?;
//! ```

mod connection;
mod error;
mod registration;
mod registry;
mod router;
mod transport;

#[cfg(test)]
mod testing;

pub use connection::{ConnectionManager, OutboundFrame};
pub use error::{ClientError, TransportError};
pub use registration::WorkItemWatch;
pub use registry::{ChannelSubscription, SubscriberError, SubscriptionId, SubscriptionRegistry};
pub use router::{LatestSlot, MessageRouter};
pub use transport::{
    Connector, Frame, FrameSink, FrameStream, NO_STATUS_RECEIVED, Transport, WebSocketConnector,
};
