//! Subscription registry for inbound messages.
//!
//! Consumers register callbacks (optionally behind a predicate) and are
//! invoked synchronously, in registration order, for every message routed
//! after they subscribed. There is no replay.

use panelwire_core::InboundMessage;
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

/// Error a subscriber callback may report. It is logged and otherwise ignored.
pub type SubscriberError = Box<dyn std::error::Error + Send + Sync>;

type Callback = Box<dyn Fn(&InboundMessage) -> Result<(), SubscriberError> + Send + Sync>;
type Predicate = Box<dyn Fn(&InboundMessage) -> bool + Send + Sync>;

/// Unique identifier for a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(pub u64);

enum Delivery {
    Callback(Callback),
    Channel(mpsc::UnboundedSender<InboundMessage>),
}

struct Subscriber {
    id: SubscriptionId,
    predicate: Option<Predicate>,
    delivery: Delivery,
    /// Cleared on unsubscribe so an in-flight dispatch skips it.
    live: AtomicBool,
}

/// Outcome of offering one message to one subscriber.
enum Offer {
    Skipped,
    Delivered,
    Failed,
    ReceiverGone,
}

impl Subscriber {
    fn offer(&self, message: &InboundMessage) -> Offer {
        if !self.live.load(Ordering::Acquire) {
            return Offer::Skipped;
        }

        if let Some(predicate) = &self.predicate {
            match catch_unwind(AssertUnwindSafe(|| predicate(message))) {
                Ok(true) => {}
                Ok(false) => return Offer::Skipped,
                Err(panic) => {
                    tracing::warn!(
                        subscription = self.id.0,
                        panic = panic_message(&*panic),
                        "subscriber predicate panicked"
                    );
                    return Offer::Failed;
                }
            }
        }

        match &self.delivery {
            Delivery::Callback(callback) => {
                match catch_unwind(AssertUnwindSafe(|| callback(message))) {
                    Ok(Ok(())) => Offer::Delivered,
                    Ok(Err(e)) => {
                        tracing::warn!(subscription = self.id.0, error = %e, "subscriber failed");
                        Offer::Failed
                    }
                    Err(panic) => {
                        tracing::warn!(
                            subscription = self.id.0,
                            panic = panic_message(&*panic),
                            "subscriber panicked"
                        );
                        Offer::Failed
                    }
                }
            }
            Delivery::Channel(sender) => match sender.send(message.clone()) {
                Ok(()) => Offer::Delivered,
                Err(_) => Offer::ReceiverGone,
            },
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

/// Manages subscribers and fans messages out to them.
pub struct SubscriptionRegistry {
    /// Ordered by id, which is allocated monotonically, so iteration order is
    /// registration order.
    subscribers: Mutex<BTreeMap<SubscriptionId, Arc<Subscriber>>>,
    next_id: AtomicU64,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<SubscriptionId, Arc<Subscriber>>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert(&self, predicate: Option<Predicate>, delivery: Delivery) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let subscriber = Subscriber {
            id,
            predicate,
            delivery,
            live: AtomicBool::new(true),
        };
        self.lock().insert(id, Arc::new(subscriber));
        id
    }

    /// Receive every message routed from now on.
    pub fn subscribe<F>(&self, on_message: F) -> SubscriptionId
    where
        F: Fn(&InboundMessage) -> Result<(), SubscriberError> + Send + Sync + 'static,
    {
        self.insert(None, Delivery::Callback(Box::new(on_message)))
    }

    /// Receive messages accepted by `predicate`.
    pub fn subscribe_filtered<P, F>(&self, predicate: P, on_message: F) -> SubscriptionId
    where
        P: Fn(&InboundMessage) -> bool + Send + Sync + 'static,
        F: Fn(&InboundMessage) -> Result<(), SubscriberError> + Send + Sync + 'static,
    {
        self.insert(
            Some(Box::new(predicate)),
            Delivery::Callback(Box::new(on_message)),
        )
    }

    /// Receive every message through a channel instead of a callback.
    ///
    /// The subscription is removed the first time a message cannot be
    /// delivered because the receiver was dropped.
    pub fn subscribe_channel(&self) -> ChannelSubscription {
        self.channel(None)
    }

    /// Like [`subscribe_channel`](Self::subscribe_channel), behind a predicate.
    pub fn subscribe_channel_filtered<P>(&self, predicate: P) -> ChannelSubscription
    where
        P: Fn(&InboundMessage) -> bool + Send + Sync + 'static,
    {
        self.channel(Some(Box::new(predicate)))
    }

    fn channel(&self, predicate: Option<Predicate>) -> ChannelSubscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = self.insert(predicate, Delivery::Channel(sender));
        ChannelSubscription { id, receiver }
    }

    /// Remove a subscription. Takes effect for every message not yet offered
    /// to it, including one currently being dispatched.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        match self.lock().remove(&id) {
            Some(subscriber) => {
                subscriber.live.store(false, Ordering::Release);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Offer a message to every live subscriber. Returns how many accepted it.
    ///
    /// The lock is not held while subscribers run, so callbacks may subscribe
    /// or unsubscribe freely.
    pub fn dispatch(&self, message: &InboundMessage) -> usize {
        let snapshot: Vec<Arc<Subscriber>> = self.lock().values().cloned().collect();

        let mut delivered = 0;
        let mut to_remove = Vec::new();
        for subscriber in &snapshot {
            match subscriber.offer(message) {
                Offer::Delivered => delivered += 1,
                Offer::ReceiverGone => to_remove.push(subscriber.id),
                Offer::Skipped | Offer::Failed => {}
            }
        }

        for id in to_remove {
            tracing::debug!(subscription = id.0, "removing subscription with dropped receiver");
            self.unsubscribe(id);
        }

        delivered
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A subscription that delivers into a channel.
pub struct ChannelSubscription {
    pub id: SubscriptionId,
    pub receiver: mpsc::UnboundedReceiver<InboundMessage>,
}

impl ChannelSubscription {
    /// Wait for the next message. `None` once the subscription is gone.
    pub async fn recv(&mut self) -> Option<InboundMessage> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Result<InboundMessage, mpsc::error::TryRecvError> {
        self.receiver.try_recv()
    }
}
