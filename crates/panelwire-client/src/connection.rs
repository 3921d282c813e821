//! Connection lifecycle.
//!
//! [`ConnectionManager`] owns at most one live transport at a time. Each
//! transport runs in its own task and reports back through the shared state;
//! every transport is stamped with an epoch so that reports from a transport
//! that has since been replaced are ignored. Retries are separate tasks
//! holding a ticket, and a retry whose ticket was revoked does nothing.

use crate::error::{ClientError, TransportError};
use crate::registry::{ChannelSubscription, SubscriberError, SubscriptionId};
use crate::router::MessageRouter;
use crate::transport::{Connector, Frame, FrameSink, FrameStream, Transport, WebSocketConnector};
use futures_util::{SinkExt, StreamExt};
use panelwire_core::{
    ABNORMAL_CLOSURE, ClientConfig, ConnectionStatus, InboundMessage, NORMAL_CLOSURE,
    ReconnectPolicy, Timeouts,
};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

const NORMAL_CLOSURE_REASON: &str = "Normal closure";

/// A text frame ready to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFrame(String);

impl OutboundFrame {
    /// Serialize a structured message to compact JSON text.
    pub fn json<T: Serialize + ?Sized>(message: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_string(message).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for OutboundFrame {
    fn from(text: &str) -> Self {
        Self(text.to_string())
    }
}

impl From<String> for OutboundFrame {
    fn from(text: String) -> Self {
        Self(text)
    }
}

impl From<serde_json::Value> for OutboundFrame {
    fn from(value: serde_json::Value) -> Self {
        Self(value.to_string())
    }
}

impl From<&serde_json::Value> for OutboundFrame {
    fn from(value: &serde_json::Value) -> Self {
        Self(value.to_string())
    }
}

enum Command {
    Send(String),
    Close,
}

struct TransportHandle {
    outbound: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

struct RetryTicket {
    token: u64,
    task: JoinHandle<()>,
}

struct ConnectionState {
    status: ConnectionStatus,
    attempts: u32,
    /// Bumped for every transport; reports carrying an older epoch are stale.
    epoch: u64,
    transport: Option<TransportHandle>,
    retry: Option<RetryTicket>,
    next_retry_token: u64,
    #[cfg(test)]
    history: Vec<ConnectionStatus>,
}

struct Shared {
    endpoint: String,
    policy: ReconnectPolicy,
    timeouts: Timeouts,
    connector: Arc<dyn Connector>,
    runtime: Handle,
    router: MessageRouter,
    status_tx: watch::Sender<ConnectionStatus>,
    state: Mutex<ConnectionState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, state: &mut ConnectionState, next: ConnectionStatus) {
        if !state.status.can_transition_to(next) {
            tracing::error!(from = %state.status, to = %next, "unexpected status transition");
        }
        state.status = next;
        #[cfg(test)]
        state.history.push(next);
        self.status_tx.send_replace(next);
    }

    fn cancel_retry(&self, state: &mut ConnectionState) {
        if let Some(retry) = state.retry.take() {
            tracing::debug!(token = retry.token, "cancelling pending reconnect");
            retry.task.abort();
        }
    }

    /// Drop the current transport without a close handshake.
    fn teardown(&self, state: &mut ConnectionState) {
        if let Some(transport) = state.transport.take() {
            transport.task.abort();
        }
        if matches!(
            state.status,
            ConnectionStatus::Connecting | ConnectionStatus::Open | ConnectionStatus::Closing
        ) {
            self.transition(state, ConnectionStatus::Closed);
        }
    }

    fn connect(self: &Arc<Self>) {
        let mut state = self.lock();
        self.connect_locked(&mut state);
    }

    fn connect_locked(self: &Arc<Self>, state: &mut ConnectionState) {
        self.cancel_retry(state);
        self.teardown(state);

        state.epoch += 1;
        let epoch = state.epoch;
        self.transition(state, ConnectionStatus::Connecting);
        tracing::debug!(endpoint = %self.endpoint, epoch, "connecting");

        let (outbound, commands) = mpsc::unbounded_channel();
        let task = self
            .runtime
            .spawn(run_transport(Arc::clone(self), epoch, commands));
        state.transport = Some(TransportHandle { outbound, task });
    }

    fn disconnect(&self) {
        let mut state = self.lock();
        self.cancel_retry(&mut state);

        if !state.status.is_live() {
            return;
        }
        let Some(transport) = state.transport.as_ref() else {
            return;
        };
        // A send failure means the task already ended; its close report will
        // land on the Closing status and be treated as normal.
        let _ = transport.outbound.send(Command::Close);
        self.transition(&mut state, ConnectionStatus::Closing);
    }

    fn send(&self, frame: OutboundFrame) -> bool {
        let state = self.lock();
        if state.status != ConnectionStatus::Open {
            tracing::warn!(status = %state.status, "cannot send message, connection is not open");
            return false;
        }
        match state.transport.as_ref() {
            Some(transport) => transport.outbound.send(Command::Send(frame.0)).is_ok(),
            None => false,
        }
    }

    /// Route a frame received by transport `epoch`. Returns `false`, routing
    /// nothing, once that transport has been replaced.
    fn deliver(&self, epoch: u64, text: &str) -> bool {
        if self.lock().epoch != epoch {
            return false;
        }
        self.router.route(text);
        true
    }

    /// Called by a transport task once its handshake completed. Returns
    /// whether the transport is still the current one.
    fn on_open(&self, epoch: u64) -> bool {
        let mut state = self.lock();
        if state.epoch != epoch {
            return false;
        }
        // A disconnect may have raced the handshake; its close command is
        // already queued, so stay in Closing.
        if state.status == ConnectionStatus::Connecting {
            state.attempts = 0;
            self.transition(&mut state, ConnectionStatus::Open);
            tracing::info!(endpoint = %self.endpoint, "connection established");
        }
        true
    }

    /// Called by a transport task when it ends, however it ends.
    fn on_closed(self: &Arc<Self>, epoch: u64, code: u16, reason: &str) {
        let mut state = self.lock();
        if state.epoch != epoch {
            return;
        }
        state.transport = None;

        let requested = state.status == ConnectionStatus::Closing;
        if state.status != ConnectionStatus::Closed {
            self.transition(&mut state, ConnectionStatus::Closed);
        }
        tracing::info!(code, reason, "connection closed");

        if requested || code == NORMAL_CLOSURE {
            return;
        }
        if state.attempts >= self.policy.max_attempts {
            tracing::warn!(
                attempts = state.attempts,
                "reconnect attempts exhausted, staying closed"
            );
            return;
        }

        state.attempts += 1;
        tracing::info!(
            "attempting to reconnect ({}/{}) in {:?}",
            state.attempts,
            self.policy.max_attempts,
            self.policy.interval
        );
        self.schedule_retry(&mut state);
    }

    fn schedule_retry(self: &Arc<Self>, state: &mut ConnectionState) {
        state.next_retry_token += 1;
        let token = state.next_retry_token;
        let interval = self.policy.interval;
        let shared = Arc::downgrade(self);

        let task = self.runtime.spawn(async move {
            tokio::time::sleep(interval).await;
            if let Some(shared) = shared.upgrade() {
                shared.fire_retry(token);
            }
        });
        state.retry = Some(RetryTicket { token, task });
    }

    fn fire_retry(self: &Arc<Self>, token: u64) {
        let mut state = self.lock();
        if state.retry.as_ref().map(|retry| retry.token) != Some(token) {
            return;
        }
        // This is the retry task itself; clear the ticket instead of aborting.
        state.retry = None;
        self.connect_locked(&mut state);
    }
}

/// Drives one transport from connection attempt to termination.
async fn run_transport(
    shared: Arc<Shared>,
    epoch: u64,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    let limit = shared.timeouts.connect;
    let attempt = tokio::time::timeout(limit, shared.connector.connect(&shared.endpoint));
    let result = tokio::select! {
        biased;
        command = commands.recv() => {
            if command.is_some() {
                shared.on_closed(epoch, NORMAL_CLOSURE, "closed before open");
            }
            return;
        }
        result = attempt => result.unwrap_or(Err(TransportError::HandshakeTimeout(limit))),
    };

    let Transport {
        mut sink,
        mut stream,
    } = match result {
        Ok(transport) => transport,
        Err(e) => {
            tracing::warn!(endpoint = %shared.endpoint, error = %e, "failed to connect");
            shared.on_closed(epoch, ABNORMAL_CLOSURE, &e.to_string());
            return;
        }
    };

    if !shared.on_open(epoch) {
        return;
    }

    let (code, reason) = loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Send(text)) => {
                    if let Err(e) = sink.send(Frame::Text(text)).await {
                        tracing::warn!(error = %e, "failed to send frame");
                    }
                }
                Some(Command::Close) => {
                    close_gracefully(&mut sink, &mut stream, shared.timeouts.close).await;
                    break (NORMAL_CLOSURE, NORMAL_CLOSURE_REASON.to_string());
                }
                None => return,
            },
            frame = stream.next() => match frame {
                Some(Ok(Frame::Text(text))) => {
                    if !shared.deliver(epoch, &text) {
                        return;
                    }
                }
                Some(Ok(Frame::Close { code, reason })) => {
                    tracing::debug!(code, %reason, "peer sent close frame");
                    // Push out the queued close reply before hanging up.
                    if let Err(e) = sink.flush().await {
                        tracing::debug!(error = %e, "failed to flush close reply");
                    }
                    break (code, reason);
                }
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "transport error");
                    break (ABNORMAL_CLOSURE, String::new());
                }
                None => break (ABNORMAL_CLOSURE, String::new()),
            },
        }
    };

    shared.on_closed(epoch, code, &reason);
}

/// Send a normal-closure frame and wait, at most `limit`, for the peer to
/// answer it or hang up. Frames arriving meanwhile are discarded.
async fn close_gracefully(sink: &mut FrameSink, stream: &mut FrameStream, limit: Duration) {
    let handshake = async {
        let close = Frame::Close {
            code: NORMAL_CLOSURE,
            reason: NORMAL_CLOSURE_REASON.to_string(),
        };
        if let Err(e) = sink.send(close).await {
            tracing::warn!(error = %e, "failed to send close frame");
            return;
        }
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(Frame::Text(_)) => {}
                Ok(Frame::Close { .. }) | Err(_) => return,
            }
        }
    };

    if tokio::time::timeout(limit, handshake).await.is_err() {
        tracing::warn!(?limit, "peer did not answer close frame, dropping transport");
    }
}

/// Owns the realtime connection to one backend endpoint.
///
/// Construct once per session and hand out references; dropping the manager
/// closes the connection with a normal closure. Must be created inside a
/// tokio runtime.
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

impl ConnectionManager {
    /// Connect to `config.endpoint` over WebSocket.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        Self::with_connector(config, WebSocketConnector)
    }

    /// Connect through a custom [`Connector`].
    pub fn with_connector(
        config: ClientConfig,
        connector: impl Connector,
    ) -> Result<Self, ClientError> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| ClientError::NoRuntime)?;

        let shared = Arc::new(Shared {
            policy: config.reconnect_policy(),
            timeouts: config.timeouts(),
            endpoint: config.endpoint,
            connector: Arc::new(connector),
            runtime,
            router: MessageRouter::new(),
            status_tx: watch::Sender::new(ConnectionStatus::Uninstantiated),
            state: Mutex::new(ConnectionState {
                status: ConnectionStatus::Uninstantiated,
                attempts: 0,
                epoch: 0,
                transport: None,
                retry: None,
                next_retry_token: 0,
                #[cfg(test)]
                history: vec![ConnectionStatus::Uninstantiated],
            }),
        });

        let manager = Self { shared };
        manager.connect();
        Ok(manager)
    }

    /// Replace the current transport with a fresh connection attempt.
    ///
    /// Cancels a pending retry. Does not reset the attempt counter; only a
    /// successful open does.
    pub fn connect(&self) {
        self.shared.connect();
    }

    /// Close gracefully. Never schedules a reconnect.
    pub fn disconnect(&self) {
        self.shared.disconnect();
    }

    /// Reconnect only if the connection is currently closed.
    pub fn reconnect_if_closed(&self) -> bool {
        if self.status() != ConnectionStatus::Closed {
            return false;
        }
        self.connect();
        true
    }

    /// Queue one text frame. Returns `false`, transmitting nothing, unless
    /// the connection is open.
    pub fn send(&self, message: impl Into<OutboundFrame>) -> bool {
        self.shared.send(message.into())
    }

    /// Serialize `message` to JSON and [`send`](Self::send) it.
    pub fn send_json<T: Serialize + ?Sized>(&self, message: &T) -> bool {
        match OutboundFrame::json(message) {
            Ok(frame) => self.shared.send(frame),
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize outbound message");
                false
            }
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.shared.status_tx.borrow()
    }

    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status_tx.subscribe()
    }

    /// Consecutive automatic reconnects since the last successful open.
    pub fn attempts(&self) -> u32 {
        self.shared.lock().attempts
    }

    pub fn policy(&self) -> ReconnectPolicy {
        self.shared.policy
    }

    pub fn endpoint(&self) -> &str {
        &self.shared.endpoint
    }

    pub fn router(&self) -> &MessageRouter {
        &self.shared.router
    }

    /// Shorthand for `router().subscriptions().subscribe(..)`.
    pub fn subscribe<F>(&self, on_message: F) -> SubscriptionId
    where
        F: Fn(&InboundMessage) -> Result<(), SubscriberError> + Send + Sync + 'static,
    {
        self.shared.router.subscriptions().subscribe(on_message)
    }

    /// Shorthand for `router().subscriptions().subscribe_filtered(..)`.
    pub fn subscribe_filtered<P, F>(&self, predicate: P, on_message: F) -> SubscriptionId
    where
        P: Fn(&InboundMessage) -> bool + Send + Sync + 'static,
        F: Fn(&InboundMessage) -> Result<(), SubscriberError> + Send + Sync + 'static,
    {
        self.shared
            .router
            .subscriptions()
            .subscribe_filtered(predicate, on_message)
    }

    pub fn subscribe_channel(&self) -> ChannelSubscription {
        self.shared.router.subscriptions().subscribe_channel()
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.shared.router.subscriptions().unsubscribe(id)
    }

    pub(crate) fn runtime(&self) -> &Handle {
        &self.shared.runtime
    }

    /// A handle that can send without keeping the connection alive.
    pub(crate) fn downgrade(&self) -> WeakConnection {
        WeakConnection(Arc::downgrade(&self.shared))
    }

    #[cfg(test)]
    pub(crate) fn history(&self) -> Vec<ConnectionStatus> {
        self.shared.lock().history.clone()
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.shared.disconnect();
    }
}

/// Non-owning sender used by background helpers.
#[derive(Clone)]
pub(crate) struct WeakConnection(Weak<Shared>);

impl WeakConnection {
    /// Send if the manager still exists. `None` once it is gone.
    pub(crate) fn send_json<T: Serialize + ?Sized>(&self, message: &T) -> Option<bool> {
        let shared = self.0.upgrade()?;
        Some(match OutboundFrame::json(message) {
            Ok(frame) => shared.send(frame),
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize outbound message");
                false
            }
        })
    }
}
