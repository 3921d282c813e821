//! In-memory connector for lifecycle tests.

use crate::error::TransportError;
use crate::transport::{Connector, Frame, Transport};
use futures_util::future::{self, BoxFuture};
use futures_util::{FutureExt, sink, stream};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;

/// What the next connection attempt does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Accept,
    Refuse,
    /// Never completes the handshake.
    Hang,
}

struct Script {
    queue: VecDeque<Outcome>,
    fallback: Outcome,
}

/// Connector whose attempts follow a script; accepted connections are handed
/// to the test as [`Peer`]s.
#[derive(Clone)]
pub(crate) struct ScriptedConnector {
    script: Arc<Mutex<Script>>,
    attempts: Arc<AtomicUsize>,
    peers_tx: mpsc::UnboundedSender<Peer>,
    peers_rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Peer>>>,
}

impl ScriptedConnector {
    pub(crate) fn with_script(
        queue: impl IntoIterator<Item = Outcome>,
        fallback: Outcome,
    ) -> Self {
        let (peers_tx, peers_rx) = mpsc::unbounded_channel();
        Self {
            script: Arc::new(Mutex::new(Script {
                queue: queue.into_iter().collect(),
                fallback,
            })),
            attempts: Arc::new(AtomicUsize::new(0)),
            peers_tx,
            peers_rx: Arc::new(tokio::sync::Mutex::new(peers_rx)),
        }
    }

    pub(crate) fn accepting() -> Self {
        Self::with_script([], Outcome::Accept)
    }

    pub(crate) fn refusing() -> Self {
        Self::with_script([], Outcome::Refuse)
    }

    pub(crate) fn set_fallback(&self, outcome: Outcome) {
        self.script.lock().unwrap().fallback = outcome;
    }

    /// Connection attempts made so far.
    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Wait for the next accepted connection.
    pub(crate) async fn next_peer(&self) -> Peer {
        self.peers_rx
            .lock()
            .await
            .recv()
            .await
            .expect("connector dropped")
    }
}

impl Connector for ScriptedConnector {
    fn connect(&self, _endpoint: &str) -> BoxFuture<'static, Result<Transport, TransportError>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let outcome = {
            let mut script = self.script.lock().unwrap();
            let fallback = script.fallback;
            script.queue.pop_front().unwrap_or(fallback)
        };

        match outcome {
            Outcome::Refuse => future::ready(Err(TransportError::WebSocket(
                tungstenite::Error::Io(std::io::Error::from(std::io::ErrorKind::ConnectionRefused)),
            )))
            .boxed(),
            Outcome::Hang => future::pending().boxed(),
            Outcome::Accept => {
                let (client_tx, from_client) = mpsc::unbounded_channel::<Frame>();
                let (to_client, client_rx) =
                    mpsc::unbounded_channel::<Result<Frame, TransportError>>();

                let sink = sink::unfold(client_tx, |tx, frame: Frame| async move {
                    tx.send(frame).map_err(|_| TransportError::Closed)?;
                    Ok::<_, TransportError>(tx)
                });
                let stream = stream::unfold(client_rx, |mut rx| async move {
                    rx.recv().await.map(|item| (item, rx))
                });

                let _ = self.peers_tx.send(Peer {
                    to_client,
                    from_client,
                });
                future::ready(Ok(Transport {
                    sink: Box::pin(sink),
                    stream: Box::pin(stream),
                }))
                .boxed()
            }
        }
    }
}

/// The server side of an accepted in-memory connection.
pub(crate) struct Peer {
    to_client: mpsc::UnboundedSender<Result<Frame, TransportError>>,
    from_client: mpsc::UnboundedReceiver<Frame>,
}

impl Peer {
    /// Push a text frame to the client.
    pub(crate) fn push(&self, text: &str) {
        let _ = self.to_client.send(Ok(Frame::Text(text.to_string())));
    }

    /// Send a close frame. The socket stays up until the peer is dropped.
    pub(crate) fn close(&self, code: u16, reason: &str) {
        let _ = self.to_client.send(Ok(Frame::Close {
            code,
            reason: reason.to_string(),
        }));
    }

    /// Surface a transport error to the client.
    pub(crate) fn fail(self) {
        let _ = self.to_client.send(Err(TransportError::Closed));
    }

    /// Next frame the client sent; `None` once the client side is gone.
    pub(crate) async fn recv(&mut self) -> Option<Frame> {
        self.from_client.recv().await
    }

    pub(crate) fn try_recv(&mut self) -> Option<Frame> {
        self.from_client.try_recv().ok()
    }
}
