//! Transport seam.
//!
//! The connection manager speaks in [`Frame`]s over a [`Transport`] produced
//! by a [`Connector`]. The production connector is a WebSocket client; tests
//! substitute an in-memory one.

use crate::error::TransportError;
use futures_util::future::{self, BoxFuture};
use futures_util::{FutureExt, Sink, SinkExt, Stream, StreamExt};
use std::pin::Pin;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

/// Close code reported when the peer sends a close frame without a status.
pub const NO_STATUS_RECEIVED: u16 = 1005;

/// One discrete unit on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Close { code: u16, reason: String },
}

impl Frame {
    /// Convert a WebSocket message. Control frames and non-UTF-8 binary
    /// payloads yield `None`.
    fn from_message(message: Message) -> Option<Self> {
        match message {
            Message::Text(text) => Some(Self::Text(text.as_str().to_owned())),
            Message::Binary(bytes) => match String::from_utf8(bytes.to_vec()) {
                Ok(text) => Some(Self::Text(text)),
                Err(_) => {
                    tracing::warn!(len = bytes.len(), "dropping non-UTF-8 binary frame");
                    None
                }
            },
            Message::Close(frame) => Some(match frame {
                Some(frame) => Self::Close {
                    code: u16::from(frame.code),
                    reason: frame.reason.as_str().to_owned(),
                },
                None => Self::Close {
                    code: NO_STATUS_RECEIVED,
                    reason: String::new(),
                },
            }),
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => None,
        }
    }

    fn into_message(self) -> Message {
        match self {
            Self::Text(text) => Message::Text(text.into()),
            Self::Close { code, reason } => Message::Close(Some(CloseFrame {
                code: CloseCode::from(code),
                reason: reason.into(),
            })),
        }
    }
}

pub type FrameSink = Pin<Box<dyn Sink<Frame, Error = TransportError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, TransportError>> + Send>>;

/// An established duplex channel.
pub struct Transport {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

/// Opens transports to an endpoint.
pub trait Connector: Send + Sync + 'static {
    fn connect(&self, endpoint: &str) -> BoxFuture<'static, Result<Transport, TransportError>>;
}

/// Connects over WebSocket (`ws://` or `wss://` when TLS is enabled).
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl Connector for WebSocketConnector {
    fn connect(&self, endpoint: &str) -> BoxFuture<'static, Result<Transport, TransportError>> {
        let endpoint = endpoint.to_string();
        async move {
            let (ws, _response) = tokio_tungstenite::connect_async(endpoint).await?;
            let (sink, stream) = ws.split();

            let sink = sink.with(|frame: Frame| {
                future::ready(Ok::<_, TransportError>(frame.into_message()))
            });
            let stream = stream.filter_map(|message| {
                future::ready(match message {
                    Ok(message) => Frame::from_message(message).map(Ok),
                    Err(e) => Some(Err(TransportError::from(e))),
                })
            });

            Ok(Transport {
                sink: Box::pin(sink),
                stream: Box::pin(stream),
            })
        }
        .boxed()
    }
}
