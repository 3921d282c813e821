//! Push server implementation.

use crate::protocol::{Notice, Push};
use futures_util::{SinkExt, StreamExt};
use panelwire_core::{ClientMessage, WorkItemId};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

const PANELS: usize = 4;

pub struct Settings {
    /// Pause before each push, standing in for generation time.
    pub delay: Duration,
    /// Number of initial connections to drop without a close frame.
    pub drop_after: u64,
    pub topic: String,
}

struct ServerState {
    settings: Settings,
    accepted: AtomicU64,
}

pub async fn run(addr: SocketAddr, settings: Settings) -> anyhow::Result<()> {
    let state = Arc::new(ServerState {
        settings,
        accepted: AtomicU64::new(0),
    });

    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Listening on ws://{}", addr);

    loop {
        let (stream, client_addr) = listener.accept().await?;
        let state = state.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, client_addr, state).await {
                tracing::warn!("Connection error from {}: {}", client_addr, e);
            }
        });
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    state: Arc<ServerState>,
) -> anyhow::Result<()> {
    let mut ws = tokio_tungstenite::accept_async(stream).await?;
    let n = state.accepted.fetch_add(1, Ordering::SeqCst) + 1;
    tracing::debug!("New connection #{} from {}", n, addr);

    if n <= state.settings.drop_after {
        // Let the client see Open first so the drop counts as a closure.
        tokio::time::sleep(state.settings.delay).await;
        tracing::info!("Dropping connection #{} without a close frame", n);
        return Ok(());
    }

    send(
        &mut ws,
        &Notice {
            kind: "info",
            title: "Connected",
            message: format!("connection #{n} ready"),
        },
    )
    .await?;

    while let Some(msg) = ws.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(frame)) => {
                tracing::debug!("Client {} closed: {:?}", addr, frame);
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!("WebSocket error: {}", e);
                break;
            }
        };

        let ClientMessage::RegisterClient(id) = match serde_json::from_str(&text) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!("Invalid message: {}", e);
                continue;
            }
        };
        tracing::info!("Client {} registered for {}", addr, id);
        generate(&mut ws, &state.settings, &id).await?;
    }

    tracing::debug!("Connection closed: {}", addr);
    Ok(())
}

/// Push the tag catalog and then the asset bundle for `id`.
async fn generate(
    ws: &mut WebSocketStream<TcpStream>,
    settings: &Settings,
    id: &WorkItemId,
) -> anyhow::Result<()> {
    tokio::time::sleep(settings.delay).await;
    send(ws, &Push::tags(id.as_str(), &["comic", "generated"])).await?;

    tokio::time::sleep(settings.delay).await;
    send(ws, &Push::images(id.as_str(), &settings.topic, PANELS)).await?;
    tracing::info!("Pushed comic {}", id);
    Ok(())
}

async fn send<T: Serialize>(
    ws: &mut WebSocketStream<TcpStream>,
    message: &T,
) -> anyhow::Result<()> {
    ws.send(Message::Text(serde_json::to_string(message)?.into()))
        .await?;
    Ok(())
}
