//! End-to-end tests against a real WebSocket server on loopback.

use futures_util::{SinkExt, StreamExt};
use panelwire_client::{ConnectionManager, WorkItemWatch};
use panelwire_core::{ClientConfig, ConnectionStatus, WorkItemId};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

const TIMEOUT: Duration = Duration::from_secs(5);

/// Frames the server saw from the client, in order.
#[derive(Debug, PartialEq)]
enum Seen {
    Text(String),
    Close(Option<u16>),
}

/// Accepts connections forever. Each `registerClient` is answered with a
/// tag catalog and an asset bundle for the registered id.
async fn spawn_backend() -> (SocketAddr, mpsc::UnboundedReceiver<Seen>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (seen_tx, seen_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            let seen_tx = seen_tx.clone();
            tokio::spawn(async move {
                let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                let (mut sink, mut stream) = ws.split();
                while let Some(Ok(msg)) = stream.next().await {
                    match msg {
                        Message::Text(text) => {
                            let text = text.as_str().to_owned();
                            let _ = seen_tx.send(Seen::Text(text.clone()));
                            let value: serde_json::Value = match serde_json::from_str(&text) {
                                Ok(v) => v,
                                Err(_) => continue,
                            };
                            if value["event"] != "registerClient" {
                                continue;
                            }
                            let id = value["data"].clone();
                            let tags = serde_json::json!({
                                "event": "createdComicTags",
                                "data": [{"id": id, "tags": ["space", "cats"]}],
                            });
                            let images = serde_json::json!({
                                "event": "createdComicImages",
                                "data": {"id": id, "topic": "cats in space", "images": ["1.png", "2.png"]},
                            });
                            sink.send(Message::Text(tags.to_string().into())).await.unwrap();
                            sink.send(Message::Text(images.to_string().into())).await.unwrap();
                        }
                        Message::Close(frame) => {
                            let _ = seen_tx.send(Seen::Close(frame.map(|f| u16::from(f.code))));
                        }
                        _ => {}
                    }
                }
            });
        }
    });

    (addr, seen_rx)
}

async fn wait_for(manager: &ConnectionManager, status: ConnectionStatus) {
    let mut rx = manager.watch_status();
    tokio::time::timeout(TIMEOUT, rx.wait_for(|s| *s == status))
        .await
        .expect("timed out waiting for status")
        .unwrap();
}

#[tokio::test]
async fn register_and_receive_comic() {
    let (addr, mut seen) = spawn_backend().await;
    let manager = ConnectionManager::new(ClientConfig::new(format!("ws://{addr}"))).unwrap();
    let mut watch = WorkItemWatch::new(&manager, WorkItemId::new("42").unwrap());

    let comic = tokio::time::timeout(TIMEOUT, watch.wait_for_comic())
        .await
        .expect("timed out waiting for comic")
        .unwrap();
    assert_eq!(comic.id, "42");
    assert_eq!(comic.images, vec!["1.png", "2.png"]);
    assert_eq!(
        watch.comic_tags(),
        Some(serde_json::json!([{"id": "42", "tags": ["space", "cats"]}]))
    );

    assert_eq!(
        seen.recv().await,
        Some(Seen::Text(r#"{"event":"registerClient","data":"42"}"#.to_string()))
    );

    manager.disconnect();
    wait_for(&manager, ConnectionStatus::Closed).await;
    assert_eq!(seen.recv().await, Some(Seen::Close(Some(1000))));
    assert_eq!(manager.attempts(), 0);
}

#[tokio::test]
async fn reconnects_after_server_drops() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    // First connection is closed abnormally, the second is held open.
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.close(Some(CloseFrame {
            code: CloseCode::Error,
            reason: "internal error".into(),
        }))
        .await
        .unwrap();
        while ws.next().await.is_some() {}
        drop(ws);

        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.send(Message::Text("welcome back".into())).await.unwrap();
        while ws.next().await.is_some() {}
    });

    let config = ClientConfig::new(format!("ws://{addr}"))
        .with_reconnect_interval(Duration::from_millis(50));
    let manager = ConnectionManager::new(config).unwrap();
    let mut sub = manager.subscribe_channel();

    let msg = tokio::time::timeout(TIMEOUT, sub.recv())
        .await
        .expect("timed out waiting for reconnect")
        .unwrap();
    assert_eq!(msg.as_raw(), Some("welcome back"));
    wait_for(&manager, ConnectionStatus::Open).await;
    assert_eq!(manager.attempts(), 0);
}

#[tokio::test]
async fn reconnects_when_closing_server_keeps_socket() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut first = tokio_tungstenite::accept_async(stream).await.unwrap();
        first
            .send(Message::Close(Some(CloseFrame {
                code: CloseCode::Error,
                reason: "internal error".into(),
            })))
            .await
            .unwrap();

        // `first` is neither read nor dropped while the client reconnects.
        let (stream, _) = listener.accept().await.unwrap();
        let mut second = tokio_tungstenite::accept_async(stream).await.unwrap();
        second.send(Message::Text("welcome back".into())).await.unwrap();
        while second.next().await.is_some() {}
        drop(first);
    });

    let config = ClientConfig::new(format!("ws://{addr}"))
        .with_reconnect_interval(Duration::from_millis(50));
    let manager = ConnectionManager::new(config).unwrap();
    let mut sub = manager.subscribe_channel();

    let msg = tokio::time::timeout(TIMEOUT, sub.recv())
        .await
        .expect("timed out waiting for reconnect")
        .unwrap();
    assert_eq!(msg.as_raw(), Some("welcome back"));
    assert_eq!(manager.status(), ConnectionStatus::Open);
}

#[tokio::test]
async fn unreachable_endpoint_gives_up() {
    // Bind and drop to get a port that refuses connections.
    let addr = TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap()
        .local_addr()
        .unwrap();

    let config = ClientConfig::new(format!("ws://{addr}"))
        .with_reconnect_interval(Duration::from_millis(10))
        .with_max_reconnect_attempts(3);
    let manager = ConnectionManager::new(config).unwrap();

    tokio::time::timeout(TIMEOUT, async {
        while manager.attempts() < 3 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("never exhausted attempts");

    wait_for(&manager, ConnectionStatus::Closed).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(manager.status(), ConnectionStatus::Closed);
    assert_eq!(manager.attempts(), 3);
    assert!(!manager.send("hello"));
}
