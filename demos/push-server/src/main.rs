//! Mock generation backend.
//!
//! Speaks the panelwire wire protocol so the client can be exercised without
//! the real service:
//! - waits for `registerClient` on each connection
//! - pushes `createdComicTags`, then `createdComicImages`, for that id
//! - optionally drops connections without a close frame to trigger reconnects
//!
//! Run:
//!   cargo run -p panelwire-demo-push-server -- --port 3001 --delay-ms 1500
//!   cargo run -p panelwire-demo-push-server -- --port 3001 --drop-after 2

mod protocol;
mod server;

use std::net::SocketAddr;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("push_server=info".parse()?))
        .init();

    let args: Vec<String> = std::env::args().collect();
    let port = parse_arg(&args, "--port").unwrap_or(3001);
    let delay_ms = parse_arg(&args, "--delay-ms").unwrap_or(1000);
    let drop_after = parse_arg(&args, "--drop-after");
    let topic = parse_arg_string(&args, "--topic").unwrap_or_else(|| "cats in space".to_string());

    let addr: SocketAddr = ([127, 0, 0, 1], port).into();

    tracing::info!("Starting push server on {}", addr);
    if let Some(n) = drop_after {
        tracing::info!("Dropping the first {} connections abnormally", n);
    }

    let settings = server::Settings {
        delay: Duration::from_millis(delay_ms.into()),
        drop_after: drop_after.unwrap_or(0).into(),
        topic,
    };
    server::run(addr, settings).await
}

fn parse_arg(args: &[String], flag: &str) -> Option<u16> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|v| v.parse().ok())
}

fn parse_arg_string(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}
