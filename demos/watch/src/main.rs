//! Command-line consumer.
//!
//! Connects to a backend, registers a work-item id, prints a notification
//! for every pushed message and exits once the comic for that id arrives.
//!
//! Run against the mock backend:
//!   cargo run -p panelwire-demo-push-server -- --port 3001
//!   cargo run -p panelwire-demo-watch -- --endpoint ws://127.0.0.1:3001 42

use anyhow::Context;
use clap::Parser;
use panelwire_client::{ConnectionManager, WorkItemWatch};
use panelwire_core::{ClientConfig, Notification, NotificationVariant, WorkItemId};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const DEFAULT_ENDPOINT: &str = "ws://127.0.0.1:3001";

#[derive(Parser)]
#[command(name = "panelwire-watch", about = "Wait for a generated comic")]
struct Args {
    /// Work item to register for.
    id: WorkItemId,

    /// Backend WebSocket endpoint.
    #[arg(long, env = "PANELWIRE_ENDPOINT")]
    endpoint: Option<String>,

    /// Delay between reconnect attempts, in milliseconds.
    #[arg(long, env = "PANELWIRE_RECONNECT_INTERVAL_MS")]
    reconnect_interval_ms: Option<u64>,

    /// Automatic reconnects allowed before giving up.
    #[arg(long, env = "PANELWIRE_MAX_RECONNECT_ATTEMPTS")]
    max_reconnect_attempts: Option<u32>,

    /// TOML file with a full client config; flags override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Give up after this many seconds.
    #[arg(long, default_value_t = 120)]
    timeout: u64,
}

impl Args {
    fn client_config(&self) -> anyhow::Result<ClientConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                toml::from_str(&text)
                    .with_context(|| format!("parsing {}", path.display()))?
            }
            None => ClientConfig::new(DEFAULT_ENDPOINT),
        };
        if let Some(endpoint) = &self.endpoint {
            config.endpoint = endpoint.clone();
        }
        if let Some(ms) = self.reconnect_interval_ms {
            config = config.with_reconnect_interval(Duration::from_millis(ms));
        }
        if let Some(n) = self.max_reconnect_attempts {
            config = config.with_max_reconnect_attempts(n);
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("panelwire_watch=info".parse()?))
        .init();

    let args = Args::parse();
    let config = args.client_config()?;
    tracing::info!("Connecting to {}", config.endpoint);

    let manager = ConnectionManager::new(config)?;

    manager.subscribe(|msg| {
        let note = Notification::from_message(msg);
        match note.variant {
            NotificationVariant::Destructive => eprintln!("[!] {}: {}", note.title, note.description),
            NotificationVariant::Default => println!("[*] {}: {}", note.title, note.description),
        }
        Ok(())
    });

    let mut status = manager.watch_status();
    tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let current = *status.borrow_and_update();
            tracing::info!("Status: {}", current.label());
        }
    });

    let mut watch = WorkItemWatch::new(&manager, args.id.clone());
    let comic = tokio::time::timeout(Duration::from_secs(args.timeout), watch.wait_for_comic())
        .await
        .with_context(|| format!("no comic for {} after {}s", args.id, args.timeout))??;

    if let Some(tags) = watch.comic_tags() {
        println!("tags: {tags}");
    }
    println!("comic {} ({})", comic.id, comic.topic);
    for (n, image) in comic.images.iter().enumerate() {
        println!("  panel {}: {}", n + 1, image);
    }

    manager.disconnect();
    Ok(())
}
