//! tabfs-daemon entry point.
//!
//! Serves the demo catalog over stdio native messaging by default:
//! ```bash
//! cargo run -p tabfs-daemon
//! ```

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tabfs_daemon::{demo, run, Options};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing (respects RUST_LOG env var). Logs go to stderr;
    // stdout is the native-messaging channel.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let options = Options::parse();
    tracing::info!(websocket = options.websocket, "serving demo catalog");
    run(demo::demo_browser(), options).await
}
