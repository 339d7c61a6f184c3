//! tabfs-daemon: hosts the engine behind a concrete transport.
//!
//! The engine itself is transport-agnostic; this crate supplies the two
//! transports the host adapter speaks (native-messaging stdio frames and
//! the local-WebSocket fallback) and a binary that wires them to an
//! [`tabfs_kernel::Engine`].
//!
//! Embedders with a real browser adapter use the library directly:
//!
//! ```ignore
//! use std::sync::Arc;
//! use tabfs_daemon::transport::NativeTransport;
//! use tabfs_kernel::Engine;
//!
//! let engine = Arc::new(Engine::new(my_browser));
//! engine.serve(NativeTransport::stdio()).await?;
//! ```
//!
//! The shipped binary serves a canned demo browser so the mount can be
//! exercised without a live browser attached.

pub mod demo;
pub mod transport;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use tabfs_kernel::routes;
use tabfs_kernel::table::RouteTable;
use tabfs_kernel::{Browser, Engine, EngineConfig};

/// Command-line options.
#[derive(Debug, Parser)]
#[command(name = "tabfs-daemon", about = "Serve the tabfs engine to a host adapter")]
pub struct Options {
    /// Connect over the local WebSocket fallback instead of stdio.
    #[arg(long)]
    pub websocket: bool,

    /// WebSocket endpoint of the host adapter.
    #[arg(long, default_value = "ws://localhost:9991")]
    pub url: String,

    /// Per-request deadline in milliseconds.
    #[arg(long, default_value_t = 1000)]
    pub timeout_ms: u64,
}

/// Build an engine and pump the configured transport until it closes.
pub async fn run(browser: Arc<dyn Browser>, options: Options) -> Result<()> {
    let config = EngineConfig {
        request_timeout: Duration::from_millis(options.timeout_ms),
    };
    let table: RouteTable = routes::build_table(browser);
    let engine = Arc::new(Engine::with_table(table, config));

    if options.websocket {
        transport::announce_websocket_handoff().await?;
        let ws = transport::WsTransport::connect(&options.url).await?;
        engine.serve(ws).await?;
    } else {
        engine.serve(transport::NativeTransport::stdio()).await?;
    }
    Ok(())
}
