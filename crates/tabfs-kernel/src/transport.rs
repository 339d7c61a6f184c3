//! Transport seam.
//!
//! The dispatcher is agnostic to how messages travel; it only needs an
//! ordered source of incoming JSON objects and a sink for outgoing ones.
//! Concrete transports (native-messaging stdio framing, the local-WebSocket
//! fallback) live in the daemon crate.

use std::io;

use async_trait::async_trait;
use serde_json::Value;

/// A bidirectional JSON message channel.
///
/// `recv` returns `Ok(None)` on orderly end of stream. Ordering is the
/// transport's responsibility; the engine never reorders or coalesces.
#[async_trait]
pub trait Transport: Send {
    async fn recv(&mut self) -> io::Result<Option<Value>>;
    async fn send(&mut self, msg: Value) -> io::Result<()>;
}

/// In-memory transport over tokio channels. Used by tests and by embedders
/// that already have their own message pump.
pub struct ChannelTransport {
    pub incoming: tokio::sync::mpsc::UnboundedReceiver<Value>,
    pub outgoing: tokio::sync::mpsc::UnboundedSender<Value>,
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn recv(&mut self) -> io::Result<Option<Value>> {
        Ok(self.incoming.recv().await)
    }

    async fn send(&mut self, msg: Value) -> io::Result<()> {
        self.outgoing
            .send(msg)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "response channel closed"))
    }
}
