//! The dispatcher: request in, reply or error out.
//!
//! One transport stream, one engine. Each incoming request is matched
//! against the route table, its path variables are bound, and the named
//! operation's handler runs under a timeout on its own task — so a request
//! that suspends on a browser call does not block the ones behind it.
//! Exactly one response is sent per request id.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::browser::Browser;
use crate::errno::{FsError, FsResult, ETIMEDOUT};
use crate::route::OpContext;
use crate::routes;
use crate::table::RouteTable;
use crate::transport::Transport;
use crate::wire::{self, Reply, Request};

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Per-request deadline. When it fires, an `ETIMEDOUT` reply is sent
    /// and the handler future is cancelled.
    pub request_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(1),
        }
    }
}

/// The request router and virtual-filesystem engine.
pub struct Engine {
    table: RouteTable,
    config: EngineConfig,
}

impl Engine {
    /// An engine serving the full route catalog against the given browser.
    pub fn new(browser: Arc<dyn Browser>) -> Self {
        Self::with_table(routes::build_table(browser), EngineConfig::default())
    }

    /// An engine over an explicit table. Tests and embedders use this.
    pub fn with_table(table: RouteTable, config: EngineConfig) -> Self {
        Self { table, config }
    }

    pub fn table(&self) -> &RouteTable {
        &self.table
    }

    /// Handle one raw transport message. Returns `None` for messages that
    /// cannot be answered (no parseable id), which are logged and dropped —
    /// the host adapter does the same with unmatched responses.
    pub async fn handle(&self, msg: Value) -> Option<Value> {
        match serde_json::from_value::<Request>(msg.clone()) {
            Ok(req) => Some(self.dispatch(req).await),
            Err(err) => {
                let id = msg.get("id").and_then(Value::as_u64);
                let op = msg
                    .get("op")
                    .cloned()
                    .and_then(|v| serde_json::from_value::<wire::Op>(v).ok());
                tracing::warn!(%err, ?id, "unparseable request");
                match (id, op) {
                    (Some(id), Some(op)) => Some(wire::error_response(id, op, crate::errno::EIO)),
                    _ => None,
                }
            }
        }
    }

    /// Dispatch a decoded request, producing exactly one response value.
    pub async fn dispatch(&self, req: Request) -> Value {
        let id = req.id;
        let op = req.op;
        tracing::debug!(id, op = op.name(), path = %req.path, "request");

        match tokio::time::timeout(self.config.request_timeout, self.dispatch_inner(req)).await {
            Ok(Ok(reply)) => wire::response(id, op, &reply),
            Ok(Err(err)) => {
                tracing::debug!(id, op = op.name(), errno = err.errno(), %err, "error reply");
                wire::error_response(id, op, err.errno())
            }
            Err(_elapsed) => {
                tracing::warn!(id, op = op.name(), "request timed out");
                wire::error_response(id, op, ETIMEDOUT)
            }
        }
    }

    async fn dispatch_inner(&self, req: Request) -> FsResult<Reply> {
        // macOS writes AppleDouble companions next to everything it
        // touches; reject them before the table ever sees the path.
        if req
            .path
            .rsplit('/')
            .next()
            .is_some_and(|seg| seg.starts_with("._"))
        {
            return Err(FsError::NotSupported);
        }

        let (route, vars) = self.table.lookup(&req.path).ok_or(FsError::NotFound)?;
        let handler = route
            .handler_for(req.op)
            .ok_or(FsError::NotSupported)?
            .clone();

        let cx = OpContext {
            buf: req.decode_buf()?,
            path: req.path,
            fh: req.fh,
            offset: req.offset,
            size: req.size,
            mode: req.mode,
            vars,
        };
        handler(cx).await
    }

    /// Pump a transport until it closes.
    ///
    /// Requests are dispatched on their own tasks; responses are funneled
    /// back through a channel so they go out in completion order, which is
    /// all the host adapter needs — it matches replies by id.
    pub async fn serve<T: Transport>(self: Arc<Self>, mut transport: T) -> io::Result<()> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Value>();
        tracing::info!("engine serving");
        loop {
            tokio::select! {
                incoming = transport.recv() => match incoming? {
                    Some(msg) => {
                        let engine = self.clone();
                        let tx = tx.clone();
                        tokio::spawn(async move {
                            if let Some(resp) = engine.handle(msg).await {
                                // Receiver lives as long as the loop; a send
                                // failure means we are shutting down.
                                let _ = tx.send(resp);
                            }
                        });
                    }
                    None => {
                        tracing::info!("transport closed");
                        return Ok(());
                    }
                },
                Some(resp) = rx.recv() => {
                    transport.send(resp).await?;
                }
            }
        }
    }
}
