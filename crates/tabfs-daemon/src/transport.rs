//! Concrete transports for the engine.
//!
//! Native messaging is the standard case: each direction is a 4-byte
//! little-endian length prefix followed by that many bytes of JSON, capped
//! at 1 MiB per message. The local-WebSocket fallback JSON-frames each
//! direction and poll-connects with exponential back-off.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use tabfs_kernel::transport::Transport;

/// Native messaging caps messages at 1 MiB in each direction.
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Length-prefixed JSON over a byte stream pair.
pub struct NativeTransport<R, W> {
    reader: R,
    writer: W,
}

impl NativeTransport<tokio::io::Stdin, tokio::io::Stdout> {
    /// The standard case: frames over this process's stdio.
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }
}

impl<R: AsyncRead + Unpin + Send, W: AsyncWrite + Unpin + Send> NativeTransport<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }
}

#[async_trait]
impl<R, W> Transport for NativeTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn recv(&mut self) -> io::Result<Option<Value>> {
        let mut len_bytes = [0u8; 4];
        match self.reader.read_exact(&mut len_bytes).await {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e),
        }
        let len = u32::from_le_bytes(len_bytes) as usize;
        if len > MAX_MESSAGE_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("frame of {len} bytes exceeds the 1 MiB message cap"),
            ));
        }
        let mut payload = vec![0u8; len];
        self.reader.read_exact(&mut payload).await?;
        let value = serde_json::from_slice(&payload)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("bad frame: {e}")))?;
        Ok(Some(value))
    }

    async fn send(&mut self, msg: Value) -> io::Result<()> {
        let payload = serde_json::to_vec(&msg)?;
        if payload.len() > MAX_MESSAGE_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("reply of {} bytes exceeds the 1 MiB message cap", payload.len()),
            ));
        }
        self.writer
            .write_all(&(payload.len() as u32).to_le_bytes())
            .await?;
        self.writer.write_all(&payload).await?;
        self.writer.flush().await
    }
}

/// Wake the host before switching to the WebSocket: it only starts
/// listening once it has seen a native message.
pub async fn announce_websocket_handoff() -> io::Result<()> {
    let mut stdio = NativeTransport::stdio();
    stdio.send(serde_json::json!({ "op": "didConnect" })).await
}

/// JSON text frames over a local WebSocket.
pub struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsTransport {
    /// Poll-connect with exponential back-off starting at 200 ms until the
    /// host accepts.
    pub async fn connect(url: &str) -> io::Result<Self> {
        let mut delay = Duration::from_millis(200);
        loop {
            match connect_async(url).await {
                Ok((stream, _)) => {
                    tracing::info!(url, "websocket connected");
                    return Ok(Self { stream });
                }
                Err(err) => {
                    tracing::debug!(%err, ?delay, "websocket connect failed, retrying");
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(Duration::from_secs(10));
                }
            }
        }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn recv(&mut self) -> io::Result<Option<Value>> {
        while let Some(frame) = self.stream.next().await {
            let frame = frame.map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            match frame {
                Message::Text(text) => {
                    let value = serde_json::from_str(&text).map_err(|e| {
                        io::Error::new(io::ErrorKind::InvalidData, format!("bad frame: {e}"))
                    })?;
                    return Ok(Some(value));
                }
                Message::Close(_) => return Ok(None),
                // Pings are answered by the protocol layer; anything else
                // on this socket is noise.
                _ => continue,
            }
        }
        Ok(None)
    }

    async fn send(&mut self, msg: Value) -> io::Result<()> {
        self.stream
            .send(Message::Text(msg.to_string()))
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }
}
