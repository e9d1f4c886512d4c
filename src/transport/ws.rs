//! # WebSocket Transport
//!
//! WebSocket binding for browser-adjacent peers. Each protocol frame
//! travels as one binary WebSocket message with the exact byte layout used
//! on TCP, so the reassembler works unchanged on top of either.

use crate::error::{CastError, Result};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, instrument};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Open a WebSocket connection with a timeout.
#[instrument(level = "debug")]
pub async fn connect(addr: SocketAddr, timeout: Duration) -> Result<WsStream> {
    let url = format!("ws://{addr}");
    let (stream, response) = tokio::time::timeout(timeout, connect_async(&url))
        .await
        .map_err(|_| CastError::Transport(format!("connect to {url} timed out")))?
        .map_err(|e| CastError::Transport(format!("websocket connect failed: {e}")))?;
    debug!(peer = %addr, status = %response.status(), "websocket connection established");
    Ok(stream)
}
