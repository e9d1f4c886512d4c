//! # Transports
//!
//! Connected byte pipes the session runs over. Two bindings exist, raw TCP
//! and WebSocket binary messages, carrying byte-identical frames. A
//! [`DeviceInfo`] names a discovered peer and selects the binding (and
//! whether the secure channel is negotiated) via its [`ProtocolType`].
//!
//! Readers and writers are split so the session's reader task and its
//! concurrent senders never contend on one object.

pub mod tcp;
pub mod ws;

use crate::error::{CastError, Result};
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use ws::WsStream;

/// Wire binding of a discovered device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolType {
    /// Raw TCP, plaintext frames
    Tcp,
    /// Raw TCP with the key-exchange handshake and encrypted envelopes
    TcpSecure,
    /// WebSocket binary messages, plaintext frames
    Ws,
}

impl ProtocolType {
    /// Whether sessions on this binding negotiate the secure channel.
    pub fn is_secure(self) -> bool {
        matches!(self, ProtocolType::TcpSecure)
    }
}

/// A discovered peer: where to reach it and over which binding.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub addresses: Vec<IpAddr>,
    pub port: u16,
    pub protocol: ProtocolType,
}

impl DeviceInfo {
    pub fn new(
        name: impl Into<String>,
        addresses: Vec<IpAddr>,
        port: u16,
        protocol: ProtocolType,
    ) -> Self {
        Self {
            name: name.into(),
            addresses,
            port,
            protocol,
        }
    }
}

/// Read half of a connected transport.
pub enum TransportReader {
    Tcp {
        half: OwnedReadHalf,
        buf: Vec<u8>,
    },
    Ws(SplitStream<WsStream>),
}

/// Write half of a connected transport.
pub enum TransportWriter {
    Tcp(OwnedWriteHalf),
    Ws(SplitSink<WsStream, Message>),
}

impl TransportReader {
    /// Next chunk of bytes from the peer. `None` signals a graceful close.
    ///
    /// TCP returns whatever the socket delivered; WebSocket returns one
    /// binary message per call, skipping control messages.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        match self {
            TransportReader::Tcp { half, buf } => {
                let n = half.read(buf).await?;
                if n == 0 {
                    return Ok(None);
                }
                Ok(Some(Bytes::copy_from_slice(&buf[..n])))
            }
            TransportReader::Ws(stream) => loop {
                match stream.next().await {
                    Some(Ok(Message::Binary(data))) => return Ok(Some(Bytes::from(data))),
                    Some(Ok(Message::Close(_))) | None => return Ok(None),
                    Some(Ok(other)) => {
                        // ping/pong/text at the websocket layer are not
                        // protocol frames
                        debug!(kind = ?other, "skipping non-binary websocket message");
                    }
                    Some(Err(e)) => {
                        return Err(CastError::Transport(format!("websocket read failed: {e}")))
                    }
                }
            },
        }
    }
}

impl TransportWriter {
    /// Write one encoded frame to the peer.
    pub async fn send(&mut self, bytes: Bytes) -> Result<()> {
        match self {
            TransportWriter::Tcp(half) => {
                half.write_all(&bytes).await?;
                Ok(())
            }
            TransportWriter::Ws(sink) => sink
                .send(Message::Binary(bytes.to_vec()))
                .await
                .map_err(|e| CastError::Transport(format!("websocket write failed: {e}"))),
        }
    }

    /// Close the write side. Errors here are expected when the peer is
    /// already gone.
    pub async fn shutdown(&mut self) {
        match self {
            TransportWriter::Tcp(half) => {
                if let Err(e) = half.shutdown().await {
                    debug!(error = %e, "tcp shutdown after close");
                }
            }
            TransportWriter::Ws(sink) => {
                if let Err(e) = sink.send(Message::Close(None)).await {
                    debug!(error = %e, "websocket close after close");
                }
            }
        }
    }
}

/// Split an accepted or connected TCP stream into a transport pair.
pub fn split_tcp(stream: TcpStream, read_buffer_size: usize) -> (TransportReader, TransportWriter) {
    let (read, write) = stream.into_split();
    (
        TransportReader::Tcp {
            half: read,
            buf: vec![0u8; read_buffer_size],
        },
        TransportWriter::Tcp(write),
    )
}

/// Connect to a device, trying its addresses in order.
pub async fn connect(
    device: &DeviceInfo,
    timeout: Duration,
    read_buffer_size: usize,
) -> Result<(TransportReader, TransportWriter)> {
    let mut last_error: Option<CastError> = None;

    for addr in &device.addresses {
        let addr = SocketAddr::new(*addr, device.port);
        let attempt = match device.protocol {
            ProtocolType::Tcp | ProtocolType::TcpSecure => tcp::connect(addr, timeout)
                .await
                .map(|stream| split_tcp(stream, read_buffer_size)),
            ProtocolType::Ws => ws::connect(addr, timeout).await.map(|stream| {
                let (sink, source) = stream.split();
                (TransportReader::Ws(source), TransportWriter::Ws(sink))
            }),
        };

        match attempt {
            Ok(pair) => return Ok(pair),
            Err(e) => {
                warn!(device = %device.name, %addr, error = %e, "address attempt failed");
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| {
        CastError::Transport(format!("device {} has no addresses", device.name))
    }))
}
