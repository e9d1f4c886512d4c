//! # TCP Transport
//!
//! Plain TCP binding. Frames are written as-is; the receive side reads
//! whatever chunk sizes the socket delivers and leaves reassembly to the
//! session.

use crate::error::Result;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, instrument};

/// Open a TCP connection with a timeout. Nagle is disabled: frames are
/// small and command latency matters more than throughput.
#[instrument(level = "debug")]
pub async fn connect(addr: SocketAddr, timeout: Duration) -> Result<TcpStream> {
    let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::TimedOut, format!("connect to {addr}"))
        })??;
    stream.set_nodelay(true)?;
    debug!(peer = %addr, "tcp connection established");
    Ok(stream)
}
