//! # Frame Codec
//!
//! Byte layout of a single protocol frame:
//!
//! ```text
//! [ length: u32 LE ][ opcode: u8 ][ body: UTF-8 JSON, length-1 bytes ]
//! ```
//!
//! The length field counts the opcode byte plus the body, never the prefix
//! itself. An empty body therefore encodes as exactly five bytes.

use crate::config::LENGTH_PREFIX_SIZE;
use crate::error::{CastError, Result};
use crate::protocol::opcode::Opcode;
use bytes::{BufMut, Bytes, BytesMut};

/// A single decoded frame: opcode plus raw body bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub opcode: Opcode,
    pub body: Bytes,
}

impl Frame {
    pub fn new(opcode: Opcode, body: impl Into<Bytes>) -> Self {
        Self {
            opcode,
            body: body.into(),
        }
    }

    /// Frame with no body, e.g. Pause or Ping.
    pub fn empty(opcode: Opcode) -> Self {
        Self {
            opcode,
            body: Bytes::new(),
        }
    }

    /// Encode to the wire layout.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + 1 + self.body.len());
        buf.put_u32_le(1 + self.body.len() as u32);
        buf.put_u8(self.opcode.as_u8());
        buf.put_slice(&self.body);
        buf.freeze()
    }

    /// Decode an already-isolated frame, prefix included.
    ///
    /// The streaming path uses the reassembler instead; this is the
    /// structural inverse of [`Frame::encode`] for whole buffers.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < LENGTH_PREFIX_SIZE + 1 {
            return Err(CastError::InvalidHeader);
        }
        let declared =
            u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        if declared == 0 || declared != buf.len() - LENGTH_PREFIX_SIZE {
            return Err(CastError::InvalidHeader);
        }
        Ok(Self {
            opcode: Opcode::from(buf[LENGTH_PREFIX_SIZE]),
            body: Bytes::copy_from_slice(&buf[LENGTH_PREFIX_SIZE + 1..]),
        })
    }

    /// Body interpreted as UTF-8, for logging and envelope payloads.
    pub fn body_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }
}
