//! # Packet Reassembler
//!
//! Streaming state machine that turns arbitrarily-chunked transport reads
//! into whole frames. TCP offers no message boundaries: a read may deliver
//! a fraction of a frame, several frames, or a frame boundary mid-prefix.
//!
//! The machine accumulates into a fixed buffer of [`MAX_PACKET_LENGTH`]
//! bytes. A length prefix declaring more than the buffer holds (or zero)
//! poisons the stream permanently: there is no way to find the next frame
//! boundary, so the machine enters [`ReadState::Disconnected`] and the
//! caller must drop the transport.
//!
//! [`MAX_PACKET_LENGTH`]: crate::config::MAX_PACKET_LENGTH

use crate::config::{LENGTH_PREFIX_SIZE, MAX_PACKET_LENGTH};
use crate::core::frame::Frame;
use crate::error::{CastError, Result};
use bytes::Bytes;
use tracing::trace;

/// Where the machine is within the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadState {
    /// Accumulating the 4-byte length prefix.
    WaitingForLength,
    /// Accumulating opcode + body bytes.
    WaitingForData,
    /// Terminal. Entered on an unrecoverable framing error.
    Disconnected,
}

/// Chunk-to-frame reassembly machine. One per connection, owned by the
/// reader task.
#[derive(Debug)]
pub struct Reassembler {
    state: ReadState,
    buffer: Vec<u8>,
    bytes_read: usize,
    packet_length: usize,
    max_packet_length: usize,
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new(MAX_PACKET_LENGTH)
    }
}

impl Reassembler {
    pub fn new(max_packet_length: usize) -> Self {
        Self {
            state: ReadState::WaitingForLength,
            buffer: vec![0u8; max_packet_length.max(LENGTH_PREFIX_SIZE)],
            bytes_read: 0,
            packet_length: 0,
            max_packet_length,
        }
    }

    /// Whether a framing error has poisoned this machine.
    pub fn is_disconnected(&self) -> bool {
        self.state == ReadState::Disconnected
    }

    /// Feed one transport read. Returns every frame completed by it, in
    /// stream order. The same total byte sequence yields the same frames
    /// no matter how it is split across calls.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<Frame>> {
        let mut frames = Vec::new();
        let mut offset = 0;

        while offset < chunk.len() {
            match self.state {
                ReadState::Disconnected => return Err(CastError::Closed),
                ReadState::WaitingForLength => {
                    let wanted = LENGTH_PREFIX_SIZE - self.bytes_read;
                    let take = wanted.min(chunk.len() - offset);
                    self.buffer[self.bytes_read..self.bytes_read + take]
                        .copy_from_slice(&chunk[offset..offset + take]);
                    self.bytes_read += take;
                    offset += take;

                    if self.bytes_read == LENGTH_PREFIX_SIZE {
                        let declared = u32::from_le_bytes([
                            self.buffer[0],
                            self.buffer[1],
                            self.buffer[2],
                            self.buffer[3],
                        ]) as usize;

                        if declared == 0 {
                            self.state = ReadState::Disconnected;
                            return Err(CastError::InvalidHeader);
                        }
                        if declared > self.max_packet_length {
                            self.state = ReadState::Disconnected;
                            return Err(CastError::PacketTooLarge {
                                declared,
                                max: self.max_packet_length,
                            });
                        }

                        trace!(length = declared, "frame length received");
                        self.packet_length = declared;
                        self.bytes_read = 0;
                        self.state = ReadState::WaitingForData;
                    }
                }
                ReadState::WaitingForData => {
                    let wanted = self.packet_length - self.bytes_read;
                    let take = wanted.min(chunk.len() - offset);
                    self.buffer[self.bytes_read..self.bytes_read + take]
                        .copy_from_slice(&chunk[offset..offset + take]);
                    self.bytes_read += take;
                    offset += take;

                    if self.bytes_read == self.packet_length {
                        frames.push(Frame {
                            opcode: self.buffer[0].into(),
                            body: Bytes::copy_from_slice(&self.buffer[1..self.packet_length]),
                        });
                        self.bytes_read = 0;
                        self.packet_length = 0;
                        self.state = ReadState::WaitingForLength;
                    }
                }
            }
        }

        Ok(frames)
    }
}
