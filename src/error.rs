//! # Error Types
//!
//! Error handling for the casting session protocol.
//!
//! This module defines all error variants that can occur during session
//! operations, from low-level I/O failures to protocol violations.
//!
//! ## Error Categories
//! - **I/O Errors**: Network and transport failures
//! - **Framing Errors**: Oversized or malformed length prefixes
//! - **Body Errors**: JSON bodies that fail to parse
//! - **Cryptographic Errors**: Key agreement and envelope failures
//!
//! Only framing and transport errors tear a session down; body and
//! cryptographic errors drop the offending message and the session survives.

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Dispatcher-related error messages
    pub const ERR_DISPATCHER_WRITE_LOCK: &str = "Failed to acquire write lock on dispatcher";
    pub const ERR_DISPATCHER_READ_LOCK: &str = "Failed to acquire read lock on dispatcher";

    /// Session errors
    pub const ERR_READER_TAKEN: &str = "Session receive loop already running";

    /// Key exchange errors
    pub const ERR_KEY_EXCHANGE_VERSION: &str = "Unsupported key exchange version";
    pub const ERR_PEER_KEY_INVALID: &str = "Peer public key failed to parse";
}

/// Primary error type for all protocol operations.
#[derive(Error, Debug)]
pub enum CastError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The length prefix declared a frame the buffer cannot hold. Fatal:
    /// the byte stream cannot be resynchronized past this point.
    #[error("Packet too large: {declared} bytes (maximum {max})")]
    PacketTooLarge { declared: usize, max: usize },

    /// The length prefix declared a frame with no opcode byte. Fatal.
    #[error("Invalid frame header")]
    InvalidHeader,

    /// A frame body failed to parse as the schema its opcode requires.
    /// Recoverable: the message is dropped.
    #[error("Malformed body for opcode {opcode}: {reason}")]
    MalformedBody { opcode: u8, reason: String },

    /// Key agreement, DER parsing, or envelope seal/open failure.
    /// Recoverable for inbound envelopes: the message is dropped.
    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Session closed")]
    Closed,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl CastError {
    /// Whether this error must terminate the session's receive loop.
    ///
    /// Malformed bodies and envelope failures are contained to the single
    /// message that produced them; framing and transport failures are not.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CastError::Io(_)
                | CastError::PacketTooLarge { .. }
                | CastError::InvalidHeader
                | CastError::Transport(_)
                | CastError::Closed
        )
    }
}

/// Type alias for Results using CastError
pub type Result<T> = std::result::Result<T, CastError>;
