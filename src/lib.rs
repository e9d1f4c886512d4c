//! # Cast Protocol
//!
//! Session protocol engine for local-network media casting.
//!
//! Everything between a connected socket and application callbacks lives
//! here: the length-prefixed frame codec, the chunking-tolerant packet
//! reassembler, an optional Diffie-Hellman secure channel with
//! authenticated envelopes, the opcode dispatcher, session orchestration,
//! and a generation-time reconciler for out-of-order state updates.
//!
//! ## Layers
//! - [`core`]: frame byte layout and streaming reassembly
//! - [`crypto`]: key agreement and the encrypted envelope
//! - [`protocol`]: opcodes, typed message schemas, packet decoding, dispatch
//! - [`session`]: per-connection orchestration and update reconciliation
//! - [`transport`]: TCP and WebSocket bindings behind one read/write pair
//! - [`service`]: client-level connect and reconnect policy
//!
//! ## Example
//! ```rust,no_run
//! use cast_protocol::config::SessionConfig;
//! use cast_protocol::protocol::Packet;
//! use cast_protocol::service::CastClient;
//! use cast_protocol::transport::{DeviceInfo, ProtocolType};
//!
//! #[tokio::main]
//! async fn main() -> cast_protocol::error::Result<()> {
//!     let device = DeviceInfo::new(
//!         "Living Room",
//!         vec!["192.168.1.20".parse().unwrap()],
//!         46899,
//!         ProtocolType::Tcp,
//!     );
//!
//!     let client = CastClient::new(device, SessionConfig::default())?;
//!     client.dispatcher().subscribe(|packet| {
//!         if let Packet::PlaybackUpdate(update) = packet {
//!             println!("state: {:?}", update.state);
//!         }
//!     })?;
//!
//!     client.start().await?;
//!     client.pause().await?;
//!     client.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod crypto;
pub mod error;
pub mod protocol;
pub mod service;
pub mod session;
pub mod transport;

pub use config::SessionConfig;
pub use error::{CastError, Result};
pub use protocol::{Dispatcher, Opcode, Packet};
pub use service::CastClient;
pub use session::{Session, SessionState, UpdateReconciler};
pub use transport::{DeviceInfo, ProtocolType};
