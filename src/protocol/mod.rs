//! # Protocol Layer
//!
//! Opcode table, typed message schemas, the exhaustive packet union, and
//! the handler registry that delivers decoded packets.

pub mod dispatcher;
pub mod message;
pub mod opcode;
pub mod packet;

pub use dispatcher::{Dispatcher, SubscriptionId};
pub use opcode::Opcode;
pub use packet::Packet;
