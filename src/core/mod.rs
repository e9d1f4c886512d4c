//! # Core Framing
//!
//! Low-level byte handling for the protocol: the frame codec and the
//! streaming reassembler that recovers frame boundaries from chunked reads.

pub mod frame;
pub mod reassembler;

pub use frame::Frame;
pub use reassembler::Reassembler;
