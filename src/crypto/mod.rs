//! # Secure Channel Primitives
//!
//! Key agreement ([`dh`]) and the authenticated message envelope
//! ([`envelope`]). Session-level gating (who encrypts what, and when)
//! lives with the session, not here.

pub mod dh;
pub mod envelope;

pub use dh::{KeyPair, SharedKey};
