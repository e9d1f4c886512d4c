//! # Services
//!
//! High-level surfaces built on the session layer.

pub mod client;

pub use client::CastClient;
