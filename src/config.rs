//! # Configuration Management
//!
//! Centralized configuration for the casting session engine.
//!
//! Protocol-level constants live here alongside a structured, validated
//! [`SessionConfig`] used when opening connections.
//!
//! ## Configuration Sources
//! - Direct instantiation with defaults
//! - Environment-specific overrides via `from_env()`

use crate::error::{CastError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Highest protocol version this engine negotiates.
pub const PROTOCOL_VERSION: u64 = 3;

/// Version field carried by key exchange and encrypted envelope messages.
pub const ENCRYPTION_VERSION: u64 = 1;

/// Largest frame (opcode + body) a peer may declare. Length prefixes above
/// this value are unrecoverable framing errors.
pub const MAX_PACKET_LENGTH: usize = 32_000;

/// Bytes in the little-endian length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Encrypted messages that arrive before key agreement completes are held
/// back; past this count the oldest is dropped.
pub const MAX_QUEUED_ENCRYPTED: usize = 15;

/// Delay between reconnect attempts after a session is lost.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Per-session configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Largest frame accepted from the peer
    pub max_packet_length: usize,

    /// Size of the transport read buffer
    pub read_buffer_size: usize,

    /// Timeout for connection attempts
    #[serde(with = "duration_serde")]
    pub connect_timeout: Duration,

    /// Whether to automatically reconnect on connection loss
    pub auto_reconnect: bool,

    /// Delay between reconnect attempts
    #[serde(with = "duration_serde")]
    pub reconnect_delay: Duration,

    /// Cap on encrypted messages queued before key agreement completes
    pub queued_encrypted_limit: usize,

    /// Optional display name announced during the initial exchange
    pub display_name: Option<String>,

    /// Optional application name announced during the initial exchange
    pub app_name: Option<String>,

    /// Optional application version announced during the initial exchange
    pub app_version: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_packet_length: MAX_PACKET_LENGTH,
            read_buffer_size: 1024,
            connect_timeout: Duration::from_secs(5),
            auto_reconnect: true,
            reconnect_delay: RECONNECT_DELAY,
            queued_encrypted_limit: MAX_QUEUED_ENCRYPTED,
            display_name: None,
            app_name: None,
            app_version: None,
        }
    }
}

impl SessionConfig {
    /// Load configuration from environment variables, starting from defaults.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(timeout) = std::env::var("CAST_PROTOCOL_CONNECT_TIMEOUT_MS") {
            if let Ok(val) = timeout.parse::<u64>() {
                config.connect_timeout = Duration::from_millis(val);
            }
        }

        if let Ok(delay) = std::env::var("CAST_PROTOCOL_RECONNECT_DELAY_MS") {
            if let Ok(val) = delay.parse::<u64>() {
                config.reconnect_delay = Duration::from_millis(val);
            }
        }

        if let Ok(reconnect) = std::env::var("CAST_PROTOCOL_AUTO_RECONNECT") {
            config.auto_reconnect = reconnect == "1" || reconnect.eq_ignore_ascii_case("true");
        }

        if let Ok(name) = std::env::var("CAST_PROTOCOL_DISPLAY_NAME") {
            config.display_name = Some(name);
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Validate the configuration for common issues and misconfigurations.
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.max_packet_length < LENGTH_PREFIX_SIZE + 1 {
            errors.push("Max packet length too small to hold a frame".to_string());
        } else if self.max_packet_length > MAX_PACKET_LENGTH {
            errors.push(format!(
                "Max packet length {} exceeds protocol limit {}",
                self.max_packet_length, MAX_PACKET_LENGTH
            ));
        }

        if self.read_buffer_size == 0 {
            errors.push("Read buffer size must be greater than 0".to_string());
        }

        if self.connect_timeout.as_millis() < 100 {
            errors.push("Connect timeout too short (minimum: 100ms)".to_string());
        }

        if self.reconnect_delay.as_millis() < 10 {
            errors.push("Reconnect delay too short (minimum: 10ms)".to_string());
        } else if self.reconnect_delay.as_secs() > 60 {
            errors.push("Reconnect delay too long (maximum: 60s)".to_string());
        }

        if self.queued_encrypted_limit == 0 {
            errors.push("Queued encrypted limit must be greater than 0".to_string());
        }

        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(CastError::Config(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
