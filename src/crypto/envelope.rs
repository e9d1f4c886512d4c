//! # Encrypted Envelope
//!
//! Seals a [`DecryptedMessage`] (inner opcode + serialized body) into an
//! [`EncryptedEnvelope`] with AES-256-GCM under the key agreed via
//! [`KeyPair`]. Every seal draws a fresh random 96-bit IV; the
//! authentication tag rides at the end of the ciphertext blob.
//!
//! Opening a tampered or wrongly-keyed envelope fails the tag check and
//! returns a recoverable [`CastError::Crypto`]; callers drop the message
//! and keep the session.
//!
//! [`KeyPair`]: crate::crypto::dh::KeyPair

use crate::config::ENCRYPTION_VERSION;
use crate::error::{CastError, Result};
use crate::protocol::message::{DecryptedMessage, EncryptedEnvelope};
use crate::protocol::packet::Packet;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key, Nonce};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

/// Seal a packet for the wire.
pub fn seal(key: &[u8; 32], packet: &Packet) -> Result<EncryptedEnvelope> {
    let inner = DecryptedMessage {
        opcode: packet.opcode().as_u8(),
        message: packet.body_json()?,
    };
    let plaintext = serde_json::to_vec(&inner)
        .map_err(|e| CastError::Crypto(format!("envelope serialization failed: {e}")))?;

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let iv = Aes256Gcm::generate_nonce(&mut OsRng);
    let blob = cipher
        .encrypt(&iv, plaintext.as_ref())
        .map_err(|_| CastError::Crypto("encryption failed".into()))?;

    Ok(EncryptedEnvelope {
        version: ENCRYPTION_VERSION,
        iv: BASE64.encode(iv),
        blob: BASE64.encode(blob),
    })
}

/// Open an envelope back into its inner message.
pub fn open(key: &[u8; 32], envelope: &EncryptedEnvelope) -> Result<DecryptedMessage> {
    if envelope.version != ENCRYPTION_VERSION {
        return Err(CastError::Crypto(format!(
            "unsupported envelope version {}",
            envelope.version
        )));
    }

    let iv = BASE64
        .decode(&envelope.iv)
        .map_err(|e| CastError::Crypto(format!("invalid iv base64: {e}")))?;
    if iv.len() != 12 {
        return Err(CastError::Crypto(format!("bad iv length {}", iv.len())));
    }
    let blob = BASE64
        .decode(&envelope.blob)
        .map_err(|e| CastError::Crypto(format!("invalid blob base64: {e}")))?;

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let plaintext = cipher
        .decrypt(Nonce::from_slice(&iv), blob.as_ref())
        .map_err(|_| CastError::Crypto("decryption failed: bad key or tampered blob".into()))?;

    serde_json::from_slice(&plaintext)
        .map_err(|e| CastError::Crypto(format!("envelope payload malformed: {e}")))
}

/// Decode the inner message back into a packet.
pub fn unwrap_packet(inner: &DecryptedMessage) -> Result<Packet> {
    let body = inner.message.as_deref().unwrap_or("");
    Packet::decode(inner.opcode.into(), body.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::message::{PlayMessage, SeekMessage};

    fn test_key() -> [u8; 32] {
        [7u8; 32]
    }

    #[test]
    fn seal_open_round_trip() {
        let packet = Packet::Play(PlayMessage {
            container: "text/html".to_string(),
            ..Default::default()
        });

        let envelope = seal(&test_key(), &packet).unwrap();
        assert_eq!(envelope.version, ENCRYPTION_VERSION);

        let inner = open(&test_key(), &envelope).unwrap();
        assert_eq!(inner.opcode, 1);
        assert_eq!(unwrap_packet(&inner).unwrap(), packet);
    }

    #[test]
    fn each_seal_uses_a_fresh_iv() {
        let packet = Packet::Seek(SeekMessage { time: 1.0 });

        let first = seal(&test_key(), &packet).unwrap();
        let second = seal(&test_key(), &packet).unwrap();
        assert_ne!(first.iv, second.iv);
        assert_ne!(first.blob, second.blob);

        // both still decrypt to the same plaintext
        assert_eq!(
            open(&test_key(), &first).unwrap(),
            open(&test_key(), &second).unwrap()
        );
    }

    #[test]
    fn wrong_key_fails_closed() {
        let envelope = seal(&test_key(), &Packet::Pause).unwrap();
        let err = open(&[8u8; 32], &envelope).unwrap_err();
        assert!(matches!(err, CastError::Crypto(_)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn tampered_blob_fails_tag_check() {
        let mut envelope = seal(&test_key(), &Packet::Pause).unwrap();
        let mut blob = BASE64.decode(&envelope.blob).unwrap();
        blob[0] ^= 0xff;
        envelope.blob = BASE64.encode(blob);

        assert!(open(&test_key(), &envelope).is_err());
    }

    #[test]
    fn bodyless_packet_seals_without_message_field() {
        let envelope = seal(&test_key(), &Packet::Pause).unwrap();
        let inner = open(&test_key(), &envelope).unwrap();
        assert_eq!(inner.opcode, 2);
        assert_eq!(inner.message, None);
        assert_eq!(unwrap_packet(&inner).unwrap(), Packet::Pause);
    }

    #[test]
    fn rejects_unknown_envelope_version() {
        let mut envelope = seal(&test_key(), &Packet::Pause).unwrap();
        envelope.version = 2;
        assert!(open(&test_key(), &envelope).is_err());
    }
}
