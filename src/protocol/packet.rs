//! # Packet Decoding
//!
//! [`Packet`] is the exhaustive union of every message the protocol can
//! carry, one variant per opcode. Decoding is a single static match from
//! opcode to schema; there is no runtime registration and no way to decode
//! a body against the wrong schema.
//!
//! A body that fails to parse yields [`CastError::MalformedBody`], which
//! callers treat as a dropped message, not a dead session.

use crate::core::frame::Frame;
use crate::error::{CastError, Result};
use crate::protocol::message::*;
use crate::protocol::opcode::Opcode;

/// A fully decoded protocol message.
#[derive(Debug, Clone, PartialEq)]
#[allow(clippy::large_enum_variant)]
pub enum Packet {
    None,
    Play(PlayMessage),
    Pause,
    Resume,
    Stop,
    Seek(SeekMessage),
    PlaybackUpdate(PlaybackUpdateMessage),
    VolumeUpdate(VolumeUpdateMessage),
    SetVolume(SetVolumeMessage),
    PlaybackError(PlaybackErrorMessage),
    SetSpeed(SetSpeedMessage),
    Version(VersionMessage),
    Ping,
    Pong,
    Initial(InitialMessage),
    PlayUpdate(PlayUpdateMessage),
    SetPlaylistItem(SetPlaylistItemMessage),
    SubscribeEvent(SubscribeEventMessage),
    UnsubscribeEvent(UnsubscribeEventMessage),
    Event(EventMessage),
    KeyExchange(KeyExchangeMessage),
    Encrypted(EncryptedEnvelope),
    /// Opcode outside the table; ignored but kept for logging.
    Unknown(u8),
}

fn parse<T: serde::de::DeserializeOwned>(opcode: Opcode, body: &[u8]) -> Result<T> {
    serde_json::from_slice(body).map_err(|e| CastError::MalformedBody {
        opcode: opcode.as_u8(),
        reason: e.to_string(),
    })
}

impl Packet {
    /// Decode a frame body against the schema its opcode requires.
    pub fn decode(opcode: Opcode, body: &[u8]) -> Result<Self> {
        Ok(match opcode {
            Opcode::None => Packet::None,
            Opcode::Play => Packet::Play(parse(opcode, body)?),
            Opcode::Pause => Packet::Pause,
            Opcode::Resume => Packet::Resume,
            Opcode::Stop => Packet::Stop,
            Opcode::Seek => Packet::Seek(parse(opcode, body)?),
            Opcode::PlaybackUpdate => Packet::PlaybackUpdate(parse(opcode, body)?),
            Opcode::VolumeUpdate => Packet::VolumeUpdate(parse(opcode, body)?),
            Opcode::SetVolume => Packet::SetVolume(parse(opcode, body)?),
            Opcode::PlaybackError => Packet::PlaybackError(parse(opcode, body)?),
            Opcode::SetSpeed => Packet::SetSpeed(parse(opcode, body)?),
            Opcode::Version => Packet::Version(parse(opcode, body)?),
            Opcode::Ping => Packet::Ping,
            Opcode::Pong => Packet::Pong,
            Opcode::Initial => Packet::Initial(parse(opcode, body)?),
            Opcode::PlayUpdate => Packet::PlayUpdate(parse(opcode, body)?),
            Opcode::SetPlaylistItem => Packet::SetPlaylistItem(parse(opcode, body)?),
            Opcode::SubscribeEvent => Packet::SubscribeEvent(parse(opcode, body)?),
            Opcode::UnsubscribeEvent => Packet::UnsubscribeEvent(parse(opcode, body)?),
            Opcode::Event => Packet::Event(parse(opcode, body)?),
            Opcode::KeyExchange => Packet::KeyExchange(parse(opcode, body)?),
            Opcode::Encrypted => Packet::Encrypted(parse(opcode, body)?),
            Opcode::Unknown(value) => Packet::Unknown(value),
        })
    }

    /// Decode a whole frame.
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        Self::decode(frame.opcode, &frame.body)
    }

    /// The opcode this packet travels under.
    pub fn opcode(&self) -> Opcode {
        match self {
            Packet::None => Opcode::None,
            Packet::Play(_) => Opcode::Play,
            Packet::Pause => Opcode::Pause,
            Packet::Resume => Opcode::Resume,
            Packet::Stop => Opcode::Stop,
            Packet::Seek(_) => Opcode::Seek,
            Packet::PlaybackUpdate(_) => Opcode::PlaybackUpdate,
            Packet::VolumeUpdate(_) => Opcode::VolumeUpdate,
            Packet::SetVolume(_) => Opcode::SetVolume,
            Packet::PlaybackError(_) => Opcode::PlaybackError,
            Packet::SetSpeed(_) => Opcode::SetSpeed,
            Packet::Version(_) => Opcode::Version,
            Packet::Ping => Opcode::Ping,
            Packet::Pong => Opcode::Pong,
            Packet::Initial(_) => Opcode::Initial,
            Packet::PlayUpdate(_) => Opcode::PlayUpdate,
            Packet::SetPlaylistItem(_) => Opcode::SetPlaylistItem,
            Packet::SubscribeEvent(_) => Opcode::SubscribeEvent,
            Packet::UnsubscribeEvent(_) => Opcode::UnsubscribeEvent,
            Packet::Event(_) => Opcode::Event,
            Packet::KeyExchange(_) => Opcode::KeyExchange,
            Packet::Encrypted(_) => Opcode::Encrypted,
            Packet::Unknown(value) => Opcode::Unknown(*value),
        }
    }

    /// Serialized JSON body, `None` for body-less packets.
    pub fn body_json(&self) -> Result<Option<String>> {
        fn enc<T: serde::Serialize>(opcode: Opcode, value: &T) -> Result<Option<String>> {
            serde_json::to_string(value)
                .map(Some)
                .map_err(|e| CastError::MalformedBody {
                    opcode: opcode.as_u8(),
                    reason: e.to_string(),
                })
        }

        match self {
            Packet::None
            | Packet::Pause
            | Packet::Resume
            | Packet::Stop
            | Packet::Ping
            | Packet::Pong
            | Packet::Unknown(_) => Ok(None),
            Packet::Play(m) => enc(self.opcode(), m),
            Packet::Seek(m) => enc(self.opcode(), m),
            Packet::PlaybackUpdate(m) => enc(self.opcode(), m),
            Packet::VolumeUpdate(m) => enc(self.opcode(), m),
            Packet::SetVolume(m) => enc(self.opcode(), m),
            Packet::PlaybackError(m) => enc(self.opcode(), m),
            Packet::SetSpeed(m) => enc(self.opcode(), m),
            Packet::Version(m) => enc(self.opcode(), m),
            Packet::Initial(m) => enc(self.opcode(), m),
            Packet::PlayUpdate(m) => enc(self.opcode(), m),
            Packet::SetPlaylistItem(m) => enc(self.opcode(), m),
            Packet::SubscribeEvent(m) => enc(self.opcode(), m),
            Packet::UnsubscribeEvent(m) => enc(self.opcode(), m),
            Packet::Event(m) => enc(self.opcode(), m),
            Packet::KeyExchange(m) => enc(self.opcode(), m),
            Packet::Encrypted(m) => enc(self.opcode(), m),
        }
    }

    /// Encode to a wire frame.
    pub fn to_frame(&self) -> Result<Frame> {
        Ok(match self.body_json()? {
            Some(body) => Frame::new(self.opcode(), body.into_bytes()),
            None => Frame::empty(self.opcode()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bodyless_opcodes_decode_with_empty_body() {
        assert_eq!(Packet::decode(Opcode::Pause, b"").unwrap(), Packet::Pause);
        assert_eq!(Packet::decode(Opcode::Ping, b"").unwrap(), Packet::Ping);
        assert_eq!(Packet::decode(Opcode::Stop, b"").unwrap(), Packet::Stop);
    }

    #[test]
    fn malformed_body_is_recoverable() {
        let err = Packet::decode(Opcode::Seek, b"{not json").unwrap_err();
        match &err {
            CastError::MalformedBody { opcode, .. } => assert_eq!(*opcode, 5),
            other => panic!("expected MalformedBody, got {other:?}"),
        }
        assert!(!err.is_fatal());
    }

    #[test]
    fn unknown_opcode_is_preserved() {
        assert_eq!(
            Packet::decode(Opcode::Unknown(99), b"whatever").unwrap(),
            Packet::Unknown(99)
        );
    }

    #[test]
    fn seek_round_trip() {
        let packet = Packet::Seek(SeekMessage { time: 12.5 });
        let frame = packet.to_frame().unwrap();
        assert_eq!(frame.opcode, Opcode::Seek);
        assert_eq!(Packet::from_frame(&frame).unwrap(), packet);
    }

    #[test]
    fn version_body_snapshot() {
        let packet = Packet::Version(VersionMessage { version: 3 });
        assert_eq!(
            packet.body_json().unwrap().as_deref(),
            Some(r#"{"version":3}"#)
        );
    }

    #[test]
    fn pause_frame_has_no_body() {
        let frame = Packet::Pause.to_frame().unwrap();
        assert!(frame.body.is_empty());
        assert_eq!(&frame.encode()[..], &[0x01, 0x00, 0x00, 0x00, 0x02]);
    }

    #[test]
    fn volume_update_decodes_generation_time() {
        let packet = Packet::decode(
            Opcode::VolumeUpdate,
            br#"{"generationTime":100,"volume":0.5}"#,
        )
        .unwrap();
        match packet {
            Packet::VolumeUpdate(m) => {
                assert_eq!(m.generation_time, 100);
                assert_eq!(m.volume, 0.5);
            }
            other => panic!("expected VolumeUpdate, got {other:?}"),
        }
    }
}
