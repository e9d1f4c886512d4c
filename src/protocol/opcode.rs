//! # Opcode Table
//!
//! Single-byte operation codes carried after the length prefix of every
//! frame. Values 0-19 form the published table; 20 and 21 carry the key
//! exchange and encrypted envelope on secured transports. Any other value
//! is preserved as [`Opcode::Unknown`] so newer peers are tolerated.

/// Operation code of a frame.
#[derive(Debug, PartialEq, Eq, Copy, Clone, Hash)]
pub enum Opcode {
    /// Not used
    None,
    /// Sender message to play media content, body is a PlayMessage
    Play,
    /// Sender message to pause media content, no body
    Pause,
    /// Sender message to resume media content, no body
    Resume,
    /// Sender message to stop media content, no body
    Stop,
    /// Sender message to seek, body is a SeekMessage
    Seek,
    /// Receiver message carrying an updated playback state
    PlaybackUpdate,
    /// Receiver message carrying a volume change
    VolumeUpdate,
    /// Sender message to change volume
    SetVolume,
    /// Receiver message reporting a playback error
    PlaybackError,
    /// Sender message to change playback speed
    SetSpeed,
    /// Message announcing the sending party's protocol version
    Version,
    /// Liveness probe, no body
    Ping,
    /// Liveness response, no body
    Pong,
    /// Device information exchanged after version negotiation
    Initial,
    /// Receiver broadcast when any sender started playback
    PlayUpdate,
    /// Sender message selecting a playlist item
    SetPlaylistItem,
    /// Sender message subscribing to a receiver event
    SubscribeEvent,
    /// Sender message unsubscribing from a receiver event
    UnsubscribeEvent,
    /// Receiver message reporting a subscribed event
    Event,
    /// Secure-channel public key exchange
    KeyExchange,
    /// Secure-channel encrypted envelope
    Encrypted,
    /// Any value outside the table, preserved for logging
    Unknown(u8),
}

impl From<u8> for Opcode {
    fn from(value: u8) -> Self {
        match value {
            0 => Opcode::None,
            1 => Opcode::Play,
            2 => Opcode::Pause,
            3 => Opcode::Resume,
            4 => Opcode::Stop,
            5 => Opcode::Seek,
            6 => Opcode::PlaybackUpdate,
            7 => Opcode::VolumeUpdate,
            8 => Opcode::SetVolume,
            9 => Opcode::PlaybackError,
            10 => Opcode::SetSpeed,
            11 => Opcode::Version,
            12 => Opcode::Ping,
            13 => Opcode::Pong,
            14 => Opcode::Initial,
            15 => Opcode::PlayUpdate,
            16 => Opcode::SetPlaylistItem,
            17 => Opcode::SubscribeEvent,
            18 => Opcode::UnsubscribeEvent,
            19 => Opcode::Event,
            20 => Opcode::KeyExchange,
            21 => Opcode::Encrypted,
            other => Opcode::Unknown(other),
        }
    }
}

impl Opcode {
    /// Wire value of this opcode.
    pub fn as_u8(self) -> u8 {
        match self {
            Opcode::None => 0,
            Opcode::Play => 1,
            Opcode::Pause => 2,
            Opcode::Resume => 3,
            Opcode::Stop => 4,
            Opcode::Seek => 5,
            Opcode::PlaybackUpdate => 6,
            Opcode::VolumeUpdate => 7,
            Opcode::SetVolume => 8,
            Opcode::PlaybackError => 9,
            Opcode::SetSpeed => 10,
            Opcode::Version => 11,
            Opcode::Ping => 12,
            Opcode::Pong => 13,
            Opcode::Initial => 14,
            Opcode::PlayUpdate => 15,
            Opcode::SetPlaylistItem => 16,
            Opcode::SubscribeEvent => 17,
            Opcode::UnsubscribeEvent => 18,
            Opcode::Event => 19,
            Opcode::KeyExchange => 20,
            Opcode::Encrypted => 21,
            Opcode::Unknown(value) => value,
        }
    }
}
