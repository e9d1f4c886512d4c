//! # Wire Message Schemas
//!
//! Typed JSON bodies for every opcode that carries one. Field names follow
//! the published wire format (camelCase); optional fields are omitted from
//! serialized output rather than sent as null.
//!
//! A few objects are tagged by an integer `type` field and need manual
//! serde implementations; everything else derives.

use std::collections::HashMap;

use serde::{de, ser, Deserialize, Serialize};
use serde_json::{json, Value};
use serde_repr::{Deserialize_repr, Serialize_repr};
use serde_with::skip_serializing_none;

macro_rules! get_from_map {
    ($map:expr, $key:expr) => {
        $map.get($key).ok_or(de::Error::missing_field($key))
    };
}

/// Playback state reported by the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize_repr, Serialize_repr)]
#[repr(u8)]
pub enum PlaybackState {
    #[default]
    Idle = 0,
    Playing = 1,
    Paused = 2,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataObject {
    Generic {
        title: Option<String>,
        thumbnail_url: Option<String>,
        custom: Option<Value>,
    },
}

impl Serialize for MetadataObject {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            MetadataObject::Generic {
                title,
                thumbnail_url,
                custom,
            } => {
                let mut map = serde_json::Map::new();
                map.insert("type".to_owned(), json!(0u64));
                map.insert(
                    "title".to_owned(),
                    match title {
                        Some(t) => Value::String(t.to_owned()),
                        None => Value::Null,
                    },
                );
                map.insert(
                    "thumbnailUrl".to_owned(),
                    match thumbnail_url {
                        Some(t) => Value::String(t.to_owned()),
                        None => Value::Null,
                    },
                );
                if let Some(custom) = custom {
                    map.insert("custom".to_owned(), custom.clone());
                }
                map.serialize(serializer)
            }
        }
    }
}

impl<'de> Deserialize<'de> for MetadataObject {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let mut map = serde_json::Map::deserialize(deserializer)?;

        let type_ = map
            .remove("type")
            .ok_or(de::Error::missing_field("type"))?
            .as_u64()
            .ok_or(de::Error::custom("`type` is not an integer"))?;
        let rest = Value::Object(map);

        match type_ {
            0 => {
                let title = match rest.get("title") {
                    Some(t) => Some(
                        t.as_str()
                            .ok_or(de::Error::custom("`title` is not a string"))?
                            .to_owned(),
                    ),
                    None => None,
                };
                let thumbnail_url = match rest.get("thumbnailUrl") {
                    Some(t) => Some(
                        t.as_str()
                            .ok_or(de::Error::custom("`thumbnailUrl` is not a string"))?
                            .to_owned(),
                    ),
                    None => None,
                };
                Ok(Self::Generic {
                    title,
                    thumbnail_url,
                    custom: rest.get("custom").cloned(),
                })
            }
            _ => Err(de::Error::custom(format!("Unknown metadata type {type_}"))),
        }
    }
}

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlayMessage {
    /// The MIME type (video/mp4)
    pub container: String,
    /// The URL to load (optional)
    pub url: Option<String>,
    /// The content to load (i.e. a DASH manifest, json content, optional)
    pub content: Option<String>,
    /// The time to start playing in seconds
    pub time: Option<f64>,
    /// The desired volume (0-1)
    pub volume: Option<f64>,
    /// The factor to multiply playback speed by (defaults to 1.0)
    pub speed: Option<f64>,
    /// HTTP request headers to add to the play request Map<string, string>
    pub headers: Option<HashMap<String, String>>,
    pub metadata: Option<MetadataObject>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize_repr, Serialize_repr)]
#[repr(u8)]
pub enum ContentType {
    #[default]
    Playlist = 0,
}

#[skip_serializing_none]
#[derive(Debug, PartialEq, Clone, Default, Serialize, Deserialize)]
pub struct MediaItem {
    /// The MIME type (video/mp4)
    pub container: String,
    /// The URL to load (optional)
    pub url: Option<String>,
    /// The content to load (i.e. a DASH manifest, json content, optional)
    pub content: Option<String>,
    /// The time to start playing in seconds
    pub time: Option<f64>,
    /// The desired volume (0-1)
    pub volume: Option<f64>,
    /// The factor to multiply playback speed by (defaults to 1.0)
    pub speed: Option<f64>,
    /// Indicates if the receiver should preload the media item
    pub cache: Option<bool>,
    /// Indicates how long the item content is presented on screen in seconds
    #[serde(rename = "showDuration")]
    pub show_duration: Option<f64>,
    /// HTTP request headers to add to the play request Map<string, string>
    pub headers: Option<HashMap<String, String>>,
    pub metadata: Option<MetadataObject>,
}

#[skip_serializing_none]
#[derive(Debug, PartialEq, Clone, Default, Serialize, Deserialize)]
pub struct PlaylistContent {
    #[serde(rename = "contentType")]
    pub variant: ContentType,
    pub items: Vec<MediaItem>,
    /// Start position of the first item to play from the playlist
    pub offset: Option<u64>,
    /// The desired volume (0-1)
    pub volume: Option<f64>,
    /// The factor to multiply playback speed by (defaults to 1.0)
    pub speed: Option<f64>,
    /// Count of media items should be pre-loaded forward from the current view index
    #[serde(rename = "forwardCache")]
    pub forward_cache: Option<u64>,
    /// Count of media items should be pre-loaded backward from the current view index
    #[serde(rename = "backwardCache")]
    pub backward_cache: Option<u64>,
    pub metadata: Option<MetadataObject>,
}

#[skip_serializing_none]
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct PlaybackUpdateMessage {
    /// The time the packet was generated (unix time milliseconds)
    #[serde(rename = "generationTime")]
    pub generation_time: u64,
    /// The playback state
    pub state: PlaybackState,
    /// The current time playing in seconds
    pub time: Option<f64>,
    /// The duration in seconds
    pub duration: Option<f64>,
    /// The playback speed factor
    pub speed: Option<f64>,
    /// The playlist item index currently being played on receiver
    #[serde(rename = "itemIndex")]
    pub item_index: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct VolumeUpdateMessage {
    /// The time the packet was generated (unix time milliseconds)
    #[serde(rename = "generationTime")]
    pub generation_time: u64,
    /// The current volume (0-1)
    pub volume: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PlaybackErrorMessage {
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct VersionMessage {
    pub version: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeekMessage {
    pub time: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SetVolumeMessage {
    pub volume: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SetSpeedMessage {
    pub speed: f64,
}

/// Device information exchanged after version negotiation. The receiver's
/// copy is a superset of the sender's, so one schema decodes both.
#[skip_serializing_none]
#[derive(Debug, PartialEq, Clone, Default, Serialize, Deserialize)]
pub struct InitialMessage {
    #[serde(rename = "displayName")]
    pub display_name: Option<String>,
    #[serde(rename = "appName")]
    pub app_name: Option<String>,
    #[serde(rename = "appVersion")]
    pub app_version: Option<String>,
    #[serde(rename = "playData")]
    pub play_data: Option<PlayMessage>,
}

#[skip_serializing_none]
#[derive(Debug, PartialEq, Clone, Default, Serialize, Deserialize)]
pub struct PlayUpdateMessage {
    #[serde(rename = "generationTime")]
    pub generation_time: Option<u64>,
    #[serde(rename = "playData")]
    pub play_data: Option<PlayMessage>,
}

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct SetPlaylistItemMessage {
    #[serde(rename = "itemIndex")]
    pub item_index: u64,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum EventSubscribeObject {
    MediaItemStart,
    MediaItemEnd,
    MediaItemChanged,
    KeyDown { keys: Vec<String> },
    KeyUp { keys: Vec<String> },
}

impl Serialize for EventSubscribeObject {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut map = serde_json::Map::new();
        let type_val: u64 = match self {
            EventSubscribeObject::MediaItemStart => 0,
            EventSubscribeObject::MediaItemEnd => 1,
            EventSubscribeObject::MediaItemChanged => 2,
            EventSubscribeObject::KeyDown { .. } => 3,
            EventSubscribeObject::KeyUp { .. } => 4,
        };

        map.insert("type".to_owned(), json!(type_val));

        let keys = match self {
            EventSubscribeObject::KeyDown { keys } => Some(keys),
            EventSubscribeObject::KeyUp { keys } => Some(keys),
            _ => None,
        };
        if let Some(keys) = keys {
            map.insert("keys".to_owned(), json!(keys));
        }

        map.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for EventSubscribeObject {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let mut map = serde_json::Map::deserialize(deserializer)?;
        let type_ = map
            .remove("type")
            .ok_or(de::Error::missing_field("type"))?
            .as_u64()
            .ok_or(de::Error::custom("`type` is not an integer"))?;
        let rest = Value::Object(map);

        match type_ {
            0 => Ok(Self::MediaItemStart),
            1 => Ok(Self::MediaItemEnd),
            2 => Ok(Self::MediaItemChanged),
            3 | 4 => {
                let keys = get_from_map!(rest, "keys")?
                    .as_array()
                    .ok_or(de::Error::custom("`keys` is not an array"))?
                    .iter()
                    .map(|v| v.as_str().map(|s| s.to_owned()))
                    .collect::<Option<Vec<String>>>()
                    .ok_or(de::Error::custom("`keys` is not an array of strings"))?;
                if type_ == 3 {
                    Ok(Self::KeyDown { keys })
                } else {
                    Ok(Self::KeyUp { keys })
                }
            }
            _ => Err(de::Error::custom(format!("Unknown event type {type_}"))),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct SubscribeEventMessage {
    pub event: EventSubscribeObject,
}

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct UnsubscribeEventMessage {
    pub event: EventSubscribeObject,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[repr(u8)]
pub enum EventType {
    MediaItemStart = 0,
    MediaItemEnd = 1,
    MediaItemChange = 2,
    KeyDown = 3,
    KeyUp = 4,
}

#[derive(Debug, PartialEq, Clone)]
#[allow(clippy::large_enum_variant)]
pub enum EventObject {
    MediaItem {
        variant: EventType,
        item: MediaItem,
    },
    Key {
        variant: EventType,
        key: String,
        repeat: bool,
        handled: bool,
    },
}

impl Serialize for EventObject {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut map = serde_json::Map::new();

        match self {
            EventObject::MediaItem { variant, item } => {
                map.insert("type".to_owned(), json!(*variant as u8));
                map.insert(
                    "item".to_owned(),
                    serde_json::to_value(item).map_err(ser::Error::custom)?,
                );
            }
            EventObject::Key {
                variant,
                key,
                repeat,
                handled,
            } => {
                map.insert("type".to_owned(), json!(*variant as u8));
                map.insert(
                    "key".to_owned(),
                    serde_json::to_value(key).map_err(ser::Error::custom)?,
                );
                map.insert(
                    "repeat".to_owned(),
                    serde_json::to_value(repeat).map_err(ser::Error::custom)?,
                );
                map.insert(
                    "handled".to_owned(),
                    serde_json::to_value(handled).map_err(ser::Error::custom)?,
                );
            }
        }

        map.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for EventObject {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        let mut map = serde_json::Map::deserialize(deserializer)?;
        let type_ = map
            .remove("type")
            .ok_or(de::Error::missing_field("type"))?
            .as_u64()
            .ok_or(de::Error::custom("`type` is not an integer"))?;
        let rest = Value::Object(map);

        match type_ {
            0 | 1 | 2 => {
                let variant = match type_ {
                    0 => EventType::MediaItemStart,
                    1 => EventType::MediaItemEnd,
                    _ => EventType::MediaItemChange,
                };
                let item = get_from_map!(rest, "item")?;
                Ok(Self::MediaItem {
                    variant,
                    item: MediaItem::deserialize(item).map_err(de::Error::custom)?,
                })
            }
            3 | 4 => {
                let variant = if type_ == 3 {
                    EventType::KeyDown
                } else {
                    EventType::KeyUp
                };
                Ok(Self::Key {
                    variant,
                    key: get_from_map!(rest, "key")?
                        .as_str()
                        .ok_or(de::Error::custom("`key` is not a string"))?
                        .to_owned(),
                    repeat: get_from_map!(rest, "repeat")?
                        .as_bool()
                        .ok_or(de::Error::custom("`repeat` is not a bool"))?,
                    handled: get_from_map!(rest, "handled")?
                        .as_bool()
                        .ok_or(de::Error::custom("`handled` is not a bool"))?,
                })
            }
            _ => Err(de::Error::custom(format!("Unknown event type {type_}"))),
        }
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct EventMessage {
    #[serde(rename = "generationTime")]
    pub generation_time: u64,
    pub event: EventObject,
}

/// Public key announcement opening the secure channel.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct KeyExchangeMessage {
    pub version: u64,
    /// Base64-encoded DER (X.509 SubjectPublicKeyInfo) public key
    #[serde(rename = "publicKey")]
    pub public_key: String,
}

/// Sealed envelope carried as the body of an encrypted frame.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    pub version: u64,
    /// Base64-encoded initialization vector
    pub iv: String,
    /// Base64-encoded ciphertext with the authentication tag appended
    pub blob: String,
}

/// Plaintext carried inside an [`EncryptedEnvelope`]: the inner opcode and
/// its serialized JSON body, absent for body-less opcodes.
#[skip_serializing_none]
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct DecryptedMessage {
    pub opcode: u8,
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    macro_rules! s {
        ($s:expr) => {
            ($s).to_string()
        };
    }

    #[test]
    fn serialize_metadata_object() {
        assert_eq!(
            &serde_json::to_string(&MetadataObject::Generic {
                title: Some(s!("abc")),
                thumbnail_url: Some(s!("def")),
                custom: None,
            })
            .unwrap(),
            r#"{"thumbnailUrl":"def","title":"abc","type":0}"#
        );
    }

    #[test]
    fn deserialize_metadata_object() {
        assert_eq!(
            serde_json::from_str::<MetadataObject>(
                r#"{"type":0,"title":"abc","thumbnailUrl":"def","custom":null}"#
            )
            .unwrap(),
            MetadataObject::Generic {
                title: Some(s!("abc")),
                thumbnail_url: Some(s!("def")),
                custom: Some(serde_json::Value::Null),
            }
        );
        assert_eq!(
            serde_json::from_str::<MetadataObject>(r#"{"type":0}"#).unwrap(),
            MetadataObject::Generic {
                title: None,
                thumbnail_url: None,
                custom: None,
            }
        );
        assert!(serde_json::from_str::<MetadataObject>(r#"{"type":1}"#).is_err());
    }

    #[test]
    fn serialize_event_sub_obj() {
        assert_eq!(
            &serde_json::to_string(&EventSubscribeObject::MediaItemStart).unwrap(),
            r#"{"type":0}"#
        );
        assert_eq!(
            &serde_json::to_string(&EventSubscribeObject::KeyDown {
                keys: vec![s!("abc"), s!("def")]
            })
            .unwrap(),
            r#"{"keys":["abc","def"],"type":3}"#
        );
        assert_eq!(
            &serde_json::to_string(&EventSubscribeObject::KeyUp { keys: vec![] }).unwrap(),
            r#"{"keys":[],"type":4}"#
        );
    }

    #[test]
    fn deserialize_event_sub_obj() {
        assert_eq!(
            serde_json::from_str::<EventSubscribeObject>(r#"{"type":2}"#).unwrap(),
            EventSubscribeObject::MediaItemChanged
        );
        assert_eq!(
            serde_json::from_str::<EventSubscribeObject>(r#"{"keys":["abc"],"type":4}"#).unwrap(),
            EventSubscribeObject::KeyUp { keys: vec![s!("abc")] }
        );
        assert!(serde_json::from_str::<EventSubscribeObject>(r#"{"type":5}"#).is_err());
    }

    #[test]
    fn event_obj_round_trip() {
        let key = EventObject::Key {
            variant: EventType::KeyDown,
            key: s!("ArrowLeft"),
            repeat: false,
            handled: true,
        };
        assert_eq!(
            &serde_json::to_string(&key).unwrap(),
            r#"{"handled":true,"key":"ArrowLeft","repeat":false,"type":3}"#
        );
        assert_eq!(
            serde_json::from_str::<EventObject>(
                r#"{"handled":true,"key":"ArrowLeft","repeat":false,"type":3}"#
            )
            .unwrap(),
            key
        );

        let item = EventObject::MediaItem {
            variant: EventType::MediaItemEnd,
            item: MediaItem {
                container: s!("video/mp4"),
                ..Default::default()
            },
        };
        assert_eq!(
            serde_json::to_string(&item).unwrap(),
            r#"{"item":{"container":"video/mp4"},"type":1}"#
        );
    }

    #[test]
    fn playback_update_omits_absent_fields() {
        let update = PlaybackUpdateMessage {
            generation_time: 1234,
            state: PlaybackState::Playing,
            time: Some(10.0),
            duration: None,
            speed: None,
            item_index: None,
        };
        assert_eq!(
            serde_json::to_string(&update).unwrap(),
            r#"{"generationTime":1234,"state":1,"time":10.0}"#
        );
    }

    #[test]
    fn decrypted_message_omits_empty_body() {
        let msg = DecryptedMessage {
            opcode: 2,
            message: None,
        };
        assert_eq!(serde_json::to_string(&msg).unwrap(), r#"{"opcode":2}"#);

        let msg = DecryptedMessage {
            opcode: 1,
            message: Some(s!(r#"{"container":"text/html"}"#)),
        };
        assert_eq!(
            serde_json::from_str::<DecryptedMessage>(&serde_json::to_string(&msg).unwrap())
                .unwrap(),
            msg
        );
    }

    #[test]
    fn playlist_content_snapshot() {
        assert_eq!(
            serde_json::to_string(&PlaylistContent {
                variant: ContentType::Playlist,
                items: vec![MediaItem {
                    container: s!("video/mp4"),
                    url: Some(s!("abc")),
                    ..Default::default()
                }],
                ..Default::default()
            })
            .unwrap(),
            r#"{"contentType":0,"items":[{"container":"video/mp4","url":"abc"}]}"#,
        );
    }
}
