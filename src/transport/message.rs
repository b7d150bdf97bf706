//! Wire messages exchanged over an open transport.
//!
//! Every message is a JSON object tagged by `type`. Media payloads are
//! base64 strings inside the JSON.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::session::{Role, Session, StreamMode};

/// ICE candidate as exchanged during trickle signaling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    /// Candidate line.
    pub candidate: String,
    /// Media stream identification tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    /// Index of the media description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_m_line_index: Option<u16>,
}

/// Messages carried by both transport kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum TransportMessage {
    /// Sent by the listener when its channel opens.
    #[serde(rename = "listener:hello")]
    ListenerHello {
        /// Session room.
        room_id: String,
        /// Session key.
        join_key: String,
        /// Stream content the listener will send.
        mode: StreamMode,
    },

    /// Sent by the parent when its channel opens.
    #[serde(rename = "parent:hello")]
    ParentHello {
        /// Session room.
        room_id: String,
        /// Session key.
        join_key: String,
    },

    /// Audio chunk.
    #[serde(rename = "audio")]
    Audio {
        /// Session room.
        room_id: String,
        /// Opaque encoded audio.
        #[serde(with = "base64_payload")]
        data: Bytes,
        /// Capture time, Unix milliseconds.
        timestamp: u64,
    },

    /// Video frame.
    #[serde(rename = "video")]
    Video {
        /// Session room.
        room_id: String,
        /// Opaque encoded video.
        #[serde(with = "base64_payload")]
        data: Bytes,
        /// Capture time, Unix milliseconds.
        timestamp: u64,
    },

    /// Noise above the sensitivity threshold.
    #[serde(rename = "noise:detected")]
    NoiseDetected {
        /// Session room.
        room_id: String,
        /// Measured level, 0.0 to 1.0.
        level: f64,
        /// Detection time, Unix milliseconds.
        timestamp: u64,
    },

    /// The sender is ending the session.
    #[serde(rename = "session:end")]
    SessionEnd {
        /// Session room.
        room_id: String,
    },

    /// Liveness probe.
    #[serde(rename = "ping")]
    Ping {
        /// Session room.
        room_id: String,
        /// Send time, Unix milliseconds.
        timestamp: u64,
    },

    /// Liveness reply, echoing the probe timestamp.
    #[serde(rename = "pong")]
    Pong {
        /// Session room.
        room_id: String,
        /// Timestamp of the answered ping.
        timestamp: u64,
    },

    /// Stream content changed.
    #[serde(rename = "mode:change")]
    ModeChange {
        /// Session room.
        room_id: String,
        /// Session key.
        join_key: String,
        /// New stream content.
        mode: StreamMode,
    },

    /// SDP offer.
    #[serde(rename = "offer")]
    Offer {
        /// Session room.
        room_id: String,
        /// Session key.
        join_key: String,
        /// SDP text.
        sdp: String,
    },

    /// SDP answer.
    #[serde(rename = "answer")]
    Answer {
        /// Session room.
        room_id: String,
        /// Session key.
        join_key: String,
        /// SDP text.
        sdp: String,
    },

    /// Trickled ICE candidate.
    #[serde(rename = "ice-candidate")]
    IceCandidate {
        /// Session room.
        room_id: String,
        /// Session key.
        join_key: String,
        /// The candidate.
        candidate: IceCandidate,
    },
}

impl TransportMessage {
    /// Hello for `role` in `session`.
    pub fn hello(role: Role, session: &Session) -> Self {
        match role {
            Role::Listener => Self::ListenerHello {
                room_id: session.room_id.clone(),
                join_key: session.join_key.clone(),
                mode: session.mode,
            },
            Role::Parent => Self::ParentHello {
                room_id: session.room_id.clone(),
                join_key: session.join_key.clone(),
            },
        }
    }

    /// Noise alert for `session`.
    pub fn noise(session: &Session, level: f64, timestamp: u64) -> Self {
        Self::NoiseDetected {
            room_id: session.room_id.clone(),
            level,
            timestamp,
        }
    }

    /// End-of-session notice for `session`.
    pub fn session_end(session: &Session) -> Self {
        Self::SessionEnd {
            room_id: session.room_id.clone(),
        }
    }

    /// Ping for `session`.
    pub fn ping(session: &Session, timestamp: u64) -> Self {
        Self::Ping {
            room_id: session.room_id.clone(),
            timestamp,
        }
    }

    /// Reply to a ping sent at `timestamp`.
    pub fn pong(session: &Session, timestamp: u64) -> Self {
        Self::Pong {
            room_id: session.room_id.clone(),
            timestamp,
        }
    }

    /// Wire tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ListenerHello { .. } => "listener:hello",
            Self::ParentHello { .. } => "parent:hello",
            Self::Audio { .. } => "audio",
            Self::Video { .. } => "video",
            Self::NoiseDetected { .. } => "noise:detected",
            Self::SessionEnd { .. } => "session:end",
            Self::Ping { .. } => "ping",
            Self::Pong { .. } => "pong",
            Self::ModeChange { .. } => "mode:change",
            Self::Offer { .. } => "offer",
            Self::Answer { .. } => "answer",
            Self::IceCandidate { .. } => "ice-candidate",
        }
    }

    /// Room the message belongs to.
    pub fn room_id(&self) -> &str {
        match self {
            Self::ListenerHello { room_id, .. }
            | Self::ParentHello { room_id, .. }
            | Self::Audio { room_id, .. }
            | Self::Video { room_id, .. }
            | Self::NoiseDetected { room_id, .. }
            | Self::SessionEnd { room_id }
            | Self::Ping { room_id, .. }
            | Self::Pong { room_id, .. }
            | Self::ModeChange { room_id, .. }
            | Self::Offer { room_id, .. }
            | Self::Answer { room_id, .. }
            | Self::IceCandidate { room_id, .. } => room_id,
        }
    }

    /// Join key, for control messages.
    pub fn join_key(&self) -> Option<&str> {
        match self {
            Self::ListenerHello { join_key, .. }
            | Self::ParentHello { join_key, .. }
            | Self::ModeChange { join_key, .. }
            | Self::Offer { join_key, .. }
            | Self::Answer { join_key, .. }
            | Self::IceCandidate { join_key, .. } => Some(join_key),
            Self::Audio { .. }
            | Self::Video { .. }
            | Self::NoiseDetected { .. }
            | Self::SessionEnd { .. }
            | Self::Ping { .. }
            | Self::Pong { .. } => None,
        }
    }

    /// Whether the message belongs to `session`.
    pub fn is_valid_for(&self, session: &Session) -> bool {
        self.room_id() == session.room_id
            && self.join_key().is_none_or(|key| key == session.join_key)
    }

    /// Serialize to a JSON text frame.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse a text frame and keep it only if it belongs to `session`.
    ///
    /// Unparsable and foreign frames yield `None`.
    pub fn parse_for(frame: &str, session: &Session) -> Option<Self> {
        let message: Self = match serde_json::from_str(frame) {
            Ok(message) => message,
            Err(e) => {
                trace!(error = %e, "dropping unparsable frame");
                return None;
            }
        };
        if !message.is_valid_for(session) {
            trace!(
                kind = message.kind(),
                room_id = message.room_id(),
                "dropping frame for another session"
            );
            return None;
        }
        Some(message)
    }
}

mod base64_payload {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    pub fn serialize<S: Serializer>(data: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded)
            .map(Bytes::from)
            .map_err(D::Error::custom)
    }
}
