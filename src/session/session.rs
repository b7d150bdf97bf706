//! Session descriptors and their generation.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::core::{
    JOIN_KEY_PREFIX, JOIN_KEY_SUFFIX_LEN, ROOM_ID_PREFIX, ROOM_SUFFIX_LEN, SESSION_LIFETIME_MS,
    TokenError, now_millis,
};

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Negotiated stream content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StreamMode {
    /// Audio only.
    #[default]
    #[serde(rename = "audio")]
    Audio,
    /// Audio and video.
    #[serde(rename = "audio+video")]
    AudioVideo,
}

impl StreamMode {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::AudioVideo => "audio+video",
        }
    }

    /// Whether a video track is part of the stream.
    pub fn has_video(&self) -> bool {
        matches!(self, Self::AudioVideo)
    }
}

impl fmt::Display for StreamMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StreamMode {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "audio" => Ok(Self::Audio),
            "audio+video" => Ok(Self::AudioVideo),
            other => Err(TokenError::InvalidMode(other.to_string())),
        }
    }
}

/// Noise-alert threshold preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sensitivity {
    /// Only loud events.
    Low,
    /// Default preset.
    #[default]
    Medium,
    /// Any noticeable sound.
    High,
}

impl Sensitivity {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Sensitivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the two devices reach each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    /// Same network or radio range; peer-to-peer transport.
    #[default]
    Nearby,
    /// Across networks; relay transport.
    Anywhere,
}

impl Connectivity {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nearby => "nearby",
            Self::Anywhere => "anywhere",
        }
    }
}

impl fmt::Display for Connectivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Connectivity {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nearby" => Ok(Self::Nearby),
            "anywhere" => Ok(Self::Anywhere),
            other => Err(TokenError::InvalidConnectivity(other.to_string())),
        }
    }
}

/// Device role within a pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Device placed in the room; hosts the session.
    Listener,
    /// Device receiving alerts and streams; joins the session.
    Parent,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Listener => f.write_str("listener"),
            Self::Parent => f.write_str("parent"),
        }
    }
}

/// Preferences copied into every generated session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionConfig {
    /// Stream content.
    pub mode: StreamMode,
    /// Alert threshold.
    pub sensitivity: Sensitivity,
    /// Transport selection.
    pub connectivity: Connectivity,
}

/// A pairing agreement.
///
/// Timestamps are Unix milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Channel identifier, `room_<millis>_<suffix>`.
    pub room_id: String,
    /// Shared secret, `key_<suffix>`.
    pub join_key: String,
    /// Stream content.
    pub mode: StreamMode,
    /// Alert threshold.
    pub sensitivity: Sensitivity,
    /// Transport selection.
    pub connectivity: Connectivity,
    /// Creation time.
    pub created_at: u64,
    /// Time after which the session is invalid.
    pub expires_at: u64,
}

impl Session {
    /// Generate a fresh session from the current preferences.
    pub fn generate(config: &SessionConfig) -> Self {
        Self::generate_at(config, now_millis())
    }

    /// Generate a session as if created at `now`.
    pub fn generate_at(config: &SessionConfig, now: u64) -> Self {
        let mut rng = rand::thread_rng();
        let room_id = format!(
            "{ROOM_ID_PREFIX}{now}_{}",
            random_base36(&mut rng, ROOM_SUFFIX_LEN)
        );
        let join_key = format!(
            "{JOIN_KEY_PREFIX}{}",
            random_base36(&mut rng, JOIN_KEY_SUFFIX_LEN)
        );

        Self {
            room_id,
            join_key,
            mode: config.mode,
            sensitivity: config.sensitivity,
            connectivity: config.connectivity,
            created_at: now,
            expires_at: now.saturating_add(SESSION_LIFETIME_MS),
        }
    }

    /// Whether the session is past its expiry at `now`.
    pub fn is_expired(&self, now: u64) -> bool {
        now > self.expires_at
    }

    /// Whether the session is past its expiry right now.
    pub fn is_expired_now(&self) -> bool {
        self.is_expired(now_millis())
    }

    /// Preferences this session was created with.
    pub fn config(&self) -> SessionConfig {
        SessionConfig {
            mode: self.mode,
            sensitivity: self.sensitivity,
            connectivity: self.connectivity,
        }
    }
}

fn random_base36<R: Rng>(rng: &mut R, len: usize) -> String {
    (0..len)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{MIN_JOIN_KEY_LEN, MIN_ROOM_ID_LEN};

    #[test]
    fn test_generate_shapes_identifiers() {
        let session = Session::generate_at(&SessionConfig::default(), 1_700_000_000_000);

        assert!(session.room_id.starts_with("room_1700000000000_"));
        assert_eq!(session.room_id.len(), "room_1700000000000_".len() + ROOM_SUFFIX_LEN);
        assert!(session.join_key.starts_with("key_"));
        assert_eq!(session.join_key.len(), 4 + JOIN_KEY_SUFFIX_LEN);
        assert!(session.room_id.len() >= MIN_ROOM_ID_LEN);
        assert!(session.join_key.len() >= MIN_JOIN_KEY_LEN);

        let suffix = &session.join_key[4..];
        assert!(suffix.bytes().all(|b| b.is_ascii_digit() || b.is_ascii_lowercase()));
    }

    #[test]
    fn test_generate_copies_config() {
        let config = SessionConfig {
            mode: StreamMode::AudioVideo,
            sensitivity: Sensitivity::High,
            connectivity: Connectivity::Anywhere,
        };
        let session = Session::generate(&config);

        assert_eq!(session.config(), config);
        assert_eq!(session.expires_at - session.created_at, SESSION_LIFETIME_MS);
    }

    #[test]
    fn test_generate_is_unique() {
        let config = SessionConfig::default();
        let a = Session::generate_at(&config, 42);
        let b = Session::generate_at(&config, 42);

        assert_ne!(a.room_id, b.room_id);
        assert_ne!(a.join_key, b.join_key);
    }

    #[test]
    fn test_is_expired_boundary() {
        let session = Session::generate_at(&SessionConfig::default(), 1_000);

        assert!(!session.is_expired(1_000));
        assert!(!session.is_expired(session.expires_at));
        assert!(session.is_expired(session.expires_at + 1));
    }

    #[test]
    fn test_wire_names() {
        assert_eq!("audio+video".parse::<StreamMode>(), Ok(StreamMode::AudioVideo));
        assert_eq!(
            "video".parse::<StreamMode>(),
            Err(TokenError::InvalidMode("video".into()))
        );
        assert_eq!("anywhere".parse::<Connectivity>(), Ok(Connectivity::Anywhere));
        assert!("wifi".parse::<Connectivity>().is_err());

        let json = serde_json::to_string(&StreamMode::AudioVideo).unwrap();
        assert_eq!(json, "\"audio+video\"");
    }

    #[test]
    fn test_session_json_is_camel_case() {
        let session = Session::generate_at(&SessionConfig::default(), 7);
        let json = serde_json::to_value(&session).unwrap();

        assert!(json.get("roomId").is_some());
        assert!(json.get("joinKey").is_some());
        assert_eq!(json["createdAt"], 7);
    }
}
