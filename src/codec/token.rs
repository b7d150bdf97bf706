//! Deep-link and JSON pairing tokens.

use serde::{Deserialize, Serialize};
use url::{Url, form_urlencoded};

use crate::core::{
    DEEP_LINK_ACTION, DEEP_LINK_SCHEME, MIN_JOIN_KEY_LEN, MIN_ROOM_ID_LEN, SESSION_LIFETIME_MS,
    TokenError,
};
use crate::session::{Connectivity, Sensitivity, Session, StreamMode};

/// Decoded, not yet validated, pairing token.
///
/// `mode` and `connectivity` are kept as raw strings so that validation can
/// report unknown values instead of failing the decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingToken {
    /// Room identifier.
    pub room_id: String,
    /// Join key.
    pub join_key: String,
    /// Stream mode wire name.
    pub mode: String,
    /// Connectivity wire name.
    pub connectivity: String,
    /// Creation time of the session, Unix milliseconds.
    pub timestamp: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LooseToken {
    room_id: Option<String>,
    join_key: Option<String>,
    mode: Option<String>,
    connectivity: Option<String>,
    timestamp: Option<u64>,
}

impl PairingToken {
    /// Token describing `session`.
    pub fn from_session(session: &Session) -> Self {
        Self {
            room_id: session.room_id.clone(),
            join_key: session.join_key.clone(),
            mode: session.mode.as_str().to_string(),
            connectivity: session.connectivity.as_str().to_string(),
            timestamp: session.created_at,
        }
    }

    /// Encode `session` as `bsm://connect?roomId=..&joinKey=..&mode=..&connectivity=..&timestamp=..`.
    pub fn encode_deep_link(session: &Session) -> String {
        let token = Self::from_session(session);
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("roomId", &token.room_id)
            .append_pair("joinKey", &token.join_key)
            .append_pair("mode", &token.mode)
            .append_pair("connectivity", &token.connectivity)
            .append_pair("timestamp", &token.timestamp.to_string())
            .finish();
        format!("{DEEP_LINK_SCHEME}://{DEEP_LINK_ACTION}?{query}")
    }

    /// Encode `session` as a flat JSON object.
    pub fn encode_json(session: &Session) -> String {
        // A struct of strings and an integer always serializes.
        serde_json::to_string(&Self::from_session(session)).unwrap_or_default()
    }

    /// Decode a scanned token.
    ///
    /// Tries the deep-link form first, then flat JSON. Returns `None` when
    /// neither parses or a required field is missing.
    pub fn decode(token: &str) -> Option<Self> {
        let token = token.trim();
        if let Some(parsed) = Self::decode_deep_link(token) {
            return Some(parsed);
        }
        Self::decode_json(token)
    }

    fn decode_deep_link(token: &str) -> Option<Self> {
        let url = Url::parse(token).ok()?;
        let is_connect = url.host_str() == Some(DEEP_LINK_ACTION)
            || url.path().trim_matches('/') == DEEP_LINK_ACTION;
        if !is_connect {
            return None;
        }

        let mut loose = LooseToken {
            room_id: None,
            join_key: None,
            mode: None,
            connectivity: None,
            timestamp: None,
        };
        for (name, value) in url.query_pairs() {
            match name.as_ref() {
                "roomId" => loose.room_id = Some(value.into_owned()),
                "joinKey" => loose.join_key = Some(value.into_owned()),
                "mode" => loose.mode = Some(value.into_owned()),
                "connectivity" => loose.connectivity = Some(value.into_owned()),
                "timestamp" => loose.timestamp = value.parse().ok(),
                _ => {}
            }
        }
        Self::from_loose(loose)
    }

    fn decode_json(token: &str) -> Option<Self> {
        let loose: LooseToken = serde_json::from_str(token).ok()?;
        Self::from_loose(loose)
    }

    fn from_loose(loose: LooseToken) -> Option<Self> {
        let room_id = loose.room_id.filter(|s| !s.is_empty())?;
        let join_key = loose.join_key.filter(|s| !s.is_empty())?;
        Some(Self {
            room_id,
            join_key,
            mode: loose.mode.unwrap_or_else(|| StreamMode::Audio.as_str().to_string()),
            connectivity: loose
                .connectivity
                .unwrap_or_else(|| Connectivity::Nearby.as_str().to_string()),
            timestamp: loose.timestamp.unwrap_or(0),
        })
    }

    /// Validate the token at wall-clock time `now` (Unix milliseconds).
    pub fn validate(&self, now: u64) -> Result<(), TokenError> {
        if self.room_id.len() < MIN_ROOM_ID_LEN {
            return Err(TokenError::InvalidRoomId);
        }
        if self.join_key.len() < MIN_JOIN_KEY_LEN {
            return Err(TokenError::InvalidJoinKey);
        }
        self.mode.parse::<StreamMode>()?;
        self.connectivity.parse::<Connectivity>()?;
        if now.saturating_sub(self.timestamp) > SESSION_LIFETIME_MS {
            return Err(TokenError::Expired);
        }
        Ok(())
    }

    /// Validate at `now` and convert into a session.
    ///
    /// The session inherits the token's creation time; sensitivity is a local
    /// preference and starts at its default.
    pub fn into_session(self, now: u64) -> Result<Session, TokenError> {
        self.validate(now)?;
        Ok(Session {
            mode: self.mode.parse()?,
            connectivity: self.connectivity.parse()?,
            sensitivity: Sensitivity::default(),
            created_at: self.timestamp,
            expires_at: self.timestamp.saturating_add(SESSION_LIFETIME_MS),
            room_id: self.room_id,
            join_key: self.join_key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionConfig;

    const LINK: &str = "bsm://connect?roomId=room_1700000000000_abc123def&joinKey=key_abc123def456&mode=audio&connectivity=nearby&timestamp=1700000000000";
    const CREATED: u64 = 1_700_000_000_000;

    #[test]
    fn test_decode_deep_link() {
        let token = PairingToken::decode(LINK).unwrap();

        assert_eq!(token.room_id, "room_1700000000000_abc123def");
        assert_eq!(token.join_key, "key_abc123def456");
        assert_eq!(token.mode, "audio");
        assert_eq!(token.connectivity, "nearby");
        assert_eq!(token.timestamp, CREATED);
        assert_eq!(token.validate(CREATED + 1_000), Ok(()));
    }

    #[test]
    fn test_decode_path_form() {
        let token = PairingToken::decode("bsm:///connect?roomId=room_123456789&joinKey=key_12345678");
        assert_eq!(token.map(|t| t.room_id), Some("room_123456789".to_string()));
    }

    #[test]
    fn test_decode_json_with_defaults() {
        let token = PairingToken::decode(r#"{"roomId":"room_1234567890","joinKey":"key_abcdefgh"}"#)
            .unwrap();

        assert_eq!(token.mode, "audio");
        assert_eq!(token.connectivity, "nearby");
        assert_eq!(token.timestamp, 0);
        assert_eq!(token.validate(CREATED), Err(TokenError::Expired));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(PairingToken::decode("").is_none());
        assert!(PairingToken::decode("hello world").is_none());
        assert!(PairingToken::decode("bsm://settings?roomId=room_1234567890&joinKey=key_abcdefgh").is_none());
        assert!(PairingToken::decode(r#"{"roomId":"room_1234567890"}"#).is_none());
        assert!(PairingToken::decode(r#"{"roomId":"","joinKey":"key_abcdefgh"}"#).is_none());
        assert!(PairingToken::decode("{not json").is_none());
    }

    #[test]
    fn test_round_trip_both_forms() {
        let config = SessionConfig {
            mode: StreamMode::AudioVideo,
            connectivity: Connectivity::Anywhere,
            ..SessionConfig::default()
        };
        let session = Session::generate_at(&config, CREATED);

        for encoded in [
            PairingToken::encode_deep_link(&session),
            PairingToken::encode_json(&session),
        ] {
            let decoded = PairingToken::decode(&encoded)
                .unwrap()
                .into_session(CREATED + 5_000)
                .unwrap();
            assert_eq!(decoded.room_id, session.room_id);
            assert_eq!(decoded.join_key, session.join_key);
            assert_eq!(decoded.mode, session.mode);
            assert_eq!(decoded.connectivity, session.connectivity);
            assert!(decoded.created_at >= session.created_at);
        }
    }

    #[test]
    fn test_deep_link_escapes_mode() {
        let config = SessionConfig {
            mode: StreamMode::AudioVideo,
            ..SessionConfig::default()
        };
        let session = Session::generate_at(&config, CREATED);
        let link = PairingToken::encode_deep_link(&session);

        assert!(link.starts_with("bsm://connect?roomId="));
        assert!(link.contains("mode=audio%2Bvideo"));
    }

    #[test]
    fn test_validate_order() {
        let mut token = PairingToken::decode(LINK).unwrap();
        token.room_id = "room_1".into();
        token.join_key = "k".into();
        token.mode = "video".into();
        assert_eq!(token.validate(CREATED), Err(TokenError::InvalidRoomId));

        token.room_id = "room_1700000000000_x".into();
        assert_eq!(token.validate(CREATED), Err(TokenError::InvalidJoinKey));

        token.join_key = "key_abcdefgh".into();
        assert_eq!(
            token.validate(CREATED),
            Err(TokenError::InvalidMode("video".into()))
        );

        token.mode = "audio".into();
        token.connectivity = "bt".into();
        assert_eq!(
            token.validate(CREATED),
            Err(TokenError::InvalidConnectivity("bt".into()))
        );
    }

    #[test]
    fn test_expiry() {
        let token = PairingToken::decode(LINK).unwrap();

        assert_eq!(token.validate(CREATED + SESSION_LIFETIME_MS), Ok(()));
        assert_eq!(
            token.validate(CREATED + SESSION_LIFETIME_MS + 1),
            Err(TokenError::Expired)
        );
        assert_eq!(
            token.clone().into_session(CREATED + 11 * 60 * 1000),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn test_generated_session_validates() {
        for _ in 0..32 {
            let session = Session::generate(&SessionConfig::default());
            let token = PairingToken::from_session(&session);
            assert_eq!(token.validate(session.created_at), Ok(()));
        }
    }
}
