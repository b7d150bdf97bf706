//! Base64 session-description blobs for QR handshakes.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};

use crate::core::CodecError;
use crate::session::StreamMode;

/// Which side of the handshake a description belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    /// Created by the listener.
    Offer,
    /// Created by the parent in reply.
    Answer,
}

/// A complete (non-trickle) SDP description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    /// Offer or answer.
    #[serde(rename = "type")]
    pub kind: SdpKind,
    /// SDP text, including gathered candidates.
    pub sdp: String,
}

impl SessionDescription {
    /// An offer.
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    /// An answer.
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }

    /// Whether the description negotiates a video section.
    pub fn has_video(&self) -> bool {
        self.sdp.lines().any(|line| line.starts_with("m=video"))
    }

    /// Stream mode implied by the media sections.
    pub fn stream_mode(&self) -> StreamMode {
        if self.has_video() {
            StreamMode::AudioVideo
        } else {
            StreamMode::Audio
        }
    }
}

/// Encode a description as base64 of its JSON form.
pub fn encode_offer_blob(description: &SessionDescription) -> String {
    // Plain struct of strings; serialization cannot fail.
    let json = serde_json::to_vec(description).unwrap_or_default();
    STANDARD.encode(json)
}

/// Decode a blob produced by [`encode_offer_blob`].
pub fn decode_offer_blob(blob: &str) -> Result<SessionDescription, CodecError> {
    let bytes = STANDARD.decode(blob.trim())?;
    Ok(serde_json::from_slice(&bytes)?)
}
