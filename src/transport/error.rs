//! Transport error types.

use std::time::Duration;

use thiserror::Error;

use crate::platform::MediaError;
use crate::session::Connectivity;
use crate::signaling::SignalingError;

/// Errors in the transport layer.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No open channel.
    #[error("transport not ready")]
    NotReady,

    /// The requested combination cannot work on this platform.
    #[error("{connectivity} connectivity unsupported: {reason}")]
    Unsupported {
        /// Requested connectivity.
        connectivity: Connectivity,
        /// Why.
        reason: &'static str,
    },

    /// Relay connectivity requested without a relay URL.
    #[error("no relay url configured")]
    MissingRelayUrl,

    /// Relay URL could not be parsed.
    #[error("invalid relay url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Socket open failed.
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// A handshake step did not finish in time.
    #[error("{stage} timed out after {after:?}")]
    HandshakeTimeout {
        /// Step that timed out.
        stage: &'static str,
        /// Bound that expired.
        after: Duration,
    },

    /// Peer connection failure.
    #[error("peer connection error: {0}")]
    Peer(String),

    /// Operation not allowed in the current state.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// `disconnect()` was called while the operation was in flight.
    #[error("cancelled by disconnect")]
    Cancelled,

    /// Capture failed.
    #[error("media error: {0}")]
    Media(#[from] MediaError),

    /// Handshake exchange failed.
    #[error("signaling error: {0}")]
    Signaling(#[from] SignalingError),

    /// Message could not be serialized.
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<webrtc::Error> for TransportError {
    fn from(e: webrtc::Error) -> Self {
        Self::Peer(e.to_string())
    }
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;
