//! Handshake exchange ahead of a peer-to-peer transport.
//!
//! A [`SignalingCarrier`] moves offers, answers and candidates between the two
//! devices. Three carriers exist:
//!
//! - [`QrCarrier`]: descriptions shown and scanned as QR codes
//! - [`ProximityCarrier`]: JSON frames over a platform proximity link
//! - [`RelaySignaling`]: the relay endpoint on the `signaling` channel
//!
//! [`CarrierSource`] opens a carrier for a session; [`FallbackCarriers`] tries
//! several sources in order.

mod proximity;
mod qr;
mod relay;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::codec::SessionDescription;
use crate::core::CodecError;
use crate::session::{Role, Session, StreamMode};
use crate::transport::IceCandidate;

pub use proximity::{ProximityCarrier, ProximityLink, ProximityPlatform, ProximitySource};
pub use qr::{QrCarrier, QrCarrierSource};
pub use relay::{RelaySignaling, RelaySignalingSource};

/// Carrier implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CarrierKind {
    /// QR round-trip.
    Qr,
    /// Proximity advertisement.
    Proximity,
    /// Relay socket.
    Relay,
}

impl fmt::Display for CarrierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Qr => f.write_str("qr"),
            Self::Proximity => f.write_str("proximity"),
            Self::Relay => f.write_str("relay"),
        }
    }
}

/// Errors in the signaling layer.
#[derive(Debug, Error)]
pub enum SignalingError {
    /// The carrier cannot be used here.
    #[error("{carrier} carrier unavailable: {reason}")]
    Unavailable {
        /// Which carrier.
        carrier: CarrierKind,
        /// Why.
        reason: String,
    },

    /// The carrier was closed.
    #[error("signaling channel closed")]
    Closed,

    /// A scanned description was malformed.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// A frame could not be encoded.
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),

    /// The underlying link failed.
    #[error("link error: {0}")]
    Link(String),
}

/// Result type for signaling operations.
pub type SignalingResult<T> = Result<T, SignalingError>;

/// Something received from the peer during the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalingEvent {
    /// Offer or answer.
    Description {
        /// The description.
        description: SessionDescription,
        /// Stream mode announced alongside, if the carrier carries one.
        mode: Option<StreamMode>,
    },
    /// Trickled candidate.
    Candidate(IceCandidate),
}

/// A medium for the handshake.
#[async_trait]
pub trait SignalingCarrier: Send + Sync {
    /// Implementation kind.
    fn kind(&self) -> CarrierKind;

    /// Deliver the local offer.
    async fn send_offer(&self, offer: &SessionDescription) -> SignalingResult<()>;

    /// Deliver the local answer.
    async fn send_answer(&self, answer: &SessionDescription) -> SignalingResult<()>;

    /// Deliver a local candidate.
    async fn send_ice_candidate(&self, candidate: &IceCandidate) -> SignalingResult<()>;

    /// Wait for the next event from the peer.
    async fn next_event(&self) -> SignalingResult<SignalingEvent>;

    /// Release the carrier. Pending `next_event` calls fail with `Closed`.
    async fn close(&self);
}

/// Opens carriers for a session.
#[async_trait]
pub trait CarrierSource: Send + Sync {
    /// Open a carrier for `session` as `role`.
    async fn open(
        &self,
        session: &Session,
        role: Role,
    ) -> SignalingResult<Arc<dyn SignalingCarrier>>;
}

/// Tries sources in order, returning the first carrier that opens.
#[derive(Clone, Default)]
pub struct FallbackCarriers {
    sources: Vec<Arc<dyn CarrierSource>>,
}

impl FallbackCarriers {
    /// Empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a source.
    pub fn with(mut self, source: Arc<dyn CarrierSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Number of sources.
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// No sources configured.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[async_trait]
impl CarrierSource for FallbackCarriers {
    async fn open(
        &self,
        session: &Session,
        role: Role,
    ) -> SignalingResult<Arc<dyn SignalingCarrier>> {
        let mut last = None;
        for source in &self.sources {
            match source.open(session, role).await {
                Ok(carrier) => {
                    debug!(carrier = %carrier.kind(), "signaling carrier opened");
                    return Ok(carrier);
                }
                Err(e) => {
                    warn!(error = %e, "signaling carrier failed, trying next");
                    last = Some(e);
                }
            }
        }
        Err(last.unwrap_or(SignalingError::Unavailable {
            carrier: CarrierKind::Qr,
            reason: "no carriers configured".into(),
        }))
    }
}
