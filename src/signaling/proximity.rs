//! Proximity carrier.
//!
//! The listener advertises under [`PROXIMITY_SERVICE_TYPE`]; the parent
//! browses and connects. Frames are JSON objects tagged by `t`.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{CarrierKind, CarrierSource, SignalingCarrier, SignalingError, SignalingEvent, SignalingResult};
use crate::codec::{SdpKind, SessionDescription};
use crate::core::PROXIMITY_SERVICE_TYPE;
use crate::session::{Role, Session, StreamMode};
use crate::transport::IceCandidate;

/// A connected proximity link.
#[async_trait]
pub trait ProximityLink: Send + Sync {
    /// Send one UTF-8 payload.
    async fn send(&self, payload: String) -> SignalingResult<()>;

    /// Next payload, or `None` when the peer went away.
    async fn recv(&self) -> Option<String>;

    /// Tear the link down.
    async fn close(&self);
}

/// Platform proximity API.
#[async_trait]
pub trait ProximityPlatform: Send + Sync {
    /// Whether the API exists on this device.
    fn is_available(&self) -> bool;

    /// Advertise `service_type` with `name` and wait for a peer to connect.
    async fn advertise(
        &self,
        service_type: &str,
        name: &str,
    ) -> SignalingResult<Arc<dyn ProximityLink>>;

    /// Browse for `service_type` and connect to the peer advertising `name`.
    async fn discover(
        &self,
        service_type: &str,
        name: &str,
    ) -> SignalingResult<Arc<dyn ProximityLink>>;
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "lowercase")]
enum ProximityFrame {
    Offer { sdp: String, mode: StreamMode },
    Answer { sdp: String },
    Candidate { candidate: IceCandidate },
}

/// Carrier over a proximity link.
pub struct ProximityCarrier {
    link: Arc<dyn ProximityLink>,
    mode: StreamMode,
}

impl ProximityCarrier {
    /// Wrap a connected link; offers announce `mode`.
    pub fn new(link: Arc<dyn ProximityLink>, mode: StreamMode) -> Self {
        Self { link, mode }
    }

    async fn send_frame(&self, frame: ProximityFrame) -> SignalingResult<()> {
        self.link.send(serde_json::to_string(&frame)?).await
    }
}

#[async_trait]
impl SignalingCarrier for ProximityCarrier {
    fn kind(&self) -> CarrierKind {
        CarrierKind::Proximity
    }

    async fn send_offer(&self, offer: &SessionDescription) -> SignalingResult<()> {
        self.send_frame(ProximityFrame::Offer {
            sdp: offer.sdp.clone(),
            mode: self.mode,
        })
        .await
    }

    async fn send_answer(&self, answer: &SessionDescription) -> SignalingResult<()> {
        self.send_frame(ProximityFrame::Answer {
            sdp: answer.sdp.clone(),
        })
        .await
    }

    async fn send_ice_candidate(&self, candidate: &IceCandidate) -> SignalingResult<()> {
        self.send_frame(ProximityFrame::Candidate {
            candidate: candidate.clone(),
        })
        .await
    }

    async fn next_event(&self) -> SignalingResult<SignalingEvent> {
        loop {
            let payload = self.link.recv().await.ok_or(SignalingError::Closed)?;
            let frame: ProximityFrame = match serde_json::from_str(&payload) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(error = %e, "dropping malformed proximity frame");
                    continue;
                }
            };
            return Ok(match frame {
                ProximityFrame::Offer { sdp, mode } => SignalingEvent::Description {
                    description: SessionDescription {
                        kind: SdpKind::Offer,
                        sdp,
                    },
                    mode: Some(mode),
                },
                ProximityFrame::Answer { sdp } => SignalingEvent::Description {
                    description: SessionDescription {
                        kind: SdpKind::Answer,
                        sdp,
                    },
                    mode: None,
                },
                ProximityFrame::Candidate { candidate } => SignalingEvent::Candidate(candidate),
            });
        }
    }

    async fn close(&self) {
        self.link.close().await;
    }
}

/// Opens proximity carriers: advertise as listener, discover as parent.
#[derive(Clone)]
pub struct ProximitySource {
    platform: Arc<dyn ProximityPlatform>,
}

impl ProximitySource {
    /// Use `platform` for advertising and browsing.
    pub fn new(platform: Arc<dyn ProximityPlatform>) -> Self {
        Self { platform }
    }
}

#[async_trait]
impl CarrierSource for ProximitySource {
    async fn open(
        &self,
        session: &Session,
        role: Role,
    ) -> SignalingResult<Arc<dyn SignalingCarrier>> {
        if !self.platform.is_available() {
            return Err(SignalingError::Unavailable {
                carrier: CarrierKind::Proximity,
                reason: "proximity api not present on this platform".into(),
            });
        }

        debug!(%role, room_id = %session.room_id, "opening proximity link");
        let link = match role {
            Role::Listener => {
                self.platform
                    .advertise(PROXIMITY_SERVICE_TYPE, &session.room_id)
                    .await?
            }
            Role::Parent => {
                self.platform
                    .discover(PROXIMITY_SERVICE_TYPE, &session.room_id)
                    .await?
            }
        };
        Ok(Arc::new(ProximityCarrier::new(link, session.mode)))
    }
}
