//! [`PeerLink`] backed by the `webrtc` crate.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{API, APIBuilder};
use webrtc::data_channel::RTCDataChannel;
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;

use super::error::{TransportError, TransportResult};
use super::local::{PeerConnector, PeerEvent, PeerEventSender, PeerLink, PeerState};
use super::message::IceCandidate;
use crate::codec::{SdpKind, SessionDescription};
use crate::core::DATA_CHANNEL_LABEL;
use crate::platform::{MediaKind, MediaTrack};

/// Builds WebRTC peer connections with default codecs and interceptors.
pub struct WebRtcConnector {
    api: API,
}

impl WebRtcConnector {
    /// Register default codecs and interceptors.
    pub fn new() -> TransportResult<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;
        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)?;
        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();
        Ok(Self { api })
    }
}

#[async_trait]
impl PeerConnector for WebRtcConnector {
    async fn create(
        &self,
        ice_servers: &[String],
        events: PeerEventSender,
    ) -> TransportResult<Arc<dyn PeerLink>> {
        let config = RTCConfiguration {
            ice_servers: vec![RTCIceServer {
                urls: ice_servers.to_vec(),
                ..Default::default()
            }],
            ..Default::default()
        };
        let pc = Arc::new(self.api.new_peer_connection(config).await?);
        let peer = Arc::new(WebRtcPeer {
            pc,
            channel: Mutex::new(None),
            gathering: AsyncMutex::new(None),
            events,
        });
        peer.install_handlers();
        Ok(peer)
    }
}

/// One `RTCPeerConnection` with its control channel.
pub struct WebRtcPeer {
    pc: Arc<RTCPeerConnection>,
    channel: Mutex<Option<Arc<RTCDataChannel>>>,
    gathering: AsyncMutex<Option<tokio::sync::mpsc::Receiver<()>>>,
    events: PeerEventSender,
}

impl WebRtcPeer {
    fn install_handlers(self: &Arc<Self>) {
        let events = self.events.clone();
        self.pc
            .on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
                let state = match state {
                    RTCPeerConnectionState::Connected => Some(PeerState::Connected),
                    RTCPeerConnectionState::Connecting => Some(PeerState::Connecting),
                    RTCPeerConnectionState::Disconnected => Some(PeerState::Disconnected),
                    RTCPeerConnectionState::Failed => Some(PeerState::Failed),
                    RTCPeerConnectionState::Closed => Some(PeerState::Closed),
                    _ => None,
                };
                if let Some(state) = state {
                    let _ = events.send(PeerEvent::StateChanged(state));
                }
                Box::pin(async {})
            }));

        let events = self.events.clone();
        self.pc
            .on_track(Box::new(move |track, _receiver, _transceiver| {
                let kind = match track.kind() {
                    RTPCodecType::Audio => Some(MediaKind::Audio),
                    RTPCodecType::Video => Some(MediaKind::Video),
                    _ => None,
                };
                if let Some(kind) = kind {
                    let _ = events.send(PeerEvent::RemoteTrack(kind));
                }
                Box::pin(async {})
            }));

        // The answering side receives the channel instead of creating it.
        let weak = Arc::downgrade(self);
        self.pc
            .on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
                if let Some(peer) = weak.upgrade() {
                    debug!(label = dc.label(), "remote data channel");
                    peer.attach_channel(dc);
                }
                Box::pin(async {})
            }));
    }

    fn attach_channel(&self, dc: Arc<RTCDataChannel>) {
        let events = self.events.clone();
        dc.on_open(Box::new(move || {
            let _ = events.send(PeerEvent::ChannelOpen);
            Box::pin(async {})
        }));

        let events = self.events.clone();
        dc.on_close(Box::new(move || {
            let _ = events.send(PeerEvent::ChannelClosed);
            Box::pin(async {})
        }));

        let events = self.events.clone();
        dc.on_message(Box::new(move |msg: DataChannelMessage| {
            match String::from_utf8(msg.data.to_vec()) {
                Ok(text) => {
                    let _ = events.send(PeerEvent::ChannelMessage(text));
                }
                Err(_) => warn!("dropping non-utf8 data channel message"),
            }
            Box::pin(async {})
        }));

        *self.channel.lock() = Some(dc);
    }

    async fn arm_gathering(&self) {
        let done = self.pc.gathering_complete_promise().await;
        *self.gathering.lock().await = Some(done);
    }
}

#[async_trait]
impl PeerLink for WebRtcPeer {
    async fn add_track(&self, track: &MediaTrack) -> TransportResult<()> {
        self.pc.add_track(track.track.clone()).await?;
        Ok(())
    }

    async fn create_offer(&self) -> TransportResult<()> {
        let init = RTCDataChannelInit {
            ordered: Some(true),
            ..Default::default()
        };
        let dc = self
            .pc
            .create_data_channel(DATA_CHANNEL_LABEL, Some(init))
            .await?;
        self.attach_channel(dc);

        let offer = self.pc.create_offer(None).await?;
        self.arm_gathering().await;
        self.pc.set_local_description(offer).await?;
        Ok(())
    }

    async fn create_answer(&self) -> TransportResult<()> {
        let answer = self.pc.create_answer(None).await?;
        self.arm_gathering().await;
        self.pc.set_local_description(answer).await?;
        Ok(())
    }

    async fn set_remote_description(
        &self,
        description: &SessionDescription,
    ) -> TransportResult<()> {
        let remote = match description.kind {
            SdpKind::Offer => RTCSessionDescription::offer(description.sdp.clone())?,
            SdpKind::Answer => RTCSessionDescription::answer(description.sdp.clone())?,
        };
        self.pc.set_remote_description(remote).await?;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> TransportResult<()> {
        self.pc
            .add_ice_candidate(RTCIceCandidateInit {
                candidate: candidate.candidate.clone(),
                sdp_mid: candidate.sdp_mid.clone(),
                sdp_mline_index: candidate.sdp_m_line_index,
                username_fragment: None,
            })
            .await?;
        Ok(())
    }

    async fn gathering_complete(&self) {
        let mut gathering = self.gathering.lock().await;
        if let Some(done) = gathering.as_mut() {
            let _ = done.recv().await;
        }
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        let local = self.pc.local_description().await?;
        let kind = match local.sdp_type {
            RTCSdpType::Offer => SdpKind::Offer,
            RTCSdpType::Answer => SdpKind::Answer,
            _ => return None,
        };
        Some(SessionDescription {
            kind,
            sdp: local.sdp,
        })
    }

    async fn send_text(&self, text: String) -> TransportResult<()> {
        let channel = self.channel.lock().clone();
        let channel = channel.ok_or(TransportError::NotReady)?;
        channel.send_text(text).await?;
        Ok(())
    }

    async fn close_channel(&self) {
        let channel = self.channel.lock().take();
        if let Some(channel) = channel {
            if let Err(e) = channel.close().await {
                debug!(error = %e, "data channel close");
            }
        }
    }

    async fn close(&self) {
        if let Err(e) = self.pc.close().await {
            debug!(error = %e, "peer connection close");
        }
    }
}
