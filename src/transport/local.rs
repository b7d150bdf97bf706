//! Peer-to-peer transport.
//!
//! A [`LocalTransport`] drives one peer connection through a non-trickle
//! handshake over a signaling carrier, then exchanges control messages on an
//! ordered data channel. It never reconnects on its own: losing the channel
//! ends the transport.
//!
//! ```text
//! idle → gathering-media → creating-offer → awaiting-remote-description → connecting → open
//!                        ↘ awaiting-remote-description → creating-answer ↗            ↘ closed | failed
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::{TransportError, TransportResult};
use super::events::{EventSink, TransportEvent, TransportKind};
use super::message::{IceCandidate, TransportMessage};
use super::Transport;
use crate::codec::{SdpKind, SessionDescription};
use crate::core::{
    DEFAULT_STUN_SERVERS, ICE_GATHER_TIMEOUT, PEER_CONNECT_TIMEOUT, REMOTE_DESCRIPTION_TIMEOUT,
};
use crate::platform::{LocalMedia, MediaKind, MediaSource, MediaTrack};
use crate::session::{Role, Session};
use crate::signaling::{CarrierSource, SignalingCarrier, SignalingEvent};

/// Connection state reported by a peer link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// Negotiating.
    Connecting,
    /// Transport up.
    Connected,
    /// Temporarily unreachable.
    Disconnected,
    /// ICE or DTLS failed.
    Failed,
    /// Closed locally.
    Closed,
}

/// Events raised by a peer link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// The control channel opened.
    ChannelOpen,
    /// The control channel closed.
    ChannelClosed,
    /// Text received on the control channel.
    ChannelMessage(String),
    /// Peer connection state changed.
    StateChanged(PeerState),
    /// The remote side added a media track.
    RemoteTrack(MediaKind),
}

/// Sender handed to peer links for their events.
pub type PeerEventSender = mpsc::UnboundedSender<PeerEvent>;

/// One peer connection with its control channel.
#[async_trait]
pub trait PeerLink: Send + Sync {
    /// Attach an outgoing media track.
    async fn add_track(&self, track: &MediaTrack) -> TransportResult<()>;

    /// Create the control channel and an offer; set it as local description.
    async fn create_offer(&self) -> TransportResult<()>;

    /// Create an answer to the remote offer; set it as local description.
    async fn create_answer(&self) -> TransportResult<()>;

    /// Apply the peer's description.
    async fn set_remote_description(&self, description: &SessionDescription)
    -> TransportResult<()>;

    /// Apply a trickled candidate.
    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> TransportResult<()>;

    /// Resolve once ICE gathering reached `complete`. May never resolve.
    async fn gathering_complete(&self);

    /// Current local description, candidates included once gathering is done.
    async fn local_description(&self) -> Option<SessionDescription>;

    /// Send text on the control channel.
    async fn send_text(&self, text: String) -> TransportResult<()>;

    /// Close the control channel.
    async fn close_channel(&self);

    /// Close the peer connection.
    async fn close(&self);
}

/// Creates peer links.
#[async_trait]
pub trait PeerConnector: Send + Sync {
    /// New peer connection using `ice_servers`, reporting into `events`.
    async fn create(
        &self,
        ice_servers: &[String],
        events: PeerEventSender,
    ) -> TransportResult<Arc<dyn PeerLink>>;
}

/// Handshake phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalPhase {
    /// Not started.
    Idle,
    /// Capturing local tracks.
    GatheringMedia,
    /// Creating the offer and gathering candidates.
    CreatingOffer,
    /// Creating the answer and gathering candidates.
    CreatingAnswer,
    /// Waiting for the peer's description.
    AwaitingRemoteDescription,
    /// Descriptions exchanged; waiting for the channel.
    Connecting,
    /// Channel open.
    Open,
    /// Closed locally or by the peer.
    Closed,
    /// Handshake failed.
    Failed,
}

impl fmt::Display for LocalPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::GatheringMedia => "gathering-media",
            Self::CreatingOffer => "creating-offer",
            Self::CreatingAnswer => "creating-answer",
            Self::AwaitingRemoteDescription => "awaiting-remote-description",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Peer-to-peer tuning.
#[derive(Debug, Clone)]
pub struct LocalConfig {
    /// STUN/TURN URLs.
    pub ice_servers: Vec<String>,
    /// Bound on ICE gathering.
    pub ice_gather_timeout: Duration,
    /// Bound on waiting for the peer's description.
    pub remote_description_timeout: Duration,
    /// Bound on the channel opening after descriptions are exchanged.
    pub connect_timeout: Duration,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            ice_servers: DEFAULT_STUN_SERVERS.iter().map(|s| s.to_string()).collect(),
            ice_gather_timeout: ICE_GATHER_TIMEOUT,
            remote_description_timeout: REMOTE_DESCRIPTION_TIMEOUT,
            connect_timeout: PEER_CONNECT_TIMEOUT,
        }
    }
}

/// Collaborators of a [`LocalTransport`].
#[derive(Clone)]
pub struct LocalParts {
    /// Creates the peer connection.
    pub peers: Arc<dyn PeerConnector>,
    /// Opens the signaling carrier.
    pub carriers: Arc<dyn CarrierSource>,
    /// Captures local tracks (listener only).
    pub media: Arc<dyn MediaSource>,
}

/// Peer-to-peer transport.
pub struct LocalTransport {
    inner: Arc<LocalInner>,
}

struct LocalInner {
    session: Session,
    role: Role,
    config: LocalConfig,
    parts: LocalParts,
    events: EventSink,
    phase: Mutex<LocalPhase>,
    peer: Mutex<Option<Arc<dyn PeerLink>>>,
    carrier: Mutex<Option<Arc<dyn SignalingCarrier>>>,
    media: Mutex<Option<LocalMedia>>,
    pump: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl LocalTransport {
    /// Transport for `session` acting as `role`.
    pub fn new(
        session: Session,
        role: Role,
        config: LocalConfig,
        parts: LocalParts,
        events: EventSink,
    ) -> Self {
        Self {
            inner: Arc::new(LocalInner {
                session,
                role,
                config,
                parts,
                events,
                phase: Mutex::new(LocalPhase::Idle),
                peer: Mutex::new(None),
                carrier: Mutex::new(None),
                media: Mutex::new(None),
                pump: Mutex::new(None),
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Current handshake phase.
    pub fn phase(&self) -> LocalPhase {
        *self.inner.phase.lock()
    }
}

impl LocalInner {
    fn set_phase(&self, phase: LocalPhase) {
        let mut current = self.phase.lock();
        if matches!(*current, LocalPhase::Closed | LocalPhase::Failed) {
            return;
        }
        debug!(from = %*current, to = %phase, "local transport phase");
        *current = phase;
    }

    /// Move to `Closed`; true if the channel was open.
    fn close_phase(&self) -> bool {
        let mut current = self.phase.lock();
        let was_open = *current == LocalPhase::Open;
        if *current != LocalPhase::Failed {
            *current = LocalPhase::Closed;
        }
        was_open
    }

    async fn handshake(
        &self,
        peer_tx: PeerEventSender,
        peer_rx: &mut mpsc::UnboundedReceiver<PeerEvent>,
    ) -> TransportResult<()> {
        self.set_phase(LocalPhase::GatheringMedia);
        let media = match self.role {
            Role::Listener => Some(self.parts.media.capture(self.session.mode).await?),
            Role::Parent => None,
        };
        *self.media.lock() = media.clone();

        let peer = self
            .parts
            .peers
            .create(&self.config.ice_servers, peer_tx)
            .await?;
        *self.peer.lock() = Some(peer.clone());
        if let Some(media) = &media {
            for track in &media.tracks {
                peer.add_track(track).await?;
            }
        }

        let carrier = self.parts.carriers.open(&self.session, self.role).await?;
        *self.carrier.lock() = Some(carrier.clone());

        match self.role {
            Role::Listener => {
                self.set_phase(LocalPhase::CreatingOffer);
                peer.create_offer().await?;
                let offer = self.finish_gathering(peer.as_ref()).await?;
                carrier.send_offer(&offer).await?;

                self.set_phase(LocalPhase::AwaitingRemoteDescription);
                let answer = self
                    .await_description(carrier.as_ref(), peer.as_ref(), SdpKind::Answer)
                    .await?;
                peer.set_remote_description(&answer).await?;
            }
            Role::Parent => {
                self.set_phase(LocalPhase::AwaitingRemoteDescription);
                let offer = self
                    .await_description(carrier.as_ref(), peer.as_ref(), SdpKind::Offer)
                    .await?;
                peer.set_remote_description(&offer).await?;

                self.set_phase(LocalPhase::CreatingAnswer);
                peer.create_answer().await?;
                let answer = self.finish_gathering(peer.as_ref()).await?;
                carrier.send_answer(&answer).await?;
            }
        }

        self.set_phase(LocalPhase::Connecting);
        self.await_channel_open(peer_rx).await
    }

    async fn finish_gathering(&self, peer: &dyn PeerLink) -> TransportResult<SessionDescription> {
        let bound = self.config.ice_gather_timeout;
        tokio::time::timeout(bound, peer.gathering_complete())
            .await
            .map_err(|_| TransportError::HandshakeTimeout {
                stage: "ice gathering",
                after: bound,
            })?;
        peer.local_description()
            .await
            .ok_or(TransportError::Peer("no local description".into()))
    }

    async fn await_description(
        &self,
        carrier: &dyn SignalingCarrier,
        peer: &dyn PeerLink,
        want: SdpKind,
    ) -> TransportResult<SessionDescription> {
        let bound = self.config.remote_description_timeout;
        let wait = async {
            loop {
                match carrier.next_event().await? {
                    SignalingEvent::Description { description, mode } if description.kind == want => {
                        if let Some(mode) = mode.filter(|m| *m != self.session.mode) {
                            warn!(%mode, expected = %self.session.mode, "peer announced a different mode");
                        }
                        return Ok::<_, TransportError>(description);
                    }
                    SignalingEvent::Description { description, .. } => {
                        debug!(kind = ?description.kind, "ignoring unexpected description");
                    }
                    SignalingEvent::Candidate(candidate) => {
                        peer.add_ice_candidate(&candidate).await?
                    }
                }
            }
        };
        tokio::time::timeout(bound, wait)
            .await
            .map_err(|_| TransportError::HandshakeTimeout {
                stage: "remote description",
                after: bound,
            })?
    }

    async fn await_channel_open(
        &self,
        peer_rx: &mut mpsc::UnboundedReceiver<PeerEvent>,
    ) -> TransportResult<()> {
        let bound = self.config.connect_timeout;
        let wait = async {
            loop {
                match peer_rx.recv().await {
                    Some(PeerEvent::ChannelOpen) => return Ok(()),
                    Some(PeerEvent::StateChanged(PeerState::Failed | PeerState::Closed))
                    | Some(PeerEvent::ChannelClosed)
                    | None => return Err(TransportError::Peer("peer connection failed".into())),
                    Some(event) => self.dispatch(event),
                }
            }
        };
        tokio::time::timeout(bound, wait)
            .await
            .map_err(|_| TransportError::HandshakeTimeout {
                stage: "data channel open",
                after: bound,
            })?
    }

    fn dispatch(&self, event: PeerEvent) {
        match event {
            PeerEvent::ChannelMessage(text) => {
                if let Some(message) = TransportMessage::parse_for(&text, &self.session) {
                    self.events.emit(TransportEvent::Message(message));
                }
            }
            PeerEvent::RemoteTrack(kind) => {
                self.events.emit(TransportEvent::RemoteTrack { kind });
            }
            PeerEvent::StateChanged(state) => debug!(?state, "peer state"),
            PeerEvent::ChannelOpen | PeerEvent::ChannelClosed => {}
        }
    }

    async fn pump(self: Arc<Self>, mut peer_rx: mpsc::UnboundedReceiver<PeerEvent>) {
        loop {
            let event = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                event = peer_rx.recv() => event,
            };
            match event {
                Some(PeerEvent::ChannelClosed)
                | Some(PeerEvent::StateChanged(
                    PeerState::Disconnected | PeerState::Failed | PeerState::Closed,
                ))
                | None => break,
                Some(event) => self.dispatch(event),
            }
        }

        info!(room_id = %self.session.room_id, "peer channel lost");
        if self.close_phase() {
            self.events
                .emit(TransportEvent::Disconnected { will_retry: false });
        }
        self.teardown().await;
    }

    /// Release everything in order: timers, channel, media, peer.
    async fn teardown(&self) {
        self.cancel.cancel();
        drop(self.pump.lock().take());

        let peer = self.peer.lock().take();
        let carrier = self.carrier.lock().take();
        let media = self.media.lock().take();

        if let Some(peer) = &peer {
            peer.close_channel().await;
        }
        if let Some(carrier) = carrier {
            carrier.close().await;
        }
        if let Some(media) = media {
            self.parts.media.release(media).await;
        }
        if let Some(peer) = peer {
            peer.close().await;
        }
    }
}

#[async_trait]
impl Transport for LocalTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Local
    }

    async fn connect(&self) -> TransportResult<()> {
        let inner = &self.inner;
        if inner.cancel.is_cancelled() {
            return Err(TransportError::Cancelled);
        }
        if *inner.phase.lock() != LocalPhase::Idle {
            return Err(TransportError::InvalidState("connect already called"));
        }

        info!(role = %inner.role, room_id = %inner.session.room_id, "starting peer handshake");
        let (peer_tx, mut peer_rx) = mpsc::unbounded_channel();
        let result = tokio::select! {
            biased;
            _ = inner.cancel.cancelled() => Err(TransportError::Cancelled),
            result = inner.handshake(peer_tx, &mut peer_rx) => result,
        };

        match result {
            Ok(()) if !inner.cancel.is_cancelled() => {
                inner.set_phase(LocalPhase::Open);
                info!(room_id = %inner.session.room_id, "peer channel open");
                inner.events.emit(TransportEvent::Connected);
                let pump = tokio::spawn(inner.clone().pump(peer_rx));
                *inner.pump.lock() = Some(pump);
                Ok(())
            }
            Ok(()) | Err(TransportError::Cancelled) => {
                // Parts created after a concurrent teardown still need releasing.
                inner.teardown().await;
                Err(TransportError::Cancelled)
            }
            Err(e) if inner.cancel.is_cancelled() => {
                debug!(error = %e, "handshake ended by disconnect");
                inner.teardown().await;
                Err(TransportError::Cancelled)
            }
            Err(e) => {
                warn!(error = %e, "peer handshake failed");
                inner.set_phase(LocalPhase::Failed);
                inner.events.error(e.to_string(), true);
                inner.events.emit(TransportEvent::Failed {
                    reason: e.to_string(),
                });
                inner.teardown().await;
                Err(e)
            }
        }
    }

    async fn send(&self, message: &TransportMessage) -> TransportResult<()> {
        if !self.is_ready() {
            return Err(TransportError::NotReady);
        }
        let peer = self.inner.peer.lock().clone();
        let peer = peer.ok_or(TransportError::NotReady)?;
        peer.send_text(message.to_json()?).await
    }

    async fn disconnect(&self) {
        let inner = &self.inner;
        if inner.cancel.is_cancelled() && inner.peer.lock().is_none() {
            return;
        }
        let was_open = inner.close_phase();
        inner.teardown().await;
        if was_open {
            inner
                .events
                .emit(TransportEvent::Disconnected { will_retry: false });
        }
    }

    fn is_ready(&self) -> bool {
        *self.inner.phase.lock() == LocalPhase::Open
    }
}
