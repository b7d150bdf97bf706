//! In-memory stand-ins for sockets, peers and capture devices.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use url::Url;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

use super::error::{TransportError, TransportResult};
use super::local::{PeerConnector, PeerEventSender, PeerLink};
use super::message::IceCandidate;
use super::socket::{RelayConnector, RelaySocket, SocketEvent};
use crate::codec::SessionDescription;
use crate::platform::{LocalMedia, MediaError, MediaKind, MediaSource, MediaTrack};

/// Ordered record of teardown-relevant calls.
pub(crate) type Journal = Arc<Mutex<Vec<&'static str>>>;

pub(crate) fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

/// The far side of a socket handed out by [`ScriptedConnector`].
pub(crate) struct RemoteEnd {
    pub url: Url,
    pub sent: mpsc::UnboundedReceiver<String>,
    inbound: mpsc::UnboundedSender<SocketEvent>,
}

impl RemoteEnd {
    pub fn inject(&self, event: SocketEvent) {
        let _ = self.inbound.send(event);
    }
}

/// Relay connector whose opens succeed or fail from a script.
pub(crate) struct ScriptedConnector {
    script: Mutex<VecDeque<bool>>,
    otherwise: bool,
    opens: AtomicU32,
    remotes_tx: mpsc::UnboundedSender<RemoteEnd>,
    remotes_rx: AsyncMutex<mpsc::UnboundedReceiver<RemoteEnd>>,
}

impl ScriptedConnector {
    /// Follow `script`, then answer `otherwise`.
    pub fn scripted(script: &[bool], otherwise: bool) -> Arc<Self> {
        let (remotes_tx, remotes_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            script: Mutex::new(script.iter().copied().collect()),
            otherwise,
            opens: AtomicU32::new(0),
            remotes_tx,
            remotes_rx: AsyncMutex::new(remotes_rx),
        })
    }

    pub fn opening() -> Arc<Self> {
        Self::scripted(&[], true)
    }

    pub fn failing() -> Arc<Self> {
        Self::scripted(&[], false)
    }

    /// Opens attempted so far.
    pub fn opens(&self) -> u32 {
        self.opens.load(Ordering::SeqCst)
    }

    /// Wait for the next successfully opened socket.
    pub async fn next_remote(&self) -> RemoteEnd {
        self.remotes_rx
            .lock()
            .await
            .recv()
            .await
            .expect("connector alive")
    }
}

#[async_trait]
impl RelayConnector for ScriptedConnector {
    async fn open(&self, url: &Url) -> TransportResult<RelaySocket> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let accept = self.script.lock().pop_front().unwrap_or(self.otherwise);
        if !accept {
            return Err(TransportError::ConnectFailed("connection refused".into()));
        }

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let _ = self.remotes_tx.send(RemoteEnd {
            url: url.clone(),
            sent: out_rx,
            inbound: in_tx,
        });
        Ok(RelaySocket::new(out_tx, in_rx))
    }
}

/// Peer link that records calls and never touches the network.
pub(crate) struct FakePeer {
    journal: Journal,
    stall_gathering: bool,
    tracks: Mutex<usize>,
    local: Mutex<Option<SessionDescription>>,
    remote: Mutex<Option<SessionDescription>>,
    sent: Mutex<Vec<String>>,
}

impl FakePeer {
    pub fn track_count(&self) -> usize {
        *self.tracks.lock()
    }

    pub fn remote_description(&self) -> Option<SessionDescription> {
        self.remote.lock().clone()
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl PeerLink for FakePeer {
    async fn add_track(&self, _track: &MediaTrack) -> TransportResult<()> {
        self.journal.lock().push("add_track");
        *self.tracks.lock() += 1;
        Ok(())
    }

    async fn create_offer(&self) -> TransportResult<()> {
        *self.local.lock() = Some(SessionDescription::offer("v=0\r\nm=audio 9 UDP/TLS/RTP/SAVPF 111\r\n"));
        Ok(())
    }

    async fn create_answer(&self) -> TransportResult<()> {
        *self.local.lock() = Some(SessionDescription::answer("v=0\r\nm=audio 9 UDP/TLS/RTP/SAVPF 111\r\n"));
        Ok(())
    }

    async fn set_remote_description(
        &self,
        description: &SessionDescription,
    ) -> TransportResult<()> {
        *self.remote.lock() = Some(description.clone());
        Ok(())
    }

    async fn add_ice_candidate(&self, _candidate: &IceCandidate) -> TransportResult<()> {
        Ok(())
    }

    async fn gathering_complete(&self) {
        if self.stall_gathering {
            std::future::pending::<()>().await;
        }
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        self.local.lock().clone()
    }

    async fn send_text(&self, text: String) -> TransportResult<()> {
        self.sent.lock().push(text);
        Ok(())
    }

    async fn close_channel(&self) {
        self.journal.lock().push("close_channel");
    }

    async fn close(&self) {
        self.journal.lock().push("close_peer");
    }
}

/// Hands out [`FakePeer`]s and exposes each with its event sender.
pub(crate) struct FakePeers {
    journal: Journal,
    stall_gathering: bool,
    created_tx: mpsc::UnboundedSender<(Arc<FakePeer>, PeerEventSender)>,
    created_rx: AsyncMutex<mpsc::UnboundedReceiver<(Arc<FakePeer>, PeerEventSender)>>,
}

impl FakePeers {
    fn build(journal: Journal, stall_gathering: bool) -> Arc<Self> {
        let (created_tx, created_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            journal,
            stall_gathering,
            created_tx,
            created_rx: AsyncMutex::new(created_rx),
        })
    }

    pub fn new(journal: Journal) -> Arc<Self> {
        Self::build(journal, false)
    }

    /// Peers whose ICE gathering never completes.
    pub fn stalling(journal: Journal) -> Arc<Self> {
        Self::build(journal, true)
    }

    pub async fn next_peer(&self) -> (Arc<FakePeer>, PeerEventSender) {
        self.created_rx
            .lock()
            .await
            .recv()
            .await
            .expect("factory alive")
    }
}

#[async_trait]
impl PeerConnector for FakePeers {
    async fn create(
        &self,
        _ice_servers: &[String],
        events: PeerEventSender,
    ) -> TransportResult<Arc<dyn PeerLink>> {
        let peer = Arc::new(FakePeer {
            journal: self.journal.clone(),
            stall_gathering: self.stall_gathering,
            tracks: Mutex::new(0),
            local: Mutex::new(None),
            remote: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
        });
        let _ = self.created_tx.send((peer.clone(), events));
        Ok(peer)
    }
}

/// Capture source producing silent sample tracks.
pub(crate) struct FakeMedia {
    journal: Journal,
    deny: bool,
}

impl FakeMedia {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            deny: false,
        }
    }

    /// Every capture is refused by the user.
    pub fn denying(journal: Journal) -> Self {
        Self {
            journal,
            deny: true,
        }
    }
}

#[async_trait]
impl MediaSource for FakeMedia {
    async fn local_media(&self, kind: MediaKind) -> Result<MediaTrack, MediaError> {
        if self.deny {
            return Err(MediaError::PermissionDenied(kind));
        }
        self.journal.lock().push("capture");
        let mime_type = match kind {
            MediaKind::Audio => MIME_TYPE_OPUS,
            MediaKind::Video => MIME_TYPE_VP8,
        };
        let track = TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: mime_type.to_owned(),
                ..Default::default()
            },
            kind.to_string(),
            "bsm".to_owned(),
        );
        Ok(MediaTrack {
            kind,
            track: Arc::new(track),
        })
    }

    async fn release(&self, _media: LocalMedia) {
        self.journal.lock().push("release_media");
    }
}
