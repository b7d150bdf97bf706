//! Relay-socket carrier.
//!
//! The relay only forwards frames to members already in the room, so each
//! side announces itself with a hello on open and the listener repeats its
//! offer when the parent's hello arrives.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};
use url::Url;

use super::{CarrierKind, CarrierSource, SignalingCarrier, SignalingError, SignalingEvent, SignalingResult};
use crate::codec::SessionDescription;
use crate::core::CHANNEL_SIGNALING;
use crate::session::{Role, Session};
use crate::transport::{
    IceCandidate, RelayConnector, RelaySocket, SocketEvent, SocketReader, SocketWriter,
    TransportMessage, relay_url,
};

/// Carrier over the relay's `signaling` channel.
pub struct RelaySignaling {
    session: Session,
    role: Role,
    last_offer: Mutex<Option<SessionDescription>>,
    writer: Mutex<Option<SocketWriter>>,
    reader: AsyncMutex<SocketReader>,
}

impl RelaySignaling {
    /// Use an open socket for `session`, acting as `role`.
    pub fn new(session: Session, role: Role, socket: RelaySocket) -> Self {
        let (writer, reader) = socket.split();
        Self {
            session,
            role,
            last_offer: Mutex::new(None),
            writer: Mutex::new(Some(writer)),
            reader: AsyncMutex::new(reader),
        }
    }

    /// Announce this side to whoever is in the room.
    pub fn announce(&self) -> SignalingResult<()> {
        self.send_message(TransportMessage::hello(self.role, &self.session))
    }

    fn offer_message(&self, offer: &SessionDescription) -> TransportMessage {
        TransportMessage::Offer {
            room_id: self.session.room_id.clone(),
            join_key: self.session.join_key.clone(),
            sdp: offer.sdp.clone(),
        }
    }

    fn send_message(&self, message: TransportMessage) -> SignalingResult<()> {
        let frame = message.to_json()?;
        let writer = self.writer.lock();
        let writer = writer.as_ref().ok_or(SignalingError::Closed)?;
        writer
            .send(frame)
            .map_err(|e| SignalingError::Link(e.to_string()))
    }
}

#[async_trait]
impl SignalingCarrier for RelaySignaling {
    fn kind(&self) -> CarrierKind {
        CarrierKind::Relay
    }

    async fn send_offer(&self, offer: &SessionDescription) -> SignalingResult<()> {
        *self.last_offer.lock() = Some(offer.clone());
        self.send_message(self.offer_message(offer))
    }

    async fn send_answer(&self, answer: &SessionDescription) -> SignalingResult<()> {
        self.send_message(TransportMessage::Answer {
            room_id: self.session.room_id.clone(),
            join_key: self.session.join_key.clone(),
            sdp: answer.sdp.clone(),
        })
    }

    async fn send_ice_candidate(&self, candidate: &IceCandidate) -> SignalingResult<()> {
        self.send_message(TransportMessage::IceCandidate {
            room_id: self.session.room_id.clone(),
            join_key: self.session.join_key.clone(),
            candidate: candidate.clone(),
        })
    }

    async fn next_event(&self) -> SignalingResult<SignalingEvent> {
        let mut reader = self.reader.lock().await;
        loop {
            let frame = match reader.recv().await {
                SocketEvent::Frame(frame) => frame,
                SocketEvent::Error(e) => {
                    warn!(error = %e, "relay signaling socket error");
                    continue;
                }
                SocketEvent::Closed => return Err(SignalingError::Closed),
            };
            let Some(message) = TransportMessage::parse_for(&frame, &self.session) else {
                continue;
            };
            return Ok(match message {
                TransportMessage::Offer { sdp, .. } => SignalingEvent::Description {
                    description: SessionDescription::offer(sdp),
                    mode: None,
                },
                TransportMessage::Answer { sdp, .. } => SignalingEvent::Description {
                    description: SessionDescription::answer(sdp),
                    mode: None,
                },
                TransportMessage::IceCandidate { candidate, .. } => {
                    SignalingEvent::Candidate(candidate)
                }
                TransportMessage::ParentHello { .. } if self.role == Role::Listener => {
                    let offer = self.last_offer.lock().clone();
                    if let Some(offer) = offer {
                        debug!(room_id = %self.session.room_id, "parent joined, resending offer");
                        self.send_message(self.offer_message(&offer))?;
                    }
                    continue;
                }
                other => {
                    debug!(kind = other.kind(), "ignoring non-signaling message");
                    continue;
                }
            });
        }
    }

    async fn close(&self) {
        self.writer.lock().take();
    }
}

/// Opens [`RelaySignaling`] carriers against a relay endpoint.
#[derive(Clone)]
pub struct RelaySignalingSource {
    base: Url,
    connector: Arc<dyn RelayConnector>,
}

impl RelaySignalingSource {
    /// Relay at `base`, sockets opened through `connector`.
    pub fn new(base: Url, connector: Arc<dyn RelayConnector>) -> Self {
        Self { base, connector }
    }
}

#[async_trait]
impl CarrierSource for RelaySignalingSource {
    async fn open(
        &self,
        session: &Session,
        role: Role,
    ) -> SignalingResult<Arc<dyn SignalingCarrier>> {
        let url = relay_url(&self.base, session, CHANNEL_SIGNALING);
        let socket = self
            .connector
            .open(&url)
            .await
            .map_err(|e| SignalingError::Unavailable {
                carrier: CarrierKind::Relay,
                reason: e.to_string(),
            })?;
        let carrier = RelaySignaling::new(session.clone(), role, socket);
        carrier.announce()?;
        Ok(Arc::new(carrier))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionConfig;
    use crate::transport::testing::ScriptedConnector;

    #[tokio::test]
    async fn test_offer_goes_out_on_signaling_channel() {
        let connector = ScriptedConnector::opening();
        let base = Url::parse("ws://relay.test/ws").unwrap();
        let source = RelaySignalingSource::new(base, connector.clone());
        let session = Session::generate(&SessionConfig::default());

        let carrier = source.open(&session, Role::Listener).await.unwrap();
        let mut remote = connector.next_remote().await;
        assert!(remote.url.as_str().contains("channel=signaling"));

        let hello: serde_json::Value =
            serde_json::from_str(&remote.sent.recv().await.unwrap()).unwrap();
        assert_eq!(hello["type"], "listener:hello");

        carrier.send_offer(&SessionDescription::offer("v=0")).await.unwrap();
        let frame = remote.sent.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["type"], "offer");
        assert_eq!(value["roomId"], session.room_id.as_str());
    }

    #[tokio::test]
    async fn test_offer_resent_when_parent_joins() {
        let connector = ScriptedConnector::opening();
        let source = RelaySignalingSource::new(Url::parse("ws://relay.test").unwrap(), connector.clone());
        let session = Session::generate(&SessionConfig::default());

        let carrier = source.open(&session, Role::Listener).await.unwrap();
        let mut remote = connector.next_remote().await;
        carrier.send_offer(&SessionDescription::offer("v=0 late")).await.unwrap();
        let _hello = remote.sent.recv().await.unwrap();
        let _first = remote.sent.recv().await.unwrap();

        let waiter = {
            let carrier = carrier.clone();
            tokio::spawn(async move { carrier.next_event().await })
        };
        let parent_hello = TransportMessage::hello(Role::Parent, &session);
        remote.inject(SocketEvent::Frame(parent_hello.to_json().unwrap()));

        let resent = remote.sent.recv().await.unwrap();
        assert_eq!(
            TransportMessage::parse_for(&resent, &session),
            Some(TransportMessage::Offer {
                room_id: session.room_id.clone(),
                join_key: session.join_key.clone(),
                sdp: "v=0 late".into(),
            })
        );

        let answer = TransportMessage::Answer {
            room_id: session.room_id.clone(),
            join_key: session.join_key.clone(),
            sdp: "v=0 answer".into(),
        };
        remote.inject(SocketEvent::Frame(answer.to_json().unwrap()));
        assert_eq!(
            waiter.await.unwrap().unwrap(),
            SignalingEvent::Description {
                description: SessionDescription::answer("v=0 answer"),
                mode: None,
            }
        );
    }

    #[tokio::test]
    async fn test_parent_hello_before_offer_is_ignored() {
        let connector = ScriptedConnector::opening();
        let source = RelaySignalingSource::new(Url::parse("ws://relay.test").unwrap(), connector.clone());
        let session = Session::generate(&SessionConfig::default());

        let carrier = source.open(&session, Role::Listener).await.unwrap();
        let mut remote = connector.next_remote().await;
        let _hello = remote.sent.recv().await.unwrap();

        let parent_hello = TransportMessage::hello(Role::Parent, &session);
        remote.inject(SocketEvent::Frame(parent_hello.to_json().unwrap()));
        remote.inject(SocketEvent::Closed);

        assert!(matches!(carrier.next_event().await, Err(SignalingError::Closed)));
        assert!(remote.sent.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_foreign_and_media_frames_skipped() {
        let connector = ScriptedConnector::opening();
        let source = RelaySignalingSource::new(Url::parse("ws://relay.test").unwrap(), connector.clone());
        let session = Session::generate(&SessionConfig::default());
        let other = Session::generate(&SessionConfig::default());

        let carrier = source.open(&session, Role::Parent).await.unwrap();
        let remote = connector.next_remote().await;

        let foreign = TransportMessage::Offer {
            room_id: other.room_id.clone(),
            join_key: other.join_key.clone(),
            sdp: "foreign".into(),
        };
        let ping = TransportMessage::ping(&session, 1);
        let offer = TransportMessage::Offer {
            room_id: session.room_id.clone(),
            join_key: session.join_key.clone(),
            sdp: "mine".into(),
        };
        for message in [foreign, ping, offer] {
            remote.inject(SocketEvent::Frame(message.to_json().unwrap()));
        }

        assert_eq!(
            carrier.next_event().await.unwrap(),
            SignalingEvent::Description {
                description: SessionDescription::offer("mine"),
                mode: None,
            }
        );
    }

    #[tokio::test]
    async fn test_refused_socket_is_unavailable() {
        let connector = ScriptedConnector::failing();
        let source = RelaySignalingSource::new(Url::parse("ws://relay.test").unwrap(), connector);
        let session = Session::generate(&SessionConfig::default());

        assert!(matches!(
            source.open(&session, Role::Listener).await,
            Err(SignalingError::Unavailable { carrier: CarrierKind::Relay, .. })
        ));
    }
}
