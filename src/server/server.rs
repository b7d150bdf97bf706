//! WebSocket relay server.
//!
//! Accepts upgrades at any path, admits each connection into a room using
//! its `room`, `key` and `channel` query parameters, and forwards text frames
//! to the other member of the room.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::rooms::{AdmitError, Admission, JoinRequest, RoomRegistry};

/// Errors that can occur in the relay server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to address.
    #[error("bind failed: {0}")]
    BindFailed(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct RelayServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,

    /// Maximum number of concurrent rooms.
    pub max_rooms: usize,
}

impl Default for RelayServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8787"
                .parse()
                .expect("default bind address is valid"),
            max_rooms: 1000,
        }
    }
}

/// Builder for [`RelayServerConfig`].
#[derive(Debug)]
pub struct RelayServerBuilder {
    config: RelayServerConfig,
}

impl RelayServerBuilder {
    /// Create a new server builder.
    pub fn new() -> Self {
        Self {
            config: RelayServerConfig::default(),
        }
    }

    /// Set the bind address.
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.config.bind_addr = addr;
        self
    }

    /// Set the maximum number of concurrent rooms.
    pub fn max_rooms(mut self, max: usize) -> Self {
        self.config.max_rooms = max;
        self
    }

    /// Build the server configuration.
    pub fn build(self) -> RelayServerConfig {
        self.config
    }
}

impl Default for RelayServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound relay server.
///
/// ```ignore
/// let config = RelayServerBuilder::new()
///     .bind_addr("127.0.0.1:8787".parse()?)
///     .build();
/// let server = RelayServer::bind(config).await?;
/// let shutdown = server.shutdown_token();
/// tokio::spawn(server.run());
/// // ...
/// shutdown.cancel();
/// ```
pub struct RelayServer {
    config: RelayServerConfig,
    listener: TcpListener,
    local_addr: SocketAddr,
    registry: Arc<RoomRegistry>,
    shutdown: CancellationToken,
}

impl RelayServer {
    /// Bind the listening socket.
    pub async fn bind(config: RelayServerConfig) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(config.bind_addr)
            .await
            .map_err(|e| ServerError::BindFailed(e.to_string()))?;
        let local_addr = listener.local_addr()?;

        Ok(Self {
            registry: Arc::new(RoomRegistry::new(config.max_rooms)),
            config,
            listener,
            local_addr,
            shutdown: CancellationToken::new(),
        })
    }

    /// Get the local address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Get the server configuration.
    pub fn config(&self) -> &RelayServerConfig {
        &self.config
    }

    /// The room registry.
    pub fn registry(&self) -> Arc<RoomRegistry> {
        self.registry.clone()
    }

    /// Token that stops [`run`](Self::run) and closes every connection.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Accept connections until shut down.
    pub async fn run(self) -> Result<(), ServerError> {
        info!(addr = %self.local_addr, max_rooms = self.config.max_rooms, "relay listening");

        loop {
            let (stream, peer) = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        continue;
                    }
                },
            };
            tokio::spawn(serve(
                stream,
                peer,
                self.registry.clone(),
                self.shutdown.child_token(),
            ));
        }

        info!("relay stopped");
        Ok(())
    }
}

fn reject(error: &AdmitError) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(error.to_string()));
    *response.status_mut() =
        StatusCode::from_u16(error.status()).unwrap_or(StatusCode::BAD_REQUEST);
    response
}

async fn serve(
    stream: TcpStream,
    peer: SocketAddr,
    registry: Arc<RoomRegistry>,
    shutdown: CancellationToken,
) {
    let mut admitted: Option<Admission> = None;
    let callback = |request: &Request, response: Response| {
        match JoinRequest::from_query(request.uri().query()).and_then(|r| registry.admit(r)) {
            Ok(admission) => {
                admitted = Some(admission);
                Ok(response)
            }
            Err(e) => {
                debug!(%peer, error = %e, "upgrade refused");
                Err(reject(&e))
            }
        }
    };

    let handshake = accept_hdr_async(stream, callback).await;
    let Some(Admission {
        room,
        member,
        mut outbound,
    }) = admitted
    else {
        return;
    };
    let ws = match handshake {
        Ok(ws) => ws,
        Err(e) => {
            debug!(%peer, error = %e, "handshake failed");
            registry.leave(&room, member);
            return;
        }
    };

    debug!(%peer, %room, member, "member connected");
    let (mut sink, mut stream) = ws.split();
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            frame = outbound.recv() => {
                let Some(frame) = frame else { break };
                if sink.send(Message::Text(frame)).await.is_err() {
                    break;
                }
            }
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    registry.broadcast(&room, member, &text);
                }
                Some(Ok(Message::Ping(data))) => {
                    if sink.send(Message::Pong(data)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => trace!(%room, "ignoring non-text frame"),
                Some(Err(e)) => {
                    debug!(%peer, error = %e, "read failed");
                    break;
                }
            },
        }
    }

    registry.leave(&room, member);
    let _ = sink.close().await;
    debug!(%peer, %room, member, "member disconnected");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::core::RELAY_QUERY_CHANNEL;
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Error as WsError;

    async fn start(max_rooms: usize) -> (SocketAddr, CancellationToken) {
        let config = RelayServerBuilder::new()
            .bind_addr("127.0.0.1:0".parse().unwrap())
            .max_rooms(max_rooms)
            .build();
        let server = RelayServer::bind(config).await.unwrap();
        let addr = server.local_addr();
        let shutdown = server.shutdown_token();
        tokio::spawn(server.run());
        (addr, shutdown)
    }

    fn url(addr: SocketAddr, query: &str) -> String {
        format!("ws://{addr}/ws?{query}")
    }

    fn refused_status(result: Result<impl Sized, WsError>) -> u16 {
        match result {
            Err(WsError::Http(response)) => response.status().as_u16(),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("upgrade was accepted"),
        }
    }

    #[tokio::test]
    async fn test_mismatched_key_rejected() {
        let (addr, shutdown) = start(8).await;
        let _first = connect_async(url(addr, "room=room_a&key=key_one"))
            .await
            .unwrap();

        let status = refused_status(connect_async(url(addr, "room=room_a&key=key_two")).await);
        assert_eq!(status, 409);
        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_third_member_rejected() {
        let (addr, shutdown) = start(8).await;
        let _a = connect_async(url(addr, "room=room_a&key=key_one")).await.unwrap();
        let _b = connect_async(url(addr, "room=room_a&key=key_one")).await.unwrap();

        let status = refused_status(connect_async(url(addr, "room=room_a&key=key_one")).await);
        assert_eq!(status, 409);
        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_missing_parameters_and_room_limit() {
        let (addr, shutdown) = start(1).await;
        assert_eq!(
            refused_status(connect_async(url(addr, "key=key_one")).await),
            400
        );

        let _a = connect_async(url(addr, "room=room_a&key=key_one")).await.unwrap();
        assert_eq!(
            refused_status(connect_async(url(addr, "room=room_b&key=key_one")).await),
            503
        );
        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_frames_stay_within_room() {
        let (addr, shutdown) = start(8).await;
        let (mut a1, _) = connect_async(url(addr, "room=room_a&key=key_one")).await.unwrap();
        let (mut a2, _) = connect_async(url(addr, "room=room_a&key=key_one")).await.unwrap();
        let (mut b1, _) = connect_async(url(addr, "room=room_b&key=key_one")).await.unwrap();
        let signaling = format!("room=room_a&key=key_one&{RELAY_QUERY_CHANNEL}=signaling");
        let (mut s1, _) = connect_async(url(addr, &signaling)).await.unwrap();

        a1.send(Message::Text("{\"type\":\"ping\"}".into()))
            .await
            .unwrap();

        let relayed = a2.next().await.unwrap().unwrap();
        assert_eq!(relayed, Message::Text("{\"type\":\"ping\"}".into()));

        let quiet = Duration::from_millis(100);
        assert!(tokio::time::timeout(quiet, b1.next()).await.is_err());
        assert!(tokio::time::timeout(quiet, s1.next()).await.is_err());
        assert!(tokio::time::timeout(quiet, a1.next()).await.is_err());
        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_offer_reaches_parent_joining_late() {
        use crate::codec::SessionDescription;
        use crate::session::{Role, Session, SessionConfig};
        use crate::signaling::{CarrierSource, RelaySignalingSource, SignalingEvent};
        use crate::transport::WsConnector;
        use url::Url;

        let (addr, shutdown) = start(8).await;
        let base = Url::parse(&format!("ws://{addr}/ws")).unwrap();
        let source = RelaySignalingSource::new(base, Arc::new(WsConnector::default()));
        let session = Session::generate(&SessionConfig::default());

        let listener = source.open(&session, Role::Listener).await.unwrap();
        listener
            .send_offer(&SessionDescription::offer("v=0 offer"))
            .await
            .unwrap();
        let awaiting_answer = {
            let listener = listener.clone();
            tokio::spawn(async move { listener.next_event().await })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        let parent = source.open(&session, Role::Parent).await.unwrap();
        let offer = tokio::time::timeout(Duration::from_secs(5), parent.next_event())
            .await
            .expect("offer relayed")
            .unwrap();
        assert_eq!(
            offer,
            SignalingEvent::Description {
                description: SessionDescription::offer("v=0 offer"),
                mode: None,
            }
        );

        parent
            .send_answer(&SessionDescription::answer("v=0 answer"))
            .await
            .unwrap();
        let answer = tokio::time::timeout(Duration::from_secs(5), awaiting_answer)
            .await
            .expect("answer relayed")
            .unwrap()
            .unwrap();
        assert_eq!(
            answer,
            SignalingEvent::Description {
                description: SessionDescription::answer("v=0 answer"),
                mode: None,
            }
        );
        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_room_reopens_after_members_leave() {
        let (addr, shutdown) = start(8).await;
        let (mut a, _) = connect_async(url(addr, "room=room_a&key=key_one")).await.unwrap();
        a.close(None).await.unwrap();
        while let Some(Ok(_)) = a.next().await {}

        let mut reopened = None;
        for _ in 0..50 {
            match connect_async(url(addr, "room=room_a&key=key_two")).await {
                Ok(pair) => {
                    reopened = Some(pair);
                    break;
                }
                Err(_) => tokio::time::sleep(Duration::from_millis(10)).await,
            }
        }
        assert!(reopened.is_some());
        shutdown.cancel();
    }
}
