//! Relay socket plumbing.
//!
//! A [`RelaySocket`] is a pair of channels fed by two background tasks that
//! own the WebSocket halves. Dropping the socket's writer closes the
//! connection.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};
use url::Url;

use super::error::{TransportError, TransportResult};
use crate::core::{RELAY_CONNECT_TIMEOUT, RELAY_QUERY_CHANNEL, RELAY_QUERY_KEY, RELAY_QUERY_ROOM};
use crate::session::Session;

/// Something read from the relay socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// A UTF-8 text frame.
    Frame(String),
    /// Socket error; a `Closed` follows.
    Error(String),
    /// The connection is gone.
    Closed,
}

/// An open relay connection.
#[derive(Debug)]
pub struct RelaySocket {
    outbound: mpsc::UnboundedSender<String>,
    inbound: mpsc::UnboundedReceiver<SocketEvent>,
}

impl RelaySocket {
    /// Wrap the channel ends of an open connection.
    pub fn new(
        outbound: mpsc::UnboundedSender<String>,
        inbound: mpsc::UnboundedReceiver<SocketEvent>,
    ) -> Self {
        Self { outbound, inbound }
    }

    /// Split into independently owned halves.
    pub fn split(self) -> (SocketWriter, SocketReader) {
        (SocketWriter(self.outbound), SocketReader(self.inbound))
    }
}

/// Sending half of a [`RelaySocket`].
#[derive(Debug, Clone)]
pub struct SocketWriter(mpsc::UnboundedSender<String>);

impl SocketWriter {
    /// Queue a text frame.
    pub fn send(&self, frame: String) -> TransportResult<()> {
        self.0.send(frame).map_err(|_| TransportError::NotReady)
    }
}

/// Receiving half of a [`RelaySocket`].
#[derive(Debug)]
pub struct SocketReader(mpsc::UnboundedReceiver<SocketEvent>);

impl SocketReader {
    /// Next event; `Closed` once the connection is gone.
    pub async fn recv(&mut self) -> SocketEvent {
        self.0.recv().await.unwrap_or(SocketEvent::Closed)
    }
}

/// Opens relay sockets.
#[async_trait]
pub trait RelayConnector: Send + Sync {
    /// Open a socket to `url`.
    async fn open(&self, url: &Url) -> TransportResult<RelaySocket>;
}

/// WebSocket connector.
#[derive(Debug, Clone)]
pub struct WsConnector {
    connect_timeout: Duration,
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new(RELAY_CONNECT_TIMEOUT)
    }
}

impl WsConnector {
    /// Connector bounding each open by `connect_timeout`.
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl RelayConnector for WsConnector {
    async fn open(&self, url: &Url) -> TransportResult<RelaySocket> {
        debug!(host = url.host_str().unwrap_or(""), "opening relay socket");

        let (ws, _response) =
            match tokio::time::timeout(self.connect_timeout, connect_async(url.as_str())).await {
                Ok(Ok(pair)) => pair,
                Ok(Err(e)) => return Err(TransportError::ConnectFailed(e.to_string())),
                Err(_) => {
                    return Err(TransportError::HandshakeTimeout {
                        stage: "relay connect",
                        after: self.connect_timeout,
                    });
                }
            };

        let (mut sink, mut stream) = ws.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        let (in_tx, in_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                if let Err(e) = sink.send(Message::Text(frame)).await {
                    debug!(error = %e, "relay write failed");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                let event = match item {
                    Ok(Message::Text(text)) => SocketEvent::Frame(text),
                    Ok(Message::Binary(data)) => match String::from_utf8(data) {
                        Ok(text) => SocketEvent::Frame(text),
                        Err(_) => {
                            warn!("dropping non-utf8 binary frame");
                            continue;
                        }
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        let _ = in_tx.send(SocketEvent::Error(e.to_string()));
                        break;
                    }
                };
                if in_tx.send(event).is_err() {
                    break;
                }
            }
            let _ = in_tx.send(SocketEvent::Closed);
        });

        Ok(RelaySocket::new(out_tx, in_rx))
    }
}

/// Relay URL for `session` on logical `channel`.
///
/// Existing query parameters of `base` are kept.
pub fn relay_url(base: &Url, session: &Session, channel: &str) -> Url {
    let mut url = base.clone();
    url.query_pairs_mut()
        .append_pair(RELAY_QUERY_ROOM, &session.room_id)
        .append_pair(RELAY_QUERY_KEY, &session.join_key)
        .append_pair(RELAY_QUERY_CHANNEL, channel);
    url
}
