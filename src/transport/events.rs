//! Transport lifecycle events and connection status.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::message::TransportMessage;
use crate::platform::MediaKind;

/// Externally observed connection status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// No transport, or the transport was closed.
    #[default]
    Disconnected,
    /// Handshake or reconnection in progress.
    Connecting,
    /// Channel open.
    Connected,
    /// Retries exhausted or handshake failed.
    Failed,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Which transport implementation is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Peer-to-peer data channel and media tracks.
    Local,
    /// WebSocket through a relay.
    Relay,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Relay => f.write_str("relay"),
        }
    }
}

/// Events emitted by a transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Channel opened (again, after a reconnect).
    Connected,
    /// Channel closed.
    Disconnected {
        /// The transport will try to reopen on its own.
        will_retry: bool,
    },
    /// Waiting before the next open attempt.
    Reconnecting {
        /// 1-based attempt number.
        attempt: u32,
        /// Delay before the attempt.
        delay: Duration,
    },
    /// Terminal failure; no further attempts.
    Failed {
        /// Last error.
        reason: String,
    },
    /// Something went wrong.
    Error {
        /// Human-readable description.
        message: String,
        /// The transport is unusable afterwards.
        fatal: bool,
    },
    /// A validated message for the active session.
    Message(TransportMessage),
    /// The peer started sending a media track.
    RemoteTrack {
        /// Track kind.
        kind: MediaKind,
    },
}

/// Receiving side of a transport's events.
pub type EventStream = mpsc::UnboundedReceiver<TransportEvent>;

/// Sending side of a transport's events.
///
/// Emitting never blocks; events are dropped once the receiver is gone.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<TransportEvent>,
}

impl EventSink {
    /// Emit an event.
    pub fn emit(&self, event: TransportEvent) {
        let _ = self.tx.send(event);
    }

    /// Emit an error event.
    pub fn error(&self, message: impl Into<String>, fatal: bool) {
        self.emit(TransportEvent::Error {
            message: message.into(),
            fatal,
        });
    }
}

/// Create a connected sink/stream pair.
pub fn event_channel() -> (EventSink, EventStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSink { tx }, rx)
}
