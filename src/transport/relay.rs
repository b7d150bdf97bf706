//! Relay transport.
//!
//! Messages travel as JSON text frames through a WebSocket relay on the
//! `transport` channel. A lost socket is reopened on the [`RetryPolicy`]
//! schedule; once the schedule is exhausted the transport fails for good.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use super::Transport;
use super::error::{TransportError, TransportResult};
use super::events::{EventSink, TransportEvent, TransportKind};
use super::message::TransportMessage;
use super::retry::{RetryPolicy, RetryState};
use super::socket::{RelayConnector, SocketEvent, SocketReader, SocketWriter, relay_url};
use crate::core::CHANNEL_TRANSPORT;
use crate::session::{Role, Session};

/// Relay socket lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayPhase {
    /// Not started.
    Idle,
    /// First open in progress.
    Connecting,
    /// Socket open.
    Open,
    /// Waiting to reopen a lost socket.
    Reconnecting,
    /// Closed locally.
    Closed,
    /// Reconnection schedule exhausted.
    Failed,
}

impl fmt::Display for RelayPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Reconnecting => "reconnecting",
            Self::Closed => "closed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// WebSocket relay transport.
pub struct RelayTransport {
    inner: Arc<RelayInner>,
}

struct RelayInner {
    session: Session,
    role: Role,
    url: Url,
    connector: Arc<dyn RelayConnector>,
    policy: RetryPolicy,
    events: EventSink,
    phase: Mutex<RelayPhase>,
    writer: Mutex<Option<SocketWriter>>,
    driver: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl RelayTransport {
    /// Transport for `session` as `role` through the relay at `base`.
    pub fn new(
        session: Session,
        role: Role,
        base: &Url,
        connector: Arc<dyn RelayConnector>,
        policy: RetryPolicy,
        events: EventSink,
    ) -> Self {
        let url = relay_url(base, &session, CHANNEL_TRANSPORT);
        Self {
            inner: Arc::new(RelayInner {
                session,
                role,
                url,
                connector,
                policy,
                events,
                phase: Mutex::new(RelayPhase::Idle),
                writer: Mutex::new(None),
                driver: Mutex::new(None),
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Current socket phase.
    pub fn phase(&self) -> RelayPhase {
        *self.inner.phase.lock()
    }

    /// Endpoint including room, key and channel.
    pub fn url(&self) -> &Url {
        &self.inner.url
    }
}

impl RelayInner {
    fn set_phase(&self, phase: RelayPhase) {
        let mut current = self.phase.lock();
        if *current == RelayPhase::Closed {
            return;
        }
        debug!(from = %*current, to = %phase, "relay phase");
        *current = phase;
    }

    /// Open the socket and announce ourselves. Returns the reader on success.
    async fn open(&self) -> TransportResult<SocketReader> {
        let socket = tokio::select! {
            _ = self.cancel.cancelled() => return Err(TransportError::Cancelled),
            socket = self.connector.open(&self.url) => socket?,
        };
        let (writer, reader) = socket.split();
        writer.send(TransportMessage::hello(self.role, &self.session).to_json()?)?;

        if self.cancel.is_cancelled() {
            return Err(TransportError::Cancelled);
        }
        *self.writer.lock() = Some(writer);
        self.set_phase(RelayPhase::Open);
        Ok(reader)
    }

    /// Forward frames until the socket goes away or we are cancelled.
    async fn pump(&self, mut reader: SocketReader) {
        loop {
            let event = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                event = reader.recv() => event,
            };
            match event {
                SocketEvent::Frame(frame) => {
                    if let Some(message) = TransportMessage::parse_for(&frame, &self.session) {
                        self.events.emit(TransportEvent::Message(message));
                    }
                }
                SocketEvent::Error(e) => {
                    warn!(error = %e, "relay socket error");
                    self.events.error(e, false);
                }
                SocketEvent::Closed => return,
            }
        }
    }

    /// Run the socket until closed locally or the retry schedule runs out.
    async fn drive(self: Arc<Self>, first: Option<SocketReader>) {
        let mut retry = RetryState::new(self.policy);
        let mut reader = first;

        loop {
            if let Some(current) = reader.take() {
                self.pump(current).await;
                if self.cancel.is_cancelled() {
                    return;
                }
                self.writer.lock().take();
                info!(room_id = %self.session.room_id, "relay socket lost");
                self.events
                    .emit(TransportEvent::Disconnected { will_retry: true });
            }

            let Some((attempt, delay)) = retry.next_attempt() else {
                let reason = format!("relay unreachable after {} attempts", retry.attempts());
                warn!(%reason, "giving up on relay");
                self.set_phase(RelayPhase::Failed);
                self.events.emit(TransportEvent::Failed { reason });
                return;
            };

            self.set_phase(RelayPhase::Reconnecting);
            self.events
                .emit(TransportEvent::Reconnecting { attempt, delay });
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }

            match self.open().await {
                Ok(next) => {
                    info!(attempt, "relay socket reopened");
                    retry.on_success();
                    self.events.emit(TransportEvent::Connected);
                    reader = Some(next);
                }
                Err(TransportError::Cancelled) => return,
                Err(e) => {
                    debug!(attempt, error = %e, "relay reconnect failed");
                    self.events.error(e.to_string(), false);
                }
            }
        }
    }
}

#[async_trait]
impl Transport for RelayTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Relay
    }

    async fn connect(&self) -> TransportResult<()> {
        let inner = &self.inner;
        if inner.cancel.is_cancelled() {
            return Err(TransportError::Cancelled);
        }
        {
            let mut phase = inner.phase.lock();
            if *phase != RelayPhase::Idle {
                return Err(TransportError::InvalidState("connect already called"));
            }
            *phase = RelayPhase::Connecting;
        }

        info!(room_id = %inner.session.room_id, "connecting to relay");
        let first = match inner.open().await {
            Ok(reader) => {
                inner.events.emit(TransportEvent::Connected);
                Some(reader)
            }
            Err(TransportError::Cancelled) => return Err(TransportError::Cancelled),
            Err(e) => {
                warn!(error = %e, "relay connect failed, scheduling retries");
                inner.events.error(e.to_string(), false);
                None
            }
        };

        let driver = tokio::spawn(inner.clone().drive(first));
        *inner.driver.lock() = Some(driver);
        if inner.cancel.is_cancelled() {
            // Raced with disconnect; the driver exits on its own.
            return Err(TransportError::Cancelled);
        }
        Ok(())
    }

    async fn send(&self, message: &TransportMessage) -> TransportResult<()> {
        if !self.is_ready() {
            return Err(TransportError::NotReady);
        }
        let frame = message.to_json()?;
        let writer = self.inner.writer.lock();
        writer.as_ref().ok_or(TransportError::NotReady)?.send(frame)
    }

    async fn disconnect(&self) {
        let inner = &self.inner;
        if inner.cancel.is_cancelled() {
            return;
        }
        inner.cancel.cancel();
        inner.writer.lock().take();

        let driver = inner.driver.lock().take();
        if let Some(driver) = driver {
            let _ = driver.await;
        }

        let was_open = {
            let mut phase = inner.phase.lock();
            let was_open = *phase == RelayPhase::Open;
            *phase = RelayPhase::Closed;
            was_open
        };
        debug!(room_id = %inner.session.room_id, "relay transport closed");
        if was_open {
            inner
                .events
                .emit(TransportEvent::Disconnected { will_retry: false });
        }
    }

    fn is_ready(&self) -> bool {
        *self.inner.phase.lock() == RelayPhase::Open && self.inner.writer.lock().is_some()
    }
}
