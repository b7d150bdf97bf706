//! Connection manager.
//!
//! Owns the active transport, turns its events into a [`ConnectionStatus`]
//! and [`ManagerEvent`]s, and guards against overlapping connection attempts.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::ManagerConfig;
use super::factory::{TransportFactory, TransportRequest};
use super::supervisor::{self, Supervision};
use crate::platform::{AlertKind, AlertPayload, AlertSink, MediaKind};
use crate::session::{Connectivity, Role, Session};
use crate::transport::{
    ConnectionStatus, EventStream, Transport, TransportError, TransportEvent, TransportKind,
    TransportMessage, event_channel,
};

/// Errors returned by the connection manager.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// Another connection attempt is pending.
    #[error("a connection attempt is already in progress")]
    ConnectionInProgress,

    /// No open transport.
    #[error("no connected transport")]
    TransportNotReady,

    /// The session to join has expired.
    #[error("session expired")]
    SessionExpired,

    /// `disconnect()` ran while connecting.
    #[error("connection attempt cancelled")]
    Cancelled,

    /// Transport failure.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Application-facing events.
#[derive(Debug, Clone, PartialEq)]
pub enum ManagerEvent {
    /// Connection status changed.
    Status(ConnectionStatus),
    /// A validated message from the peer.
    Message(TransportMessage),
    /// The peer's media track arrived.
    RemoteTrack(MediaKind),
    /// A reconnection or rebuild attempt is scheduled.
    Reconnecting {
        /// 1-based attempt.
        attempt: u32,
        /// Wait before the attempt.
        delay: Duration,
    },
    /// Transport error.
    Error {
        /// Description.
        message: String,
        /// Whether the transport is done.
        fatal: bool,
    },
}

/// Snapshot of the active connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Current status.
    pub status: ConnectionStatus,
    /// Connectivity of the active transport.
    pub connectivity: Option<Connectivity>,
    /// Kind of the active transport.
    pub transport: Option<TransportKind>,
    /// Local role.
    pub role: Option<Role>,
    /// Whether messages can be sent.
    pub is_ready: bool,
    /// Active room.
    pub room_id: Option<String>,
    /// Active join key.
    pub join_key: Option<String>,
}

/// Parameters of one connection, kept for rebuilds.
#[derive(Debug, Clone)]
pub(super) struct Link {
    pub connectivity: Connectivity,
    pub session: Session,
    pub role: Role,
}

struct Active {
    link: Link,
    transport: Arc<dyn Transport>,
    pump: JoinHandle<()>,
}

/// Clears the in-flight flag when dropped.
pub(super) struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub(super) struct ManagerInner {
    pub(super) config: ManagerConfig,
    factory: Arc<dyn TransportFactory>,
    pub(super) alerts: Arc<dyn AlertSink>,
    status: watch::Sender<ConnectionStatus>,
    events_tx: mpsc::UnboundedSender<ManagerEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<ManagerEvent>>>,
    in_flight: AtomicBool,
    generation: AtomicU64,
    active: Mutex<Option<Active>>,
    pub(super) supervisor: Mutex<Option<Supervision>>,
}

impl ManagerInner {
    pub(super) fn try_begin(&self) -> Option<InFlight<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight(&self.in_flight))
    }

    pub(super) fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    pub(super) fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    pub(super) fn set_status(&self, status: ConnectionStatus) {
        let changed = self.status.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        });
        if changed {
            debug!(%status, "connection status");
            self.emit(ManagerEvent::Status(status));
        }
    }

    pub(super) fn emit(&self, event: ManagerEvent) {
        let _ = self.events_tx.send(event);
    }

    pub(super) fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::Acquire) == generation
    }

    /// Make events of the active transport stale.
    pub(super) fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Disconnect and drop the active transport. Its later events are ignored.
    pub(super) async fn teardown_active(&self) {
        self.invalidate();
        let active = self.active.lock().take();
        if let Some(active) = active {
            debug!(kind = %active.transport.kind(), "tearing down transport");
            active.transport.disconnect().await;
            active.pump.abort();
        }
    }

    /// Replace the active transport with a new one for `link` and connect it.
    pub(super) async fn establish(
        self: &Arc<Self>,
        link: Link,
        cancel: Option<&CancellationToken>,
    ) -> Result<(), ManagerError> {
        self.teardown_active().await;
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.set_status(ConnectionStatus::Connecting);

        let (sink, stream) = event_channel();
        let request = TransportRequest {
            connectivity: link.connectivity,
            session: link.session.clone(),
            role: link.role,
            events: sink,
        };
        let transport = match self.factory.build(request) {
            Ok(transport) => transport,
            Err(e) => {
                warn!(connectivity = %link.connectivity, error = %e, "no usable transport");
                self.set_status(ConnectionStatus::Failed);
                return Err(e.into());
            }
        };

        info!(
            kind = %transport.kind(),
            role = %link.role,
            room_id = %link.session.room_id,
            "connecting"
        );
        let pump = tokio::spawn(pump(self.clone(), stream, link.clone(), generation));
        *self.active.lock() = Some(Active {
            link,
            transport: transport.clone(),
            pump,
        });
        if cancel.is_some_and(CancellationToken::is_cancelled) || !self.is_current(generation) {
            self.teardown_active().await;
            return Err(ManagerError::Cancelled);
        }

        match transport.connect().await {
            Ok(()) => Ok(()),
            Err(TransportError::Cancelled) => Err(ManagerError::Cancelled),
            Err(e) => {
                if self.is_current(generation) {
                    self.set_status(ConnectionStatus::Failed);
                }
                Err(e.into())
            }
        }
    }

    async fn deliver(&self, link: &Link, message: TransportMessage) {
        match &message {
            TransportMessage::NoiseDetected { room_id, level, .. } if link.role == Role::Parent => {
                let payload = AlertPayload {
                    room_id: room_id.clone(),
                    level: Some(*level),
                    message: format!("Noise detected (level {level:.2})"),
                };
                self.alerts.send_alert(AlertKind::Noise, payload).await;
            }
            TransportMessage::Ping { timestamp, .. } => {
                let transport = self.active.lock().as_ref().map(|a| a.transport.clone());
                if let Some(transport) = transport {
                    let pong = TransportMessage::pong(&link.session, *timestamp);
                    if let Err(e) = transport.send(&pong).await {
                        debug!(error = %e, "pong not sent");
                    }
                }
            }
            _ => {}
        }
        self.emit(ManagerEvent::Message(message));
    }

    /// The peer ended the session: close without rebuilding.
    async fn end_session(&self, link: &Link, generation: u64, message: TransportMessage) {
        let active = {
            let mut active = self.active.lock();
            if !self.is_current(generation) {
                return;
            }
            active.take()
        };
        info!(room_id = %link.session.room_id, "peer ended the session");
        drop(supervisor::cancel(self));
        if let Some(active) = active {
            // Runs on this transport's pump; the handle is left to finish.
            active.transport.disconnect().await;
        }
        self.set_status(ConnectionStatus::Disconnected);
        self.emit(ManagerEvent::Message(message));

        let payload = AlertPayload {
            room_id: link.session.room_id.clone(),
            level: None,
            message: "The session was ended".into(),
        };
        self.alerts.send_alert(AlertKind::SessionEnded, payload).await;
    }

    fn on_lost(self: &Arc<Self>, link: &Link, generation: u64) {
        if link.role == Role::Parent && self.config.supervise_parent {
            supervisor::start(self, link.clone(), generation);
        }
    }
}

/// Translate one transport's events until it is replaced.
async fn pump(inner: Arc<ManagerInner>, mut stream: EventStream, link: Link, generation: u64) {
    let mut was_connected = false;
    while let Some(event) = stream.recv().await {
        if !inner.is_current(generation) {
            break;
        }
        match event {
            TransportEvent::Connected => {
                was_connected = true;
                inner.set_status(ConnectionStatus::Connected);
            }
            TransportEvent::Disconnected { will_retry: true } => {
                inner.set_status(ConnectionStatus::Connecting);
            }
            TransportEvent::Disconnected { will_retry: false } => {
                inner.set_status(ConnectionStatus::Disconnected);
                if was_connected {
                    inner.on_lost(&link, generation);
                }
            }
            TransportEvent::Reconnecting { attempt, delay } => {
                inner.set_status(ConnectionStatus::Connecting);
                inner.emit(ManagerEvent::Reconnecting { attempt, delay });
            }
            TransportEvent::Failed { reason } => {
                warn!(%reason, room_id = %link.session.room_id, "transport failed");
                inner.set_status(ConnectionStatus::Failed);
                if was_connected {
                    inner.on_lost(&link, generation);
                }
            }
            TransportEvent::Error { message, fatal } => {
                inner.emit(ManagerEvent::Error { message, fatal });
            }
            TransportEvent::Message(message @ TransportMessage::SessionEnd { .. }) => {
                inner.end_session(&link, generation, message).await;
                break;
            }
            TransportEvent::Message(message) => inner.deliver(&link, message).await,
            TransportEvent::RemoteTrack { kind } => {
                inner.emit(ManagerEvent::RemoteTrack(kind));
            }
        }
    }
}

/// Single entry point for connecting, joining and disconnecting.
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

impl ConnectionManager {
    /// Create an idle manager.
    pub fn new(
        config: ManagerConfig,
        factory: Arc<dyn TransportFactory>,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(ManagerInner {
                config,
                factory,
                alerts,
                status,
                events_tx,
                events_rx: Mutex::new(Some(events_rx)),
                in_flight: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                active: Mutex::new(None),
                supervisor: Mutex::new(None),
            }),
        }
    }

    /// Host `session` as the listener.
    pub async fn connect(
        &self,
        connectivity: Connectivity,
        session: Session,
    ) -> Result<(), ManagerError> {
        self.start(Link {
            connectivity,
            session,
            role: Role::Listener,
        })
        .await
    }

    /// Join `session` as the parent. Expired sessions are rejected.
    pub async fn join_session(
        &self,
        connectivity: Connectivity,
        session: Session,
    ) -> Result<(), ManagerError> {
        if session.is_expired_now() {
            return Err(ManagerError::SessionExpired);
        }
        self.start(Link {
            connectivity,
            session,
            role: Role::Parent,
        })
        .await
    }

    async fn start(&self, link: Link) -> Result<(), ManagerError> {
        let _guard = self
            .inner
            .try_begin()
            .ok_or(ManagerError::ConnectionInProgress)?;
        if let Some(supervision) = supervisor::cancel(&self.inner) {
            supervision.join().await;
        }
        self.inner.establish(link, None).await
    }

    /// Close everything. Idempotent; never fails.
    pub async fn disconnect(&self) {
        let supervision = supervisor::cancel(&self.inner);
        self.inner.teardown_active().await;
        if let Some(supervision) = supervision {
            supervision.join().await;
            self.inner.teardown_active().await;
        }
        self.inner.set_status(ConnectionStatus::Disconnected);
    }

    /// Send over the active transport. Never buffers.
    pub async fn send_message(&self, message: &TransportMessage) -> Result<(), ManagerError> {
        let transport = self.inner.active.lock().as_ref().map(|a| a.transport.clone());
        let transport = transport
            .filter(|t| t.is_ready())
            .ok_or(ManagerError::TransportNotReady)?;
        transport.send(message).await.map_err(|e| match e {
            TransportError::NotReady => ManagerError::TransportNotReady,
            e => e.into(),
        })
    }

    /// Whether a transport is open.
    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
            && self
                .inner
                .active
                .lock()
                .as_ref()
                .is_some_and(|a| a.transport.is_ready())
    }

    /// Snapshot of the active connection.
    pub fn connection_info(&self) -> ConnectionInfo {
        let status = self.status();
        let active = self.inner.active.lock();
        match active.as_ref() {
            Some(active) => ConnectionInfo {
                status,
                connectivity: Some(active.link.connectivity),
                transport: Some(active.transport.kind()),
                role: Some(active.link.role),
                is_ready: active.transport.is_ready(),
                room_id: Some(active.link.session.room_id.clone()),
                join_key: Some(active.link.session.join_key.clone()),
            },
            None => ConnectionInfo {
                status,
                connectivity: None,
                transport: None,
                role: None,
                is_ready: false,
                room_id: None,
                join_key: None,
            },
        }
    }

    /// Current status.
    pub fn status(&self) -> ConnectionStatus {
        self.inner.status()
    }

    /// Watch status changes.
    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.subscribe_status()
    }

    /// Take the event stream. Only the first call gets it.
    pub fn take_events(&self) -> Option<mpsc::UnboundedReceiver<ManagerEvent>> {
        self.inner.events_rx.lock().take()
    }
}
