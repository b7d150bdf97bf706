//! QR round-trip carrier.
//!
//! The local description is published as a base64 blob for the UI to render;
//! the UI feeds scanned blobs back through [`QrCarrier::deliver_scanned`].
//! [`QrCarrierSource`] opens a fresh carrier for every handshake and
//! publishes it to the UI.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{CarrierKind, CarrierSource, SignalingCarrier, SignalingError, SignalingEvent, SignalingResult};
use crate::codec::{SdpKind, SessionDescription, decode_offer_blob, encode_offer_blob};
use crate::session::{Role, Session};
use crate::transport::IceCandidate;

/// In-memory carrier backed by the device's display and camera.
pub struct QrCarrier {
    display: watch::Sender<Option<String>>,
    inbox_tx: mpsc::UnboundedSender<SignalingEvent>,
    inbox_rx: Mutex<mpsc::UnboundedReceiver<SignalingEvent>>,
    closed: CancellationToken,
}

impl Default for QrCarrier {
    fn default() -> Self {
        Self::new()
    }
}

impl QrCarrier {
    /// Create an idle carrier.
    pub fn new() -> Self {
        let (display, _) = watch::channel(None);
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        Self {
            display,
            inbox_tx,
            inbox_rx: Mutex::new(inbox_rx),
            closed: CancellationToken::new(),
        }
    }

    /// Blob currently to be shown, if any.
    pub fn current_display(&self) -> Option<String> {
        self.display.borrow().clone()
    }

    /// Watch the blob to be shown.
    pub fn subscribe_display(&self) -> watch::Receiver<Option<String>> {
        self.display.subscribe()
    }

    /// Whether the handshake using this carrier is over.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Feed a scanned blob. Returns which description it held.
    pub fn deliver_scanned(&self, blob: &str) -> SignalingResult<SdpKind> {
        if self.closed.is_cancelled() {
            return Err(SignalingError::Closed);
        }
        let description = decode_offer_blob(blob)?;
        let kind = description.kind;
        let mode = Some(description.stream_mode());
        self.inbox_tx
            .send(SignalingEvent::Description { description, mode })
            .map_err(|_| SignalingError::Closed)?;
        Ok(kind)
    }

    fn publish(&self, description: &SessionDescription) -> SignalingResult<()> {
        if self.closed.is_cancelled() {
            return Err(SignalingError::Closed);
        }
        self.display.send_replace(Some(encode_offer_blob(description)));
        Ok(())
    }
}

#[async_trait]
impl SignalingCarrier for QrCarrier {
    fn kind(&self) -> CarrierKind {
        CarrierKind::Qr
    }

    async fn send_offer(&self, offer: &SessionDescription) -> SignalingResult<()> {
        self.publish(offer)
    }

    async fn send_answer(&self, answer: &SessionDescription) -> SignalingResult<()> {
        self.publish(answer)
    }

    async fn send_ice_candidate(&self, _candidate: &IceCandidate) -> SignalingResult<()> {
        // Descriptions are complete; nothing to show.
        debug!("qr carrier ignores trickled candidate");
        Ok(())
    }

    async fn next_event(&self) -> SignalingResult<SignalingEvent> {
        let mut inbox = self.inbox_rx.lock().await;
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Err(SignalingError::Closed),
            event = inbox.recv() => event.ok_or(SignalingError::Closed),
        }
    }

    async fn close(&self) {
        self.closed.cancel();
        self.display.send_replace(None);
    }
}

/// [`CarrierSource`] opening one [`QrCarrier`] per handshake.
///
/// The UI watches [`subscribe`](Self::subscribe) to find the carrier whose
/// blob it shows and into which scans go.
pub struct QrCarrierSource {
    current: watch::Sender<Option<Arc<QrCarrier>>>,
}

impl Default for QrCarrierSource {
    fn default() -> Self {
        Self::new()
    }
}

impl QrCarrierSource {
    /// Source with no carrier open yet.
    pub fn new() -> Self {
        let (current, _) = watch::channel(None);
        Self { current }
    }

    /// Carrier of the latest handshake, if any.
    pub fn current(&self) -> Option<Arc<QrCarrier>> {
        self.current.borrow().clone()
    }

    /// Watch the carrier of the latest handshake.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<QrCarrier>>> {
        self.current.subscribe()
    }
}

#[async_trait]
impl CarrierSource for QrCarrierSource {
    async fn open(
        &self,
        session: &Session,
        role: Role,
    ) -> SignalingResult<Arc<dyn SignalingCarrier>> {
        let carrier = Arc::new(QrCarrier::new());
        if let Some(stale) = self.current.send_replace(Some(carrier.clone())) {
            stale.close().await;
        }
        debug!(room = %session.room_id, ?role, "qr carrier opened");
        let carrier: Arc<dyn SignalingCarrier> = carrier;
        Ok(carrier)
    }
}
