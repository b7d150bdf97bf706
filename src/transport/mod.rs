//! Transport layer.
//!
//! A [`Transport`] carries [`TransportMessage`]s between the two devices of a
//! session and reports its lifecycle as [`TransportEvent`]s. Two
//! implementations exist:
//!
//! - [`LocalTransport`]: a peer-to-peer data channel plus media tracks,
//!   negotiated over a signaling carrier
//! - [`RelayTransport`]: a WebSocket through a relay, with bounded
//!   exponential reconnection
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         Connection Manager              │
//! ├─────────────────────────────────────────┤
//! │         Transport Layer                 │  ← This module
//! │   messages, events, retry               │
//! ├───────────────────┬─────────────────────┤
//! │   peer + carrier  │   relay socket      │
//! └───────────────────┴─────────────────────┘
//! ```

mod error;
mod events;
mod local;
mod message;
mod peer;
mod relay;
mod retry;
mod socket;

#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;

pub use error::*;
pub use events::*;
pub use local::{
    LocalConfig, LocalParts, LocalPhase, LocalTransport, PeerConnector, PeerEvent,
    PeerEventSender, PeerLink, PeerState,
};
pub use message::{IceCandidate, TransportMessage};
pub use peer::{WebRtcConnector, WebRtcPeer};
pub use relay::{RelayPhase, RelayTransport};
pub use retry::{Backoff, RetryPolicy, RetryState};
pub use socket::*;

/// A connected channel between the two devices of a session.
///
/// `disconnect` is idempotent and may run concurrently with `connect`; the
/// pending `connect` then fails with [`TransportError::Cancelled`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Implementation kind.
    fn kind(&self) -> TransportKind;

    /// Establish the channel. Callable once.
    async fn connect(&self) -> TransportResult<()>;

    /// Send one message. Fails with [`TransportError::NotReady`] unless open.
    async fn send(&self, message: &TransportMessage) -> TransportResult<()>;

    /// Close the channel and release everything it holds.
    async fn disconnect(&self);

    /// Whether `send` would currently be accepted.
    fn is_ready(&self) -> bool;
}
