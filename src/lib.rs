//! # bsm-link
//!
//! Pairing, session and transport layer of a two-role baby monitor. One
//! device is the **listener** (it sits by the baby, captures audio/video and
//! reports noise); the other is the **parent** (it receives the stream and
//! alerts).
//!
//! - **Pairing**: a listener creates a short-lived [`Session`](session::Session)
//!   and shows it as a QR deep link or a six-digit code; the parent decodes
//!   and validates it.
//! - **Transports**: `nearby` sessions use a WebRTC peer connection whose
//!   offer/answer travel over a signaling carrier (QR, proximity or relay);
//!   `anywhere` sessions use a WebSocket relay with capped exponential
//!   reconnection.
//! - **Management**: [`ConnectionManager`](manager::ConnectionManager) picks
//!   the transport, reports one connection status and rebuilds a lost
//!   transport on the parent side.
//!
//! ## Feature Flags
//!
//! - `server` (default): the relay server and the `bsm-relay` binary
//!
//! ## Modules
//!
//! - [`core`]: constants, clock and error types
//! - [`session`]: sessions and the session store
//! - [`codec`]: pairing tokens, six-digit codes and description blobs
//! - [`signaling`]: offer/answer carriers
//! - [`transport`]: peer-to-peer and relay transports
//! - [`platform`]: media, alert and capability collaborators
//! - [`manager`]: connection manager and application context
//! - [`server`]: relay server (requires `server` feature)
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use bsm_link::prelude::*;
//!
//! let config = ManagerConfig::from_env()?;
//! let factory = DefaultTransportFactory::with_defaults(config.clone(), carriers, media)?;
//! let ctx = AppContext::new(config, Arc::new(factory), Arc::new(LogAlerts));
//!
//! let invite = ctx.create_invite();
//! show_qr(&invite.deep_link);
//! ctx.start_listening().await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod codec;
pub mod core;
pub mod manager;
pub mod platform;
pub mod session;
pub mod signaling;
pub mod transport;

// Relay server (feature-gated)
#[cfg(feature = "server")]
#[cfg_attr(docsrs, doc(cfg(feature = "server")))]
pub mod server;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::codec::{PairingCode, PairingToken};
    pub use crate::core::{Error, Result};
    pub use crate::manager::{
        AppContext, ConnectionInfo, ConnectionManager, DefaultTransportFactory, Invite,
        ManagerConfig, ManagerConfigBuilder, ManagerError, ManagerEvent,
    };
    pub use crate::platform::{AlertKind, AlertPayload, AlertSink, LogAlerts, MediaSource};
    pub use crate::session::{
        Connectivity, Role, Sensitivity, Session, SessionConfig, SessionState, SessionStore,
        StreamMode,
    };
    pub use crate::signaling::{CarrierSource, SignalingCarrier};
    pub use crate::transport::{ConnectionStatus, Transport, TransportKind, TransportMessage};

    #[cfg(feature = "server")]
    pub use crate::server::{RelayServer, RelayServerBuilder};
}

// Re-export commonly used items at crate root
pub use crate::core::{Error, Result};
