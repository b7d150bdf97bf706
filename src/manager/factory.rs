//! Transport selection and construction.

use std::sync::Arc;

use url::Url;

use super::config::ManagerConfig;
use crate::platform::{MediaSource, PlatformCapabilities};
use crate::session::{Connectivity, Role, Session};
use crate::signaling::CarrierSource;
use crate::transport::{
    EventSink, LocalParts, LocalTransport, RelayConnector, RelayTransport, Transport,
    TransportError, TransportKind, TransportResult, WebRtcConnector, WsConnector,
};

/// Everything needed to build one transport.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    /// Requested connectivity.
    pub connectivity: Connectivity,
    /// Session to connect.
    pub session: Session,
    /// Local role.
    pub role: Role,
    /// Where the transport reports.
    pub events: EventSink,
}

/// Builds transports for the manager.
pub trait TransportFactory: Send + Sync {
    /// Build an unconnected transport. Must not touch the network.
    fn build(&self, request: TransportRequest) -> TransportResult<Arc<dyn Transport>>;
}

/// Pick the transport kind for `connectivity`.
///
/// `nearby` needs native peer connections; `anywhere` needs a relay URL.
pub fn select_transport(
    connectivity: Connectivity,
    capabilities: &PlatformCapabilities,
    relay_url: Option<&Url>,
) -> TransportResult<TransportKind> {
    match connectivity {
        Connectivity::Nearby if capabilities.native_webrtc => Ok(TransportKind::Local),
        Connectivity::Nearby => Err(TransportError::Unsupported {
            connectivity,
            reason: "peer connections are not available on this platform",
        }),
        Connectivity::Anywhere => relay_url
            .map(|_| TransportKind::Relay)
            .ok_or(TransportError::MissingRelayUrl),
    }
}

/// Builds [`LocalTransport`]s and [`RelayTransport`]s from a [`ManagerConfig`].
#[derive(Clone)]
pub struct DefaultTransportFactory {
    config: ManagerConfig,
    local: LocalParts,
    relay: Arc<dyn RelayConnector>,
}

impl DefaultTransportFactory {
    /// Factory with explicit collaborators.
    pub fn new(config: ManagerConfig, local: LocalParts, relay: Arc<dyn RelayConnector>) -> Self {
        Self {
            config,
            local,
            relay,
        }
    }

    /// Factory using WebRTC peers and WebSocket relay sockets.
    pub fn with_defaults(
        config: ManagerConfig,
        carriers: Arc<dyn CarrierSource>,
        media: Arc<dyn MediaSource>,
    ) -> TransportResult<Self> {
        let local = LocalParts {
            peers: Arc::new(WebRtcConnector::new()?),
            carriers,
            media,
        };
        Ok(Self::new(config, local, Arc::new(WsConnector::default())))
    }
}

impl TransportFactory for DefaultTransportFactory {
    fn build(&self, request: TransportRequest) -> TransportResult<Arc<dyn Transport>> {
        let relay_url = self.config.relay_url.as_ref();
        let kind = select_transport(request.connectivity, &self.config.capabilities, relay_url)?;
        let transport: Arc<dyn Transport> = match (kind, relay_url) {
            (TransportKind::Relay, Some(base)) => Arc::new(RelayTransport::new(
                request.session,
                request.role,
                base,
                self.relay.clone(),
                self.config.relay_policy,
                request.events,
            )),
            (TransportKind::Relay, None) => return Err(TransportError::MissingRelayUrl),
            (TransportKind::Local, _) => Arc::new(LocalTransport::new(
                request.session,
                request.role,
                self.config.local.clone(),
                self.local.clone(),
                request.events,
            )),
        };
        Ok(transport)
    }
}
