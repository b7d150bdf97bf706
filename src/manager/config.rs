//! Connection manager configuration.

use std::time::Duration;

use url::Url;

use crate::core::ENV_RELAY_URL;
use crate::platform::PlatformCapabilities;
use crate::transport::{LocalConfig, RetryPolicy, TransportError};

/// Manager configuration.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Relay endpoint for `anywhere` connectivity.
    pub relay_url: Option<Url>,

    /// What this device can do.
    pub capabilities: PlatformCapabilities,

    /// Peer-to-peer tuning.
    pub local: LocalConfig,

    /// Relay socket reconnection schedule.
    pub relay_policy: RetryPolicy,

    /// Schedule for rebuilding a lost transport.
    pub supervisor_policy: RetryPolicy,

    /// Rebuild lost transports on the parent side.
    pub supervise_parent: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            relay_url: None,
            capabilities: PlatformCapabilities::default(),
            local: LocalConfig::default(),
            relay_policy: RetryPolicy::relay(),
            supervisor_policy: RetryPolicy::supervisor(),
            supervise_parent: true,
        }
    }
}

impl ManagerConfig {
    /// Defaults, with the relay URL taken from `BSM_RELAY_URL` if set.
    pub fn from_env() -> Result<Self, TransportError> {
        let mut config = Self::default();
        if let Ok(raw) = std::env::var(ENV_RELAY_URL) {
            if !raw.trim().is_empty() {
                config.relay_url = Some(Url::parse(raw.trim())?);
            }
        }
        Ok(config)
    }
}

/// Builder for [`ManagerConfig`].
#[derive(Debug)]
pub struct ManagerConfigBuilder {
    config: ManagerConfig,
}

impl ManagerConfigBuilder {
    /// Start from defaults.
    pub fn new() -> Self {
        Self {
            config: ManagerConfig::default(),
        }
    }

    /// Start from an existing configuration.
    pub fn from_config(config: ManagerConfig) -> Self {
        Self { config }
    }

    /// Set the relay endpoint.
    pub fn relay_url(mut self, url: Url) -> Self {
        self.config.relay_url = Some(url);
        self
    }

    /// Set the platform capabilities.
    pub fn capabilities(mut self, capabilities: PlatformCapabilities) -> Self {
        self.config.capabilities = capabilities;
        self
    }

    /// Replace the STUN/TURN server list.
    pub fn ice_servers<I, S>(mut self, servers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.local.ice_servers = servers.into_iter().map(Into::into).collect();
        self
    }

    /// Bound ICE gathering.
    pub fn ice_gather_timeout(mut self, timeout: Duration) -> Self {
        self.config.local.ice_gather_timeout = timeout;
        self
    }

    /// Bound the wait for the peer's description.
    pub fn remote_description_timeout(mut self, timeout: Duration) -> Self {
        self.config.local.remote_description_timeout = timeout;
        self
    }

    /// Bound the data channel opening.
    pub fn peer_connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.local.connect_timeout = timeout;
        self
    }

    /// Set the relay reconnection schedule.
    pub fn relay_policy(mut self, policy: RetryPolicy) -> Self {
        self.config.relay_policy = policy;
        self
    }

    /// Set the transport rebuild schedule.
    pub fn supervisor_policy(mut self, policy: RetryPolicy) -> Self {
        self.config.supervisor_policy = policy;
        self
    }

    /// Enable or disable transport rebuilds on the parent side.
    pub fn supervise_parent(mut self, enabled: bool) -> Self {
        self.config.supervise_parent = enabled;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> ManagerConfig {
        self.config
    }
}

impl Default for ManagerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_overrides() {
        let config = ManagerConfigBuilder::new()
            .relay_url(Url::parse("wss://relay.example/ws").unwrap())
            .capabilities(PlatformCapabilities::sockets_only())
            .ice_servers(["stun:stun.example:3478"])
            .ice_gather_timeout(Duration::from_secs(3))
            .remote_description_timeout(Duration::from_secs(45))
            .supervise_parent(false)
            .build();

        assert_eq!(config.relay_url.unwrap().host_str(), Some("relay.example"));
        assert!(!config.capabilities.native_webrtc);
        assert_eq!(config.local.ice_servers, vec!["stun:stun.example:3478"]);
        assert_eq!(config.local.ice_gather_timeout, Duration::from_secs(3));
        assert_eq!(config.local.remote_description_timeout, Duration::from_secs(45));
        assert!(!config.supervise_parent);
    }

    #[test]
    fn test_defaults() {
        let config = ManagerConfig::default();
        assert!(config.relay_url.is_none());
        assert_eq!(config.relay_policy, RetryPolicy::relay());
        assert_eq!(config.supervisor_policy, RetryPolicy::supervisor());
        assert!(config.supervise_parent);
    }
}
