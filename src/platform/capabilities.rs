//! Runtime platform capabilities.

/// What the host platform can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformCapabilities {
    /// Peer connections with media are supported.
    pub native_webrtc: bool,
}

impl Default for PlatformCapabilities {
    fn default() -> Self {
        Self {
            native_webrtc: true,
        }
    }
}

impl PlatformCapabilities {
    /// A platform with nothing but sockets.
    pub fn sockets_only() -> Self {
        Self {
            native_webrtc: false,
        }
    }
}
