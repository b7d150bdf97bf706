//! The device's single active session.

use serde::{Deserialize, Serialize};

use super::session::{Connectivity, Role, Sensitivity, Session, SessionConfig, StreamMode};
use crate::transport::ConnectionStatus;

/// Lifecycle of the active session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No session.
    #[default]
    Idle,
    /// Session generated, waiting for the peer.
    Pairing,
    /// Transport handshake in progress.
    Connecting,
    /// Transport open.
    Streaming,
    /// Streaming suspended by the user.
    Paused,
    /// Transport lost or closed.
    Disconnected,
}

impl SessionState {
    /// State implied by a connection status change.
    ///
    /// A paused session stays paused while the transport is up.
    pub fn after_status(self, status: ConnectionStatus) -> Self {
        match status {
            ConnectionStatus::Connecting => Self::Connecting,
            ConnectionStatus::Connected if self == Self::Paused => Self::Paused,
            ConnectionStatus::Connected => Self::Streaming,
            ConnectionStatus::Disconnected | ConnectionStatus::Failed => match self {
                Self::Idle | Self::Pairing => self,
                _ => Self::Disconnected,
            },
        }
    }
}

/// Owner of the active session, the role and the pairing preferences.
///
/// At most one session exists at a time; generating or adopting a new one
/// replaces the previous.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    config: SessionConfig,
    session: Option<Session>,
    role: Option<Role>,
    state: SessionState,
}

impl SessionStore {
    /// Create an empty store with default preferences.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store with the given preferences.
    pub fn with_config(config: SessionConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Current preferences.
    pub fn config(&self) -> SessionConfig {
        self.config
    }

    /// Replace the preferences. The active session is untouched.
    pub fn set_config(&mut self, config: SessionConfig) {
        self.config = config;
    }

    /// Set the preferred stream mode.
    pub fn set_mode(&mut self, mode: StreamMode) {
        self.config.mode = mode;
    }

    /// Set the preferred sensitivity.
    pub fn set_sensitivity(&mut self, sensitivity: Sensitivity) {
        self.config.sensitivity = sensitivity;
    }

    /// Set the preferred connectivity.
    pub fn set_connectivity(&mut self, connectivity: Connectivity) {
        self.config.connectivity = connectivity;
    }

    /// Generate a session from the current preferences and make it active.
    pub fn generate_new_session(&mut self) -> &Session {
        self.adopt(Session::generate(&self.config))
    }

    /// Make an externally obtained session (e.g. a scanned token) active.
    pub fn adopt(&mut self, session: Session) -> &Session {
        self.state = SessionState::Pairing;
        self.session.insert(session)
    }

    /// The active session.
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Role of this device.
    pub fn role(&self) -> Option<Role> {
        self.role
    }

    /// Set the role of this device.
    pub fn set_role(&mut self, role: Role) {
        self.role = Some(role);
    }

    /// Lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Force a lifecycle state.
    pub fn set_state(&mut self, state: SessionState) {
        self.state = state;
    }

    /// Fold a connection status change into the lifecycle state.
    pub fn apply_status(&mut self, status: ConnectionStatus) {
        if self.session.is_some() {
            self.state = self.state.after_status(status);
        }
    }

    /// Drop the active session, keeping role and preferences.
    pub fn clear_session(&mut self) {
        self.session = None;
        self.state = SessionState::Idle;
    }

    /// Return to a fresh state: no session, no role, default preferences.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_replaces_previous() {
        let mut store = SessionStore::new();
        let first = store.generate_new_session().room_id.clone();
        let second = store.generate_new_session().room_id.clone();

        assert_ne!(first, second);
        assert_eq!(store.session().map(|s| s.room_id.as_str()), Some(second.as_str()));
        assert_eq!(store.state(), SessionState::Pairing);
    }

    #[test]
    fn test_generate_uses_preferences() {
        let mut store = SessionStore::new();
        store.set_mode(StreamMode::AudioVideo);
        store.set_connectivity(Connectivity::Anywhere);
        store.set_sensitivity(Sensitivity::Low);

        let session = store.generate_new_session();
        assert_eq!(session.mode, StreamMode::AudioVideo);
        assert_eq!(session.connectivity, Connectivity::Anywhere);
        assert_eq!(session.sensitivity, Sensitivity::Low);
    }

    #[test]
    fn test_status_transitions() {
        let mut store = SessionStore::new();
        store.apply_status(ConnectionStatus::Connected);
        assert_eq!(store.state(), SessionState::Idle);

        store.generate_new_session();
        store.apply_status(ConnectionStatus::Connecting);
        assert_eq!(store.state(), SessionState::Connecting);
        store.apply_status(ConnectionStatus::Connected);
        assert_eq!(store.state(), SessionState::Streaming);

        store.set_state(SessionState::Paused);
        store.apply_status(ConnectionStatus::Connected);
        assert_eq!(store.state(), SessionState::Paused);

        store.apply_status(ConnectionStatus::Failed);
        assert_eq!(store.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_reset() {
        let mut store = SessionStore::new();
        store.set_role(Role::Parent);
        store.set_mode(StreamMode::AudioVideo);
        store.generate_new_session();

        store.clear_session();
        assert!(store.session().is_none());
        assert_eq!(store.role(), Some(Role::Parent));

        store.reset();
        assert_eq!(store.role(), None);
        assert_eq!(store.config(), SessionConfig::default());
        assert_eq!(store.state(), SessionState::Idle);
    }
}
