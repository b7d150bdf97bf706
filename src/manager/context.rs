//! Application context.
//!
//! Owns the session store and the connection manager for the lifetime of the
//! app. The manager is created on first use and can be dropped with
//! [`AppContext::clear_connection_manager`]; the next access builds a fresh
//! one.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::config::ManagerConfig;
use super::factory::TransportFactory;
use super::manager::ConnectionManager;
use crate::codec::{PairingCode, PairingToken};
use crate::core::{Error, Result, now_millis};
use crate::platform::AlertSink;
use crate::session::{Role, Session, SessionStore};
use crate::transport::TransportMessage;

/// What the listener shows so a parent can join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invite {
    /// The session being offered.
    pub session: Session,
    /// Deep link for the QR code.
    pub deep_link: String,
    /// Six-digit code for manual entry.
    pub code: PairingCode,
}

struct ManagerSlot {
    manager: Arc<ConnectionManager>,
    watcher: JoinHandle<()>,
}

/// Owner of the session store and the connection manager.
pub struct AppContext {
    config: ManagerConfig,
    factory: Arc<dyn TransportFactory>,
    alerts: Arc<dyn AlertSink>,
    store: Arc<Mutex<SessionStore>>,
    manager: Mutex<Option<ManagerSlot>>,
}

impl AppContext {
    /// Context with an empty store and no manager yet.
    pub fn new(
        config: ManagerConfig,
        factory: Arc<dyn TransportFactory>,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        Self {
            config,
            factory,
            alerts,
            store: Arc::new(Mutex::new(SessionStore::new())),
            manager: Mutex::new(None),
        }
    }

    /// The session store.
    pub fn store(&self) -> Arc<Mutex<SessionStore>> {
        self.store.clone()
    }

    /// The connection manager, created on first use.
    ///
    /// Must be called within a tokio runtime: the manager's status is mirrored
    /// into the session store by a background task.
    pub fn connection_manager(&self) -> Arc<ConnectionManager> {
        let mut slot = self.manager.lock();
        if let Some(existing) = slot.as_ref() {
            return existing.manager.clone();
        }

        debug!("creating connection manager");
        let manager = Arc::new(ConnectionManager::new(
            self.config.clone(),
            self.factory.clone(),
            self.alerts.clone(),
        ));
        let mut status = manager.subscribe_status();
        let store = self.store.clone();
        let watcher = tokio::spawn(async move {
            while status.changed().await.is_ok() {
                let current = *status.borrow_and_update();
                store.lock().apply_status(current);
            }
        });
        *slot = Some(ManagerSlot {
            manager: manager.clone(),
            watcher,
        });
        manager
    }

    /// Disconnect and drop the connection manager.
    pub async fn clear_connection_manager(&self) {
        let slot = self.manager.lock().take();
        if let Some(slot) = slot {
            slot.manager.disconnect().await;
            slot.watcher.abort();
            debug!("connection manager cleared");
        }
    }

    /// Generate a session from the store's preferences and become the listener.
    pub fn create_invite(&self) -> Invite {
        let mut store = self.store.lock();
        store.set_role(Role::Listener);
        let session = store.generate_new_session().clone();
        info!(room_id = %session.room_id, "invite created");
        Invite {
            deep_link: PairingToken::encode_deep_link(&session),
            code: PairingCode::from_session(&session),
            session,
        }
    }

    /// Connect the active session as the listener.
    pub async fn start_listening(&self) -> Result<()> {
        let session = self
            .store
            .lock()
            .session()
            .cloned()
            .ok_or(Error::NoActiveSession)?;
        let manager = self.connection_manager();
        manager.connect(session.connectivity, session).await?;
        Ok(())
    }

    /// Join the session described by a scanned deep link or JSON token.
    pub async fn join_from_token(&self, token: &str) -> Result<()> {
        let token = PairingToken::decode(token).ok_or(Error::UnrecognizedToken)?;
        let session = token.into_session(now_millis())?;
        self.join(session).await
    }

    /// Join the advertised session whose pairing code is `code`.
    ///
    /// The code is validated before any session is considered.
    pub async fn join_with_code(&self, code: &str, advertised: &[Session]) -> Result<()> {
        let code = PairingCode::parse(code)?;
        let now = now_millis();
        let session = advertised
            .iter()
            .find(|s| code.matches(s) && !s.is_expired(now))
            .cloned()
            .ok_or(Error::NoMatchingSession)?;
        self.join(session).await
    }

    async fn join(&self, session: Session) -> Result<()> {
        {
            let mut store = self.store.lock();
            store.set_role(Role::Parent);
            store.adopt(session.clone());
        }
        info!(room_id = %session.room_id, "joining session");
        let manager = self.connection_manager();
        manager.join_session(session.connectivity, session).await?;
        Ok(())
    }

    /// Tell the peer the session is over, disconnect and reset the store.
    pub async fn end_session(&self) {
        let manager = self.manager.lock().as_ref().map(|s| s.manager.clone());
        let session = self.store.lock().session().cloned();
        if let (Some(manager), Some(session)) = (manager, session) {
            if manager.is_connected() {
                if let Err(e) = manager
                    .send_message(&TransportMessage::session_end(&session))
                    .await
                {
                    debug!(error = %e, "session end notice not sent");
                }
            }
        }
        self.clear_connection_manager().await;
        self.store.lock().reset();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::core::TokenError;
    use crate::manager::{DefaultTransportFactory, ManagerConfigBuilder};
    use crate::platform::LogAlerts;
    use crate::session::{Connectivity, SessionConfig, SessionState};
    use crate::signaling::QrCarrierSource;
    use crate::transport::testing::{FakeMedia, FakePeers, ScriptedConnector, journal};
    use crate::transport::{ConnectionStatus, LocalParts};
    use url::Url;

    fn context(connector: Arc<ScriptedConnector>) -> AppContext {
        let config = ManagerConfigBuilder::new()
            .relay_url(Url::parse("ws://relay.test/ws").unwrap())
            .build();
        let journal = journal();
        let local = LocalParts {
            peers: FakePeers::new(journal.clone()),
            carriers: Arc::new(QrCarrierSource::new()),
            media: Arc::new(FakeMedia::new(journal)),
        };
        let factory = DefaultTransportFactory::new(config.clone(), local, connector);
        AppContext::new(config, Arc::new(factory), Arc::new(LogAlerts))
    }

    async fn eventually(check: impl Fn() -> bool) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_manager_is_lazy_and_replaceable() {
        let ctx = context(ScriptedConnector::opening());
        let first = ctx.connection_manager();
        assert!(Arc::ptr_eq(&first, &ctx.connection_manager()));

        ctx.clear_connection_manager().await;
        let second = ctx.connection_manager();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_listen_then_end() {
        let connector = ScriptedConnector::opening();
        let ctx = context(connector.clone());
        ctx.store().lock().set_connectivity(Connectivity::Anywhere);

        let invite = ctx.create_invite();
        assert!(invite.code.matches(&invite.session));
        assert!(invite.deep_link.starts_with("bsm://connect?"));
        assert_eq!(ctx.store().lock().state(), SessionState::Pairing);

        ctx.start_listening().await.unwrap();
        let store = ctx.store();
        eventually(|| store.lock().state() == SessionState::Streaming).await;
        assert_eq!(
            ctx.connection_manager().status(),
            ConnectionStatus::Connected
        );

        let mut remote = connector.next_remote().await;
        ctx.end_session().await;
        let mut types = Vec::new();
        while let Ok(frame) = remote.sent.try_recv() {
            let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
            types.push(value["type"].as_str().unwrap().to_string());
        }
        assert_eq!(types, vec!["listener:hello", "session:end"]);
        assert_eq!(ctx.store().lock().state(), SessionState::Idle);
        assert!(ctx.store().lock().session().is_none());
    }

    #[tokio::test]
    async fn test_start_listening_needs_session() {
        let ctx = context(ScriptedConnector::opening());
        assert!(matches!(
            ctx.start_listening().await,
            Err(Error::NoActiveSession)
        ));
    }

    #[tokio::test]
    async fn test_join_from_token() {
        let connector = ScriptedConnector::opening();
        let ctx = context(connector.clone());
        let session = Session::generate(&SessionConfig {
            connectivity: Connectivity::Anywhere,
            ..SessionConfig::default()
        });

        ctx.join_from_token(&PairingToken::encode_deep_link(&session))
            .await
            .unwrap();
        let store = ctx.store();
        assert_eq!(store.lock().role(), Some(Role::Parent));
        assert_eq!(
            store.lock().session().map(|s| s.room_id.clone()),
            Some(session.room_id.clone())
        );

        let mut remote = connector.next_remote().await;
        let hello: serde_json::Value =
            serde_json::from_str(&remote.sent.recv().await.unwrap()).unwrap();
        assert_eq!(hello["type"], "parent:hello");
    }

    #[tokio::test]
    async fn test_join_rejects_bad_tokens() {
        let ctx = context(ScriptedConnector::opening());
        assert!(matches!(
            ctx.join_from_token("hello there").await,
            Err(Error::UnrecognizedToken)
        ));

        let stale = Session::generate_at(&SessionConfig::default(), 1_000);
        assert!(matches!(
            ctx.join_from_token(&PairingToken::encode_json(&stale)).await,
            Err(Error::Token(TokenError::Expired))
        ));
    }

    #[tokio::test]
    async fn test_join_with_code() {
        let connector = ScriptedConnector::opening();
        let ctx = context(connector.clone());
        let target = Session::generate(&SessionConfig {
            connectivity: Connectivity::Anywhere,
            ..SessionConfig::default()
        });
        let expired_twin = Session {
            created_at: 1_000,
            expires_at: 2_000,
            ..target.clone()
        };
        let code = PairingCode::from_session(&target);

        assert!(matches!(
            ctx.join_with_code("12a456", &[target.clone()]).await,
            Err(Error::Code(_))
        ));
        assert!(matches!(
            ctx.join_with_code(code.as_str(), &[expired_twin.clone()]).await,
            Err(Error::NoMatchingSession)
        ));
        assert_eq!(connector.opens(), 0);

        ctx.join_with_code(code.as_str(), &[expired_twin, target.clone()])
            .await
            .unwrap();
        let store = ctx.store();
        assert_eq!(
            store.lock().session().map(|s| s.expires_at),
            Some(target.expires_at)
        );
        assert_eq!(store.lock().role(), Some(Role::Parent));
    }
}
