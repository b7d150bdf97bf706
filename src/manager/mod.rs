//! Connection management.
//!
//! [`ConnectionManager`] picks a transport for the requested connectivity,
//! tracks its status and rebuilds it when a parent loses the listener.
//! [`AppContext`] ties the manager to the session store.

mod config;
mod context;
mod factory;
#[allow(clippy::module_inception)]
mod manager;
mod supervisor;

pub use config::{ManagerConfig, ManagerConfigBuilder};
pub use context::{AppContext, Invite};
pub use factory::{DefaultTransportFactory, TransportFactory, TransportRequest, select_transport};
pub use manager::{ConnectionInfo, ConnectionManager, ManagerError, ManagerEvent};
