//! Relay server.
//!
//! Pairs the two devices of a session over WebSocket when they cannot reach
//! each other directly.

mod rooms;
#[allow(clippy::module_inception)]
mod server;

pub use rooms::{AdmitError, Admission, JoinRequest, RoomKey, RoomRegistry};
pub use server::{RelayServer, RelayServerBuilder, RelayServerConfig, ServerError};
