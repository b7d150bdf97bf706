//! Session model.
//!
//! A [`Session`] is the pairing agreement between a listener and a parent
//! device. The [`SessionStore`] keeps the single active session of a device
//! together with the pairing preferences and lifecycle state.

mod session;
mod store;

pub use session::*;
pub use store::*;
