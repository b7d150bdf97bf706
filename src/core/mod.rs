//! Core constants, error types and clock helpers.
//!
//! Everything else in the crate builds on this module. It has no knowledge of
//! sockets or peers.

mod clock;
mod constants;
mod error;

pub use clock::*;
pub use constants::*;
pub use error::*;
