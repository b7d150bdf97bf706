//! Narrow interfaces to platform collaborators.
//!
//! Media capture, alert delivery and capability probing live outside this
//! crate; the transport and manager layers only see these traits.

mod alerts;
mod capabilities;
mod media;

pub use alerts::*;
pub use capabilities::*;
pub use media::*;
