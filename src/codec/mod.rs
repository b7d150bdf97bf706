//! Shareable encodings of a session.
//!
//! - [`PairingToken`]: deep link or flat JSON carrying the session fields
//! - [`SessionDescription`] blobs: base64 JSON SDP for offline handshakes
//! - [`PairingCode`]: six-digit numeric alias of a session
//! - display helpers for room identifiers and join keys

mod code;
mod display;
mod offer;
mod token;

pub use code::PairingCode;
pub use display::{format_join_key, format_room_id};
pub use offer::{SdpKind, SessionDescription, decode_offer_blob, encode_offer_blob};
pub use token::PairingToken;
