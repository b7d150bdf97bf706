//! Error types shared across the crate.

use thiserror::Error;

use crate::manager::ManagerError;
use crate::signaling::SignalingError;
use crate::transport::TransportError;

/// Reasons a pairing token fails validation.
///
/// Checks run in declaration order; the first failing one is reported.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// Room identifier shorter than the minimum.
    #[error("invalid room id")]
    InvalidRoomId,

    /// Join key shorter than the minimum.
    #[error("invalid join key")]
    InvalidJoinKey,

    /// Unknown stream mode.
    #[error("invalid stream mode: {0}")]
    InvalidMode(String),

    /// Unknown connectivity type.
    #[error("invalid connectivity type: {0}")]
    InvalidConnectivity(String),

    /// Token older than the session lifetime.
    #[error("pairing code has expired")]
    Expired,
}

/// Errors parsing a six-digit pairing code.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodeError {
    /// Wrong number of characters.
    #[error("pairing code must be {expected} digits, got {actual}")]
    WrongLength {
        /// Required length.
        expected: usize,
        /// Length of the input.
        actual: usize,
    },

    /// A character outside ASCII `0-9`.
    #[error("pairing code contains non-digit {0:?}")]
    NonDigit(char),
}

/// Errors decoding a base64 session description blob.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Not valid base64.
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Decoded bytes are not a session description.
    #[error("invalid description: {0}")]
    Json(#[from] serde_json::Error),
}

/// Top-level errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Token could not be decoded at all.
    #[error("unrecognized pairing token")]
    UnrecognizedToken,

    /// No session is active.
    #[error("no active session")]
    NoActiveSession,

    /// No advertised session matches the entered code.
    #[error("no session matches the pairing code")]
    NoMatchingSession,

    /// Token decoded but failed validation.
    #[error("token error: {0}")]
    Token(#[from] TokenError),

    /// Pairing code rejected.
    #[error("code error: {0}")]
    Code(#[from] CodeError),

    /// Description blob rejected.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Signaling failure.
    #[error("signaling error: {0}")]
    Signaling(#[from] SignalingError),

    /// Transport failure.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Connection manager failure.
    #[error("connection error: {0}")]
    Manager(#[from] ManagerError),

    /// Relay server failure.
    #[cfg(feature = "server")]
    #[error("server error: {0}")]
    Server(#[from] crate::server::ServerError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Crate-level result alias.
pub type Result<T> = std::result::Result<T, Error>;
