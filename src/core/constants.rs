//! Pairing and transport constants.
//!
//! Both devices must agree on these values; changing one side only breaks
//! pairing with older builds.

use std::time::Duration;

// =============================================================================
// SESSION IDENTIFIERS
// =============================================================================

/// Prefix of every generated room identifier.
pub const ROOM_ID_PREFIX: &str = "room_";

/// Prefix of every generated join key.
pub const JOIN_KEY_PREFIX: &str = "key_";

/// Random base-36 characters appended to a room identifier.
pub const ROOM_SUFFIX_LEN: usize = 12;

/// Random base-36 characters in a join key.
pub const JOIN_KEY_SUFFIX_LEN: usize = 12;

/// Minimum accepted room identifier length.
pub const MIN_ROOM_ID_LEN: usize = 10;

/// Minimum accepted join key length.
pub const MIN_JOIN_KEY_LEN: usize = 8;

/// Session lifetime from creation.
pub const SESSION_LIFETIME: Duration = Duration::from_secs(10 * 60);

/// Session lifetime in milliseconds, for wall-clock arithmetic.
pub const SESSION_LIFETIME_MS: u64 = 10 * 60 * 1000;

// =============================================================================
// TOKENS
// =============================================================================

/// Deep-link URI scheme.
pub const DEEP_LINK_SCHEME: &str = "bsm";

/// Deep-link action (host or path segment).
pub const DEEP_LINK_ACTION: &str = "connect";

/// Digits in a pairing code.
pub const PAIRING_CODE_LEN: usize = 6;

// =============================================================================
// RELAY
// =============================================================================

/// First reconnection delay of the relay socket.
pub const RELAY_INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Backoff growth factor per reconnection attempt.
pub const RELAY_BACKOFF_MULTIPLIER: u32 = 2;

/// Upper bound for a single reconnection delay.
pub const RELAY_MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Reconnection attempts after the initial open before giving up.
pub const RELAY_MAX_RECONNECTS: u32 = 5;

/// Bound on a single socket open (TCP + TLS + upgrade).
pub const RELAY_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Query parameter carrying the room identifier.
pub const RELAY_QUERY_ROOM: &str = "room";

/// Query parameter carrying the join key.
pub const RELAY_QUERY_KEY: &str = "key";

/// Query parameter selecting the logical channel within a room.
pub const RELAY_QUERY_CHANNEL: &str = "channel";

/// Channel used by the relay transport.
pub const CHANNEL_TRANSPORT: &str = "transport";

/// Channel used by relay signaling.
pub const CHANNEL_SIGNALING: &str = "signaling";

/// Members allowed in one relay room (listener + parent).
pub const MAX_ROOM_MEMBERS: usize = 2;

/// Environment variable holding the relay URL.
pub const ENV_RELAY_URL: &str = "BSM_RELAY_URL";

/// Environment variable holding the relay server's bind address.
pub const ENV_RELAY_BIND: &str = "BSM_RELAY_BIND";

/// Environment variable holding the relay server's log filter.
pub const ENV_LOG: &str = "BSM_LOG";

// =============================================================================
// PEER-TO-PEER
// =============================================================================

/// Bound on ICE gathering before the local description is final.
pub const ICE_GATHER_TIMEOUT: Duration = Duration::from_secs(10);

/// Bound on the data channel opening once descriptions are exchanged.
pub const PEER_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Bound on waiting for the peer's description over a signaling carrier.
pub const REMOTE_DESCRIPTION_TIMEOUT: Duration = Duration::from_secs(120);

/// Label of the control data channel.
pub const DATA_CHANNEL_LABEL: &str = "control";

/// Default STUN servers.
pub const DEFAULT_STUN_SERVERS: &[&str] = &[
    "stun:stun.l.google.com:19302",
    "stun:stun1.l.google.com:19302",
    "stun:stun2.l.google.com:19302",
];

/// Service identifier advertised over the proximity carrier.
pub const PROXIMITY_SERVICE_TYPE: &str = "baby-monitor";

// =============================================================================
// SUPERVISOR
// =============================================================================

/// Delay step of the parent-side supervisor (`step × attempt`).
pub const SUPERVISOR_DELAY_STEP: Duration = Duration::from_secs(2);

/// Fresh-transport attempts made by the supervisor.
pub const SUPERVISOR_MAX_ATTEMPTS: u32 = 5;
