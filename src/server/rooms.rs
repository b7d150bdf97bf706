//! Room registry for the relay server.
//!
//! A room is identified by `(room, channel)`. The first member fixes the join
//! key; a room holds at most two members.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, trace};
use url::form_urlencoded;

use crate::core::{
    CHANNEL_TRANSPORT, MAX_ROOM_MEMBERS, RELAY_QUERY_CHANNEL, RELAY_QUERY_KEY, RELAY_QUERY_ROOM,
};

/// Why a connection was refused.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdmitError {
    /// A required query parameter is absent or empty.
    #[error("missing query parameter `{0}`")]
    MissingParameter(&'static str),

    /// The join key differs from the one the room was opened with.
    #[error("join key does not match the room")]
    KeyMismatch,

    /// The room already has both members.
    #[error("room is full")]
    RoomFull,

    /// The registry holds its maximum number of rooms.
    #[error("too many rooms")]
    TooManyRooms,
}

impl AdmitError {
    /// HTTP status answered to the upgrade request.
    pub fn status(&self) -> u16 {
        match self {
            Self::MissingParameter(_) => 400,
            Self::KeyMismatch | Self::RoomFull => 409,
            Self::TooManyRooms => 503,
        }
    }
}

/// Parameters of an upgrade request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinRequest {
    /// Room identifier.
    pub room: String,
    /// Join key.
    pub key: String,
    /// Channel within the room.
    pub channel: String,
}

impl JoinRequest {
    /// Read `room`, `key` and `channel` from a query string.
    pub fn from_query(query: Option<&str>) -> Result<Self, AdmitError> {
        let (mut room, mut key, mut channel) = (None, None, None);
        for (name, value) in form_urlencoded::parse(query.unwrap_or("").as_bytes()) {
            let slot = match name.as_ref() {
                RELAY_QUERY_ROOM => &mut room,
                RELAY_QUERY_KEY => &mut key,
                RELAY_QUERY_CHANNEL => &mut channel,
                _ => continue,
            };
            if !value.is_empty() {
                *slot = Some(value.into_owned());
            }
        }

        Ok(Self {
            room: room.ok_or(AdmitError::MissingParameter(RELAY_QUERY_ROOM))?,
            key: key.ok_or(AdmitError::MissingParameter(RELAY_QUERY_KEY))?,
            channel: channel.unwrap_or_else(|| CHANNEL_TRANSPORT.to_string()),
        })
    }
}

/// Registry key of a room.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomKey {
    /// Room identifier.
    pub room: String,
    /// Channel within the room.
    pub channel: String,
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.room, self.channel)
    }
}

/// A member's place in a room.
#[derive(Debug)]
pub struct Admission {
    /// The room joined.
    pub room: RoomKey,
    /// Member identifier, unique within the registry.
    pub member: u64,
    /// Frames from the other members.
    pub outbound: mpsc::UnboundedReceiver<String>,
}

struct Room {
    join_key: String,
    members: Vec<(u64, mpsc::UnboundedSender<String>)>,
}

/// All rooms of a relay server.
pub struct RoomRegistry {
    max_rooms: usize,
    next_member: AtomicU64,
    rooms: Mutex<HashMap<RoomKey, Room>>,
}

impl RoomRegistry {
    /// Empty registry holding at most `max_rooms` rooms.
    pub fn new(max_rooms: usize) -> Self {
        Self {
            max_rooms,
            next_member: AtomicU64::new(1),
            rooms: Mutex::new(HashMap::new()),
        }
    }

    /// Admit a member into the room named by `request`.
    pub fn admit(&self, request: JoinRequest) -> Result<Admission, AdmitError> {
        let key = RoomKey {
            room: request.room,
            channel: request.channel,
        };
        let mut rooms = self.rooms.lock();

        if !rooms.contains_key(&key) && rooms.len() >= self.max_rooms {
            return Err(AdmitError::TooManyRooms);
        }
        let room = rooms.entry(key.clone()).or_insert_with(|| Room {
            join_key: request.key.clone(),
            members: Vec::with_capacity(MAX_ROOM_MEMBERS),
        });
        if room.join_key != request.key {
            return Err(AdmitError::KeyMismatch);
        }
        if room.members.len() >= MAX_ROOM_MEMBERS {
            return Err(AdmitError::RoomFull);
        }

        let member = self.next_member.fetch_add(1, Ordering::Relaxed);
        let (tx, outbound) = mpsc::unbounded_channel();
        room.members.push((member, tx));
        debug!(room = %key, member, members = room.members.len(), "member joined");

        Ok(Admission {
            room: key,
            member,
            outbound,
        })
    }

    /// Forward `frame` to every member of `room` except `from`.
    ///
    /// Returns the number of members reached.
    pub fn broadcast(&self, room: &RoomKey, from: u64, frame: &str) -> usize {
        let rooms = self.rooms.lock();
        let Some(entry) = rooms.get(room) else {
            return 0;
        };
        let reached = entry
            .members
            .iter()
            .filter(|(id, _)| *id != from)
            .filter(|(_, tx)| tx.send(frame.to_string()).is_ok())
            .count();
        trace!(%room, from, reached, "frame relayed");
        reached
    }

    /// Remove `member`; the room goes away with its last member.
    pub fn leave(&self, room: &RoomKey, member: u64) {
        let mut rooms = self.rooms.lock();
        if let Some(entry) = rooms.get_mut(room) {
            entry.members.retain(|(id, _)| *id != member);
            if entry.members.is_empty() {
                rooms.remove(room);
                debug!(%room, "room closed");
            }
        }
    }

    /// Number of open rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.lock().len()
    }

    /// Number of members in `room`.
    pub fn member_count(&self, room: &RoomKey) -> usize {
        self.rooms
            .lock()
            .get(room)
            .map_or(0, |entry| entry.members.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(room: &str, key: &str) -> JoinRequest {
        JoinRequest {
            room: room.into(),
            key: key.into(),
            channel: CHANNEL_TRANSPORT.into(),
        }
    }

    #[test]
    fn test_query_parsing() {
        let parsed =
            JoinRequest::from_query(Some("room=room_1_abc&key=key_xyz&channel=signaling")).unwrap();
        assert_eq!(parsed.room, "room_1_abc");
        assert_eq!(parsed.key, "key_xyz");
        assert_eq!(parsed.channel, "signaling");

        let defaulted = JoinRequest::from_query(Some("room=r&key=k")).unwrap();
        assert_eq!(defaulted.channel, CHANNEL_TRANSPORT);

        assert_eq!(
            JoinRequest::from_query(Some("key=k")),
            Err(AdmitError::MissingParameter("room"))
        );
        assert_eq!(
            JoinRequest::from_query(Some("room=r&key=")),
            Err(AdmitError::MissingParameter("key"))
        );
        assert_eq!(
            JoinRequest::from_query(None),
            Err(AdmitError::MissingParameter("room"))
        );
    }

    #[test]
    fn test_first_member_fixes_key() {
        let registry = RoomRegistry::new(8);
        let first = registry.admit(request("room_a", "key_1")).unwrap();

        let err = registry.admit(request("room_a", "key_2")).unwrap_err();
        assert_eq!(err, AdmitError::KeyMismatch);
        assert_eq!(err.status(), 409);
        assert_eq!(registry.member_count(&first.room), 1);
    }

    #[test]
    fn test_room_holds_two_members() {
        let registry = RoomRegistry::new(8);
        let _a = registry.admit(request("room_a", "key_1")).unwrap();
        let _b = registry.admit(request("room_a", "key_1")).unwrap();

        let err = registry.admit(request("room_a", "key_1")).unwrap_err();
        assert_eq!(err, AdmitError::RoomFull);
        assert_eq!(err.status(), 409);
    }

    #[test]
    fn test_channels_are_separate_rooms() {
        let registry = RoomRegistry::new(8);
        let _a = registry.admit(request("room_a", "key_1")).unwrap();
        let _b = registry.admit(request("room_a", "key_1")).unwrap();
        let signaling = registry
            .admit(JoinRequest {
                channel: "signaling".into(),
                ..request("room_a", "key_1")
            })
            .unwrap();

        assert_eq!(registry.room_count(), 2);
        assert_eq!(registry.member_count(&signaling.room), 1);
    }

    #[test]
    fn test_room_limit() {
        let registry = RoomRegistry::new(1);
        let _a = registry.admit(request("room_a", "key_1")).unwrap();

        let err = registry.admit(request("room_b", "key_1")).unwrap_err();
        assert_eq!(err, AdmitError::TooManyRooms);
        assert_eq!(err.status(), 503);
        assert!(registry.admit(request("room_a", "key_1")).is_ok());
    }

    #[test]
    fn test_broadcast_skips_sender() {
        let registry = RoomRegistry::new(8);
        let mut a = registry.admit(request("room_a", "key_1")).unwrap();
        let mut b = registry.admit(request("room_a", "key_1")).unwrap();

        assert_eq!(registry.broadcast(&a.room, a.member, "{\"type\":\"ping\"}"), 1);
        assert_eq!(b.outbound.try_recv().unwrap(), "{\"type\":\"ping\"}");
        assert!(a.outbound.try_recv().is_err());
    }

    #[test]
    fn test_last_leave_closes_room() {
        let registry = RoomRegistry::new(8);
        let a = registry.admit(request("room_a", "key_1")).unwrap();
        let b = registry.admit(request("room_a", "key_1")).unwrap();

        registry.leave(&a.room, a.member);
        assert_eq!(registry.member_count(&b.room), 1);
        registry.leave(&b.room, b.member);
        assert_eq!(registry.room_count(), 0);

        // A fresh room may pick a new key.
        assert!(registry.admit(request("room_a", "key_2")).is_ok());
    }
}
