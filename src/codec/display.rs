//! Human-readable renderings of session identifiers.

use crate::core::{JOIN_KEY_PREFIX, ROOM_ID_PREFIX};

const FALLBACK_LEN: usize = 12;

fn slice(chars: &[char], start: usize, end: usize) -> String {
    let end = end.min(chars.len());
    let start = start.min(end);
    chars[start..end].iter().collect()
}

fn truncate(s: &str) -> String {
    s.chars().take(FALLBACK_LEN).collect()
}

/// `room_1234567890_abc123def` → `7890-abc1-23`.
pub fn format_room_id(room_id: &str) -> String {
    let Some(rest) = room_id.strip_prefix(ROOM_ID_PREFIX) else {
        return truncate(room_id);
    };
    let mut parts = rest.split('_');
    let (Some(timestamp), Some(suffix)) = (parts.next(), parts.next()) else {
        return truncate(room_id);
    };

    let ts: Vec<char> = timestamp.chars().collect();
    let suffix: Vec<char> = suffix.chars().collect();
    format!(
        "{}-{}-{}",
        slice(&ts, ts.len().saturating_sub(4), ts.len()),
        slice(&suffix, 0, 4),
        slice(&suffix, 4, 6)
    )
}

/// `key_abc123def456` → `ABC1-23-DEF4`.
pub fn format_join_key(join_key: &str) -> String {
    let Some(key) = join_key.strip_prefix(JOIN_KEY_PREFIX) else {
        return truncate(join_key);
    };
    let key: Vec<char> = key.to_uppercase().chars().collect();
    format!(
        "{}-{}-{}",
        slice(&key, 0, 4),
        slice(&key, 4, 6),
        slice(&key, 6, 10)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_room_id() {
        assert_eq!(format_room_id("room_1234567890_abc123def"), "7890-abc1-23");
        assert_eq!(format_room_id("something-else-entirely"), "something-el");
        assert_eq!(format_room_id("room_12_ab"), "12-ab-");
        assert_eq!(format_room_id("room_1234567890_abc123_extra"), "7890-abc1-23");
        assert_eq!(format_room_id("room_1234567890_ab_cdef"), "7890-ab-");
    }

    #[test]
    fn test_format_join_key() {
        assert_eq!(format_join_key("key_abc123def456"), "ABC1-23-DEF4");
        assert_eq!(format_join_key("no-prefix-key-value"), "no-prefix-ke");
    }
}
