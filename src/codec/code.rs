//! Six-digit pairing codes.

use std::fmt;
use std::str::FromStr;

use sha2::{Digest, Sha256};

use crate::core::{CodeError, PAIRING_CODE_LEN};
use crate::session::Session;

/// A six-digit numeric alias of a session.
///
/// The code is derived from the room identifier and join key, so a device
/// that can see candidate sessions (e.g. nearby advertisements) can pick the
/// one the user typed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PairingCode([u8; PAIRING_CODE_LEN]);

impl PairingCode {
    /// Parse user input. Exactly six ASCII digits, nothing else.
    pub fn parse(input: &str) -> Result<Self, CodeError> {
        let len = input.chars().count();
        if len != PAIRING_CODE_LEN {
            return Err(CodeError::WrongLength {
                expected: PAIRING_CODE_LEN,
                actual: len,
            });
        }

        let mut digits = [0u8; PAIRING_CODE_LEN];
        for (slot, c) in digits.iter_mut().zip(input.chars()) {
            if !c.is_ascii_digit() {
                return Err(CodeError::NonDigit(c));
            }
            *slot = c as u8;
        }
        Ok(Self(digits))
    }

    /// Code of `session`.
    pub fn from_session(session: &Session) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(session.room_id.as_bytes());
        hasher.update(b":");
        hasher.update(session.join_key.as_bytes());
        let digest = hasher.finalize();

        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        let mut value = u64::from_be_bytes(head) % 10u64.pow(PAIRING_CODE_LEN as u32);

        let mut digits = [b'0'; PAIRING_CODE_LEN];
        for slot in digits.iter_mut().rev() {
            *slot = b'0' + (value % 10) as u8;
            value /= 10;
        }
        Self(digits)
    }

    /// Whether this code designates `session`.
    pub fn matches(&self, session: &Session) -> bool {
        *self == Self::from_session(session)
    }

    /// The digits as a string slice.
    pub fn as_str(&self) -> &str {
        // Only ASCII digits are ever stored.
        std::str::from_utf8(&self.0).unwrap_or("")
    }
}

impl FromStr for PairingCode {
    type Err = CodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for PairingCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionConfig;

    #[test]
    fn test_parse_valid() {
        let code = PairingCode::parse("012345").unwrap();
        assert_eq!(code.as_str(), "012345");
        assert_eq!(code.to_string(), "012345");
    }

    #[test]
    fn test_parse_rejects_non_digit() {
        assert_eq!(PairingCode::parse("12a456"), Err(CodeError::NonDigit('a')));
        assert_eq!(PairingCode::parse("12 456"), Err(CodeError::NonDigit(' ')));
        // Non-ASCII digits are not accepted either.
        assert_eq!(PairingCode::parse("12٣456"), Err(CodeError::NonDigit('٣')));
    }

    #[test]
    fn test_parse_rejects_length() {
        assert_eq!(
            PairingCode::parse("12345"),
            Err(CodeError::WrongLength { expected: 6, actual: 5 })
        );
        assert!(PairingCode::parse("1234567").is_err());
        assert!(PairingCode::parse("").is_err());
    }

    #[test]
    fn test_session_code_is_stable() {
        let session = Session::generate(&SessionConfig::default());
        let code = PairingCode::from_session(&session);

        assert_eq!(code, PairingCode::from_session(&session));
        assert!(code.as_str().bytes().all(|b| b.is_ascii_digit()));
        assert!(PairingCode::parse(code.as_str()).unwrap().matches(&session));
    }
}
