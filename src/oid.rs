//! Object-id codec (C1).
//!
//! A git object id is 20 raw bytes, conventionally displayed as 40 lowercase
//! hex characters. This module is the single place that crosses that
//! boundary so the rest of the crate can stay in raw-byte space (what the
//! database stores and compares) and only touch hex at the protocol edges
//! (remote-helper lines, error messages).

use crate::error::{GitgresError, Result};
use std::fmt;

pub const OID_RAW_LEN: usize = 20;
pub const OID_HEX_LEN: usize = 40;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Oid([u8; OID_RAW_LEN]);

impl Oid {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != OID_RAW_LEN {
            return Err(GitgresError::MalformedInput(format!(
                "oid must be {OID_RAW_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        let mut buf = [0u8; OID_RAW_LEN];
        buf.copy_from_slice(bytes);
        Ok(Self(buf))
    }

    /// Parses a 40-character lowercase hex string. Uppercase or
    /// mixed-case input is rejected rather than normalized: every producer
    /// in this crate emits lowercase, and silently accepting other cases
    /// would let inconsistent keys slip into the database.
    pub fn from_hex(s: &str) -> Result<Self> {
        if s.len() != OID_HEX_LEN {
            return Err(GitgresError::MalformedInput(format!(
                "oid hex must be {OID_HEX_LEN} chars, got {}",
                s.len()
            )));
        }
        if !s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)) {
            return Err(GitgresError::MalformedInput(
                "oid hex must be lowercase".into(),
            ));
        }
        let mut buf = [0u8; OID_RAW_LEN];
        hex::decode_to_slice(s, &mut buf)
            .map_err(|e| GitgresError::MalformedInput(format!("invalid oid hex: {e}")))?;
        Ok(Self(buf))
    }

    /// Parses a partial-prefix hex string (1..=40 chars), for abbreviated
    /// lookups. Returns the raw prefix bytes plus a flag for whether the
    /// prefix ends mid-byte (odd length).
    pub fn parse_prefix(s: &str) -> Result<OidPrefix> {
        if s.is_empty() || s.len() > OID_HEX_LEN {
            return Err(GitgresError::MalformedInput(format!(
                "oid prefix length must be 1..={OID_HEX_LEN}, got {}",
                s.len()
            )));
        }
        if !s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)) {
            return Err(GitgresError::MalformedInput(
                "oid prefix must be lowercase hex".into(),
            ));
        }
        let full_bytes = s.len() / 2;
        let mut bytes = vec![0u8; full_bytes];
        hex::decode_to_slice(&s[..full_bytes * 2], &mut bytes)
            .map_err(|e| GitgresError::MalformedInput(format!("invalid oid prefix: {e}")))?;
        let odd_nibble = if s.len() % 2 == 1 {
            Some(u8::from_str_radix(&s[s.len() - 1..], 16).unwrap())
        } else {
            None
        };
        Ok(OidPrefix { bytes, odd_nibble })
    }

    pub fn as_bytes(&self) -> &[u8; OID_RAW_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

/// A (possibly odd-length) hex prefix, used by C6/C7's prefix lookups.
pub struct OidPrefix {
    pub bytes: Vec<u8>,
    pub odd_nibble: Option<u8>,
}

impl OidPrefix {
    /// True if `oid` starts with this prefix.
    pub fn matches(&self, oid: &Oid) -> bool {
        let full = self.bytes.len();
        if oid.0[..full] != self.bytes[..] {
            return false;
        }
        match self.odd_nibble {
            Some(nibble) => oid.0[full] >> 4 == nibble,
            None => true,
        }
    }
}

impl fmt::Debug for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Oid({})", self.to_hex())
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_roundtrip() {
        let hex = "0123456789abcdef0123456789abcdef01234567";
        let oid = Oid::from_hex(hex).unwrap();
        assert_eq!(oid.to_hex(), hex);
    }

    #[test]
    fn rejects_uppercase() {
        let hex = "0123456789ABCDEF0123456789abcdef01234567";
        assert!(Oid::from_hex(hex).is_err());
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(Oid::from_hex("abcd").is_err());
    }

    #[test]
    fn ordering_is_lexicographic_on_bytes() {
        let a = Oid::from_bytes(&[0u8; 20]).unwrap();
        let b = Oid::from_bytes(&{
            let mut buf = [0u8; 20];
            buf[19] = 1;
            buf
        })
        .unwrap();
        assert!(a < b);
    }

    #[test]
    fn prefix_matches_even_length() {
        let oid = Oid::from_hex("abcdef0123456789abcdef0123456789abcdef01").unwrap();
        let prefix = Oid::parse_prefix("abcdef").unwrap();
        assert!(prefix.matches(&oid));
    }

    #[test]
    fn prefix_matches_odd_length() {
        let oid = Oid::from_hex("abcdef0123456789abcdef0123456789abcdef01").unwrap();
        let prefix = Oid::parse_prefix("abcdefa").unwrap();
        assert!(prefix.matches(&oid));
        let prefix = Oid::parse_prefix("abcdefb").unwrap();
        assert!(!prefix.matches(&oid));
    }
}
