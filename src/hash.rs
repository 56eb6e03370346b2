//! Object hasher (C2).
//!
//! Computes the canonical git object id for a `(type, content)` pair: the
//! SHA-1 digest of `"<type> <size>\0<content>"`, where `<type>` is one of
//! `blob`, `tree`, `commit`, `tag` and `<size>` is the decimal byte length of
//! `content`.

use crate::error::{GitgresError, Result};
use crate::oid::Oid;
use sha1::{Digest, Sha1};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectType {
    Blob,
    Tree,
    Commit,
    Tag,
}

impl ObjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blob => "blob",
            Self::Tree => "tree",
            Self::Commit => "commit",
            Self::Tag => "tag",
        }
    }

    /// The storage-layer type code persisted in `objects.type`, per the
    /// canonical schema: `1=commit, 2=tree, 3=blob, 4=tag`.
    pub fn code(&self) -> i16 {
        match self {
            Self::Commit => 1,
            Self::Tree => 2,
            Self::Blob => 3,
            Self::Tag => 4,
        }
    }

    pub fn from_code(code: i16) -> Result<Self> {
        match code {
            1 => Ok(Self::Commit),
            2 => Ok(Self::Tree),
            3 => Ok(Self::Blob),
            4 => Ok(Self::Tag),
            other => Err(GitgresError::InvalidType(other)),
        }
    }
}

pub fn hash_object(kind: ObjectType, content: &[u8]) -> Oid {
    let mut hasher = Sha1::new();
    hasher.update(kind.as_str().as_bytes());
    hasher.update(b" ");
    hasher.update(content.len().to_string().as_bytes());
    hasher.update(b"\0");
    hasher.update(content);
    let digest = hasher.finalize();
    Oid::from_bytes(&digest).expect("sha1 digest is always 20 bytes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_blob_matches_known_oid() {
        let oid = hash_object(ObjectType::Blob, b"hello");
        assert_eq!(oid.to_hex(), "b6fc4c620b67d95f953a5c1c1230aaab5db5a1b0");
    }

    #[test]
    fn empty_blob_matches_known_oid() {
        let oid = hash_object(ObjectType::Blob, b"");
        assert_eq!(oid.to_hex(), "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391");
    }

    #[test]
    fn type_code_roundtrip() {
        for kind in [
            ObjectType::Blob,
            ObjectType::Tree,
            ObjectType::Commit,
            ObjectType::Tag,
        ] {
            assert_eq!(ObjectType::from_code(kind.code()).unwrap(), kind);
        }
    }

    #[test]
    fn unknown_type_code_is_invalid_type() {
        assert!(matches!(
            ObjectType::from_code(99),
            Err(GitgresError::InvalidType(99))
        ));
    }
}
