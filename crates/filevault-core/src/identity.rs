//! Content identities.
//!
//! A [`ContentIdentity`] is the lowercase hex SHA-256 digest of a file's
//! bytes. It depends on nothing but the content: renaming, moving, or
//! touching a file leaves its identity unchanged, which is what lets the
//! record store follow files across the filesystem.
//!
//! Hashing streams the input in fixed-size chunks, so arbitrarily large
//! files are hashed in bounded memory.

use std::fmt;
use std::io::Read;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Chunk size used when streaming content through the hasher.
pub const HASH_CHUNK_SIZE: usize = 8192;

/// Length of the hex-encoded digest.
pub const IDENTITY_HEX_LEN: usize = 64;

/// Error returned when a string is not a well-formed content identity.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid content identity '{0}': expected 64 hex characters")]
pub struct InvalidIdentity(pub String);

/// SHA-256 content identity, stored as 64 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentIdentity(String);

impl ContentIdentity {
    /// Hash everything `reader` yields, [`HASH_CHUNK_SIZE`] bytes at a time.
    pub fn from_reader<R: Read>(mut reader: R) -> std::io::Result<Self> {
        let mut hasher = Sha256::new();
        let mut buf = [0u8; HASH_CHUNK_SIZE];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(Self(hex::encode(hasher.finalize())))
    }

    /// Hash an in-memory byte slice.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Leading characters of the digest, for log lines and tables.
    pub fn short(&self) -> &str {
        &self.0[..16]
    }
}

impl FromStr for ContentIdentity {
    type Err = InvalidIdentity;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.len() != IDENTITY_HEX_LEN || !trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(InvalidIdentity(s.to_string()));
        }
        Ok(Self(trimmed.to_ascii_lowercase()))
    }
}

impl TryFrom<String> for ContentIdentity {
    type Error = InvalidIdentity;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ContentIdentity> for String {
    fn from(id: ContentIdentity) -> Self {
        id.0
    }
}

impl fmt::Display for ContentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ContentIdentity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_digest_of_empty_input() {
        let id = ContentIdentity::from_bytes(b"");
        assert_eq!(
            id.as_str(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn streaming_matches_one_shot_across_chunk_boundaries() {
        let data: Vec<u8> = (0..(HASH_CHUNK_SIZE * 3 + 17))
            .map(|i| (i % 251) as u8)
            .collect();
        let streamed = ContentIdentity::from_reader(data.as_slice()).unwrap();
        assert_eq!(streamed, ContentIdentity::from_bytes(&data));
    }

    #[test]
    fn different_content_different_identity() {
        let a = ContentIdentity::from_bytes(b"alpha");
        let b = ContentIdentity::from_bytes(b"alphb");
        assert_ne!(a, b);
    }

    #[test]
    fn parse_normalizes_case_and_rejects_garbage() {
        let upper = "E3B0C44298FC1C149AFBF4C8996FB92427AE41E4649B934CA495991B7852B855";
        let id: ContentIdentity = upper.parse().unwrap();
        assert_eq!(id, ContentIdentity::from_bytes(b""));

        assert!("abc".parse::<ContentIdentity>().is_err());
        assert!("z".repeat(64).parse::<ContentIdentity>().is_err());
    }

    #[test]
    fn serde_uses_plain_string() {
        let id = ContentIdentity::from_bytes(b"x");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
        let back: ContentIdentity = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
        assert!(serde_json::from_str::<ContentIdentity>("\"nope\"").is_err());
    }

    #[test]
    fn short_is_prefix() {
        let id = ContentIdentity::from_bytes(b"x");
        assert_eq!(id.short().len(), 16);
        assert!(id.as_str().starts_with(id.short()));
    }
}
