//! Content integrity hashes: SHA-256, hex encoded.
//!
//! [`StreamingHasher`] is fed while bytes are being written in a single pass.
//! [`compute_hash`] re-reads stored data in fixed windows when no single pass was observed.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::record::Data;
use crate::StoreResult;

/// Window size used when re-reading stored data.
pub const HASH_WINDOW: usize = 1024 * 1024;

/// A SHA-256 digest as 64 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

#[derive(Debug, Error)]
pub enum HashError {
    #[error("invalid hash length: expected 64 hex chars, got {0}")]
    InvalidLength(usize),

    #[error("invalid hex character in hash")]
    InvalidHex,
}

impl ContentHash {
    /// Hash a complete buffer.
    pub fn from_data(data: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(data)))
    }

    /// Create from an existing hash string (validates format).
    pub fn from_str_checked(s: &str) -> Result<Self, HashError> {
        if s.len() != 64 {
            return Err(HashError::InvalidLength(s.len()));
        }
        if !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(HashError::InvalidHex);
        }
        Ok(Self(s.to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ContentHash {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_checked(s)
    }
}

impl AsRef<str> for ContentHash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Incremental hash over every byte written in one pass.
#[derive(Debug, Clone, Default)]
pub struct StreamingHasher {
    inner: Sha256,
    bytes: u64,
}

impl StreamingHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.inner.update(chunk);
        self.bytes += chunk.len() as u64;
    }

    /// Number of bytes fed so far.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn finish(self) -> ContentHash {
        ContentHash(hex::encode(self.inner.finalize()))
    }
}

/// Hash the first `size` bytes of stored data, reading `HASH_WINDOW` bytes at a time.
///
/// Stops early if the data turns out to be shorter than `size`.
pub fn compute_hash(data: &Data, size: u64) -> StoreResult<ContentHash> {
    let mut hasher = StreamingHasher::new();
    let mut offset = 0u64;
    while offset < size {
        let want = (size - offset).min(HASH_WINDOW as u64) as usize;
        let buf = data.read(want, offset)?;
        if buf.is_empty() {
            break;
        }
        offset += buf.len() as u64;
        hasher.update(&buf);
    }
    Ok(hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn test_from_data_known_vectors() {
        assert_eq!(ContentHash::from_data(b"").as_str(), EMPTY_SHA256);
        assert_eq!(
            ContentHash::from_data(b"abc").as_str(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_streaming_matches_one_shot() {
        let mut hasher = StreamingHasher::new();
        hasher.update(b"Hello, ");
        hasher.update(b"World!");
        assert_eq!(hasher.bytes(), 13);
        assert_eq!(hasher.finish(), ContentHash::from_data(b"Hello, World!"));
    }

    #[test]
    fn test_from_str_valid() {
        let hash: ContentHash = EMPTY_SHA256.to_uppercase().parse().unwrap();
        assert_eq!(hash.as_str(), EMPTY_SHA256);
    }

    #[test]
    fn test_from_str_invalid() {
        assert!(matches!(
            "short".parse::<ContentHash>(),
            Err(HashError::InvalidLength(5))
        ));
        let bad = "z".repeat(64);
        assert!(matches!(
            bad.parse::<ContentHash>(),
            Err(HashError::InvalidHex)
        ));
    }

    #[test]
    fn test_serde_is_plain_string() {
        let hash = ContentHash::from_data(b"serde test");
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{}\"", hash));
    }
}
