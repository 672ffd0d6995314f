//! Content fingerprints for incremental indexing
//!
//! Files are hashed over their raw bytes. Chunks are hashed over the UTF-16LE
//! encoding of their text, so digests stay comparable with indexes written by
//! other clients of the same database layout.

use sha2::{Digest as _, Sha256};
use std::fmt;

/// Hash algorithm tag stored next to every digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HashType {
    Sha256,
    /// Tag written by something this build does not know about.
    Unknown(String),
}

impl HashType {
    pub const SHA256_TAG: &'static str = "SHA2_256";

    pub fn parse(tag: &str) -> Self {
        match tag {
            Self::SHA256_TAG => HashType::Sha256,
            other => HashType::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            HashType::Sha256 => Self::SHA256_TAG,
            HashType::Unknown(tag) => tag,
        }
    }

    /// Digest length in bytes, for known algorithms.
    pub fn digest_len(&self) -> Option<usize> {
        match self {
            HashType::Sha256 => Some(32),
            HashType::Unknown(_) => None,
        }
    }
}

impl fmt::Display for HashType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A digest together with the algorithm that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Digest {
    pub hash_type: HashType,
    pub bytes: Vec<u8>,
}

impl Digest {
    pub fn new(hash_type: HashType, bytes: Vec<u8>) -> Self {
        Self { hash_type, bytes }
    }

    /// Rebuilds a digest from its stored tag and bytes.
    pub fn from_parts(tag: &str, bytes: Vec<u8>) -> Self {
        Self::new(HashType::parse(tag), bytes)
    }

    /// Placeholder for rows whose content has not been hashed. Never matches.
    pub fn empty() -> Self {
        Self::new(HashType::Unknown(String::new()), Vec::new())
    }

    /// True only for two well-formed digests of a known algorithm with equal
    /// bytes. Unknown tags and truncated bytes never match.
    pub fn matches(&self, other: &Digest) -> bool {
        if self.hash_type != other.hash_type {
            return false;
        }
        let Some(len) = self.hash_type.digest_len() else {
            return false;
        };
        self.bytes.len() == len && other.bytes.len() == len && self.bytes == other.bytes
    }

    pub fn to_hex(&self) -> String {
        self.bytes.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hash_type, self.to_hex())
    }
}

/// SHA-256 over raw file bytes.
pub fn file_hash(bytes: &[u8]) -> Digest {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    Digest::new(HashType::Sha256, hasher.finalize().to_vec())
}

/// SHA-256 over the UTF-16LE encoding of a chunk's text.
pub fn chunk_hash(text: &str) -> Digest {
    let mut hasher = Sha256::new();
    for unit in text.encode_utf16() {
        hasher.update(unit.to_le_bytes());
    }
    Digest::new(HashType::Sha256, hasher.finalize().to_vec())
}

/// Element-wise match of two ordered digest sequences.
pub fn all_match(stored: &[Digest], current: &[Digest]) -> bool {
    stored.len() == current.len() && stored.iter().zip(current).all(|(a, b)| a.matches(b))
}
