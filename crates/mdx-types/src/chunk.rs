use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Width in bytes of a chunk digest.
pub const CHUNK_ID_LEN: usize = 32;

/// Content-addressed identifier of a stored chunk.
///
/// A `ChunkId` is a 256-bit BLAKE3 digest of a chunk's bytes. Index nodes
/// refer to each other by `ChunkId`, so two trees that share an unchanged
/// subtree share its identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkId([u8; CHUNK_ID_LEN]);

impl ChunkId {
    /// Compute a `ChunkId` from raw bytes (plain BLAKE3, no domain tag).
    pub fn from_bytes(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Create a `ChunkId` from a pre-computed digest.
    pub const fn from_hash(hash: [u8; CHUNK_ID_LEN]) -> Self {
        Self(hash)
    }

    /// The null chunk ID (all zeros). Encodes "no child" in fixed layouts.
    pub const fn null() -> Self {
        Self([0u8; CHUNK_ID_LEN])
    }

    /// Returns `true` if this is the null chunk ID.
    pub fn is_null(&self) -> bool {
        self.0 == [0u8; CHUNK_ID_LEN]
    }

    /// The raw 32-byte digest.
    pub fn as_bytes(&self) -> &[u8; CHUNK_ID_LEN] {
        &self.0
    }

    /// Read a `ChunkId` from a slice of exactly [`CHUNK_ID_LEN`] bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, TypeError> {
        let arr: [u8; CHUNK_ID_LEN] =
            bytes.try_into().map_err(|_| TypeError::InvalidLength {
                expected: CHUNK_ID_LEN,
                actual: bytes.len(),
            })?;
        Ok(Self(arr))
    }

    /// Hex-encoded string representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse from a hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }
}

impl fmt::Debug for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkId({})", self.short_hex())
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<[u8; CHUNK_ID_LEN]> for ChunkId {
    fn from(bytes: [u8; CHUNK_ID_LEN]) -> Self {
        Self(bytes)
    }
}

impl From<ChunkId> for [u8; CHUNK_ID_LEN] {
    fn from(id: ChunkId) -> Self {
        id.0
    }
}
