use thiserror::Error;

/// Failure to parse a [`ChunkId`](crate::ChunkId) from text or raw bytes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("chunk id is not valid hex: {0}")]
    InvalidHex(String),

    #[error("chunk id must be {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}
