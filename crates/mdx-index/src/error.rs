//! Error types for the index crate.

use mdx_store::StoreError;
use mdx_types::ChunkId;

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// A chunk referenced by the index is absent from the chunk store.
    #[error("chunk not found: {0}")]
    ChunkNotFound(ChunkId),

    /// The chunk store could not be reached.
    #[error("network error: {0}")]
    Network(String),

    /// A chunk was found but could not be decoded as the expected node.
    #[error("corrupt chunk {id}: {reason}")]
    CorruptChunk { id: ChunkId, reason: String },

    /// The key is not present.
    #[error("key not found")]
    KeyNotFound,

    /// `insert` was called with a key that is already present.
    #[error("duplicate key")]
    DuplicateKey,

    /// The key does not fit the serialized layout.
    #[error("key of {size} bytes exceeds the {max}-byte limit")]
    KeySize { size: usize, max: usize },

    /// The value does not fit the serialized layout.
    #[error("value of {size} bytes exceeds the {max}-byte limit")]
    ValueSize { size: usize, max: usize },

    /// Two distinct keys share every bit of their digest.
    #[error("key digests collide on all {0} levels")]
    DigestExhausted(usize),

    /// A malformed request reached the index.
    #[error("malformed request: {0}")]
    RequestFormat(String),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Chunk store failure other than absence or transport loss.
    #[error("store error: {0}")]
    Store(#[source] StoreError),

    /// Root registry failure.
    #[error("registry error: {0}")]
    Registry(#[from] mdx_refs::RegistryError),
}

impl IndexError {
    /// Returns `true` for errors meaning "the chunk cannot be used": absent or
    /// undecodable. Both leave the affected subtree unloaded.
    pub fn is_missing_chunk(&self) -> bool {
        matches!(
            self,
            Self::ChunkNotFound(_) | Self::CorruptChunk { .. }
        )
    }

    /// Returns `true` for transient failures worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

impl From<StoreError> for IndexError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => Self::ChunkNotFound(id),
            StoreError::Network(msg) => Self::Network(msg),
            StoreError::HashMismatch { id, computed } => Self::CorruptChunk {
                id,
                reason: format!("content hashes to {computed}"),
            },
            other => Self::Store(other),
        }
    }
}

/// Convenience alias for index results.
pub type IndexResult<T> = Result<T, IndexError>;
