use mdx_types::ChunkId;

/// Errors from chunk store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested chunk is unknown to the store.
    #[error("chunk not found: {0}")]
    NotFound(ChunkId),

    /// The store could not be reached. Transient; the caller may retry.
    #[error("network error: {0}")]
    Network(String),

    /// Content hash mismatch on read (data corruption).
    #[error("hash mismatch for {id}: computed {computed}")]
    HashMismatch { id: ChunkId, computed: ChunkId },

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Storage backend is read-only.
    #[error("store is read-only")]
    ReadOnly,
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
