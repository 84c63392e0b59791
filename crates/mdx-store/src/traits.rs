use bytes::Bytes;
use mdx_crypto::ContentHasher;
use mdx_types::ChunkId;

use crate::error::{StoreError, StoreResult};

/// Content-addressed chunk store.
///
/// All implementations must satisfy these invariants:
/// - Chunks are immutable once written: the same bytes always produce the
///   same ID, computed by [`ChunkStore::chunk_id`].
/// - Writing a chunk that already exists is a no-op returning the same ID.
/// - Concurrent reads are always safe.
/// - Failures are reported, never retried internally.
pub trait ChunkStore: Send + Sync {
    /// Read a chunk by its content-addressed ID.
    ///
    /// Returns `Ok(None)` if the chunk does not exist.
    /// Returns `Err` on I/O failure, transport failure, or data corruption.
    fn read(&self, id: &ChunkId) -> StoreResult<Option<Bytes>>;

    /// Write a chunk and return its content-addressed ID.
    fn write(&self, data: &[u8]) -> StoreResult<ChunkId>;

    /// Check whether a chunk exists in the store.
    fn exists(&self, id: &ChunkId) -> StoreResult<bool>;

    /// The ID [`ChunkStore::write`] assigns to `data`, without writing it.
    fn chunk_id(&self, data: &[u8]) -> ChunkId {
        ContentHasher::CHUNK.hash(data)
    }

    /// Read a chunk that must exist, failing with [`StoreError::NotFound`]
    /// when it does not.
    fn retrieve(&self, id: &ChunkId) -> StoreResult<Bytes> {
        self.read(id)?.ok_or(StoreError::NotFound(*id))
    }

    /// Read multiple chunks in a batch.
    ///
    /// Default implementation calls `read()` for each ID. Remote backends may
    /// override to save round trips.
    fn read_batch(&self, ids: &[ChunkId]) -> StoreResult<Vec<Option<Bytes>>> {
        ids.iter().map(|id| self.read(id)).collect()
    }

    /// Write multiple chunks in a batch and return their IDs.
    fn write_batch(&self, chunks: &[&[u8]]) -> StoreResult<Vec<ChunkId>> {
        chunks.iter().map(|data| self.write(data)).collect()
    }
}
