use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use bytes::Bytes;
use mdx_types::ChunkId;

use crate::error::{StoreError, StoreResult};
use crate::traits::ChunkStore;

/// In-memory, HashMap-based chunk store.
///
/// Intended for tests and embedding. Chunks are held behind a `RwLock` and
/// handed out as cheaply cloned [`Bytes`]. The store counts every `write`
/// call, including deduplicated ones, so callers can assert how many chunks a
/// commit produced. [`set_offline`](Self::set_offline) turns every operation
/// into a [`StoreError::Network`] failure.
pub struct InMemoryChunkStore {
    chunks: RwLock<HashMap<ChunkId, Bytes>>,
    write_calls: AtomicU64,
    read_calls: AtomicU64,
    offline: AtomicBool,
}

impl InMemoryChunkStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            chunks: RwLock::new(HashMap::new()),
            write_calls: AtomicU64::new(0),
            read_calls: AtomicU64::new(0),
            offline: AtomicBool::new(false),
        }
    }

    fn chunks(&self) -> RwLockReadGuard<'_, HashMap<ChunkId, Bytes>> {
        self.chunks.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn chunks_mut(&self) -> RwLockWriteGuard<'_, HashMap<ChunkId, Bytes>> {
        self.chunks.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_online(&self) -> StoreResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Network("in-memory store is offline".into()));
        }
        Ok(())
    }

    /// Number of distinct chunks currently stored.
    pub fn len(&self) -> usize {
        self.chunks().len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.chunks().is_empty()
    }

    /// Total bytes across all stored chunks.
    pub fn total_bytes(&self) -> u64 {
        self.chunks().values().map(|c| c.len() as u64).sum()
    }

    /// Number of `write` calls served so far.
    pub fn write_calls(&self) -> u64 {
        self.write_calls.load(Ordering::SeqCst)
    }

    /// Number of `read` calls served so far.
    pub fn read_calls(&self) -> u64 {
        self.read_calls.load(Ordering::SeqCst)
    }

    /// Simulate losing (or regaining) the connection to the store.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Remove all chunks from the store.
    pub fn clear(&self) {
        self.chunks_mut().clear();
    }

    /// Remove a single chunk. Returns `true` if it existed.
    ///
    /// Only useful for simulating lost chunks; referenced chunks must never
    /// be removed from a real store.
    pub fn remove(&self, id: &ChunkId) -> bool {
        self.chunks_mut().remove(id).is_some()
    }

    /// Overwrite the bytes stored under `id`, bypassing content addressing.
    ///
    /// Only useful for simulating corruption in tests.
    pub fn corrupt(&self, id: &ChunkId, data: &[u8]) {
        self.chunks_mut().insert(*id, Bytes::copy_from_slice(data));
    }

    /// Return a sorted list of all chunk IDs in the store.
    pub fn all_ids(&self) -> Vec<ChunkId> {
        let mut ids: Vec<ChunkId> = self.chunks().keys().copied().collect();
        ids.sort();
        ids
    }
}

impl Default for InMemoryChunkStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkStore for InMemoryChunkStore {
    fn read(&self, id: &ChunkId) -> StoreResult<Option<Bytes>> {
        self.check_online()?;
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.chunks().get(id).cloned())
    }

    fn write(&self, data: &[u8]) -> StoreResult<ChunkId> {
        self.check_online()?;
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        let id = self.chunk_id(data);
        // Content addressing: an existing entry already holds these bytes.
        self.chunks_mut()
            .entry(id)
            .or_insert_with(|| Bytes::copy_from_slice(data));
        Ok(id)
    }

    fn exists(&self, id: &ChunkId) -> StoreResult<bool> {
        self.check_online()?;
        Ok(self.chunks().contains_key(id))
    }
}

impl std::fmt::Debug for InMemoryChunkStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryChunkStore")
            .field("chunk_count", &self.len())
            .field("write_calls", &self.write_calls())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdx_crypto::ContentHasher;

    // -----------------------------------------------------------------------
    // Core read/write
    // -----------------------------------------------------------------------

    #[test]
    fn write_and_read_chunk() {
        let store = InMemoryChunkStore::new();
        let id = store.write(b"hello world").unwrap();
        assert!(!id.is_null());

        let read_back = store.read(&id).unwrap().expect("should exist");
        assert_eq!(&read_back[..], b"hello world");
    }

    #[test]
    fn id_is_domain_separated_hash() {
        let store = InMemoryChunkStore::new();
        let id = store.write(b"payload").unwrap();
        assert_eq!(id, ContentHasher::CHUNK.hash(b"payload"));
        assert_eq!(store.chunk_id(b"payload"), id);
    }

    #[test]
    fn read_missing_chunk_returns_none() {
        let store = InMemoryChunkStore::new();
        let id = ChunkId::from_bytes(b"missing");
        assert!(store.read(&id).unwrap().is_none());
    }

    #[test]
    fn retrieve_missing_chunk_is_not_found() {
        let store = InMemoryChunkStore::new();
        let id = ChunkId::from_bytes(b"missing");
        assert!(matches!(store.retrieve(&id), Err(StoreError::NotFound(m)) if m == id));
    }

    // -----------------------------------------------------------------------
    // Content-addressing correctness
    // -----------------------------------------------------------------------

    #[test]
    fn same_content_is_deduplicated() {
        let store = InMemoryChunkStore::new();
        let id1 = store.write(b"identical content").unwrap();
        let id2 = store.write(b"identical content").unwrap();
        assert_eq!(id1, id2);
        assert_eq!(store.len(), 1);
        assert_eq!(store.write_calls(), 2);
    }

    #[test]
    fn different_content_produces_different_ids() {
        let store = InMemoryChunkStore::new();
        let id1 = store.write(b"aaa").unwrap();
        let id2 = store.write(b"bbb").unwrap();
        assert_ne!(id1, id2);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn exists_tracks_writes_and_removals() {
        let store = InMemoryChunkStore::new();
        let id = store.write(b"present").unwrap();
        assert!(store.exists(&id).unwrap());
        assert!(store.remove(&id));
        assert!(!store.exists(&id).unwrap());
        assert!(!store.remove(&id));
    }

    // -----------------------------------------------------------------------
    // Batch operations
    // -----------------------------------------------------------------------

    #[test]
    fn write_batch_and_read_batch() {
        let store = InMemoryChunkStore::new();
        let chunks: Vec<&[u8]> = vec![&b"batch-1"[..], &b"batch-2"[..], &b"batch-3"[..]];
        let ids = store.write_batch(&chunks).unwrap();
        assert_eq!(ids.len(), 3);

        let mut wanted = ids.clone();
        wanted.push(ChunkId::from_bytes(b"missing"));
        let read_back = store.read_batch(&wanted).unwrap();
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(read_back[i].as_deref(), Some(*chunk));
        }
        assert!(read_back[3].is_none());
    }

    // -----------------------------------------------------------------------
    // Fault injection
    // -----------------------------------------------------------------------

    #[test]
    fn offline_store_reports_network_errors() {
        let store = InMemoryChunkStore::new();
        let id = store.write(b"data").unwrap();

        store.set_offline(true);
        assert!(matches!(store.read(&id), Err(StoreError::Network(_))));
        assert!(matches!(store.write(b"more"), Err(StoreError::Network(_))));
        assert!(matches!(store.exists(&id), Err(StoreError::Network(_))));

        store.set_offline(false);
        assert!(store.read(&id).unwrap().is_some());
    }

    #[test]
    fn corrupt_replaces_payload() {
        let store = InMemoryChunkStore::new();
        let id = store.write(b"good").unwrap();
        store.corrupt(&id, b"bad");
        assert_eq!(&store.read(&id).unwrap().unwrap()[..], b"bad");
    }

    // -----------------------------------------------------------------------
    // Utility methods
    // -----------------------------------------------------------------------

    #[test]
    fn len_total_bytes_and_clear() {
        let store = InMemoryChunkStore::new();
        assert!(store.is_empty());
        store.write(b"12345").unwrap();
        store.write(b"123456789").unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.total_bytes(), 14);

        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn all_ids_is_sorted() {
        let store = InMemoryChunkStore::new();
        for data in [&b"aaa"[..], &b"bbb"[..], &b"ccc"[..]] {
            store.write(data).unwrap();
        }
        let ids = store.all_ids();
        assert_eq!(ids.len(), 3);
        for w in ids.windows(2) {
            assert!(w[0] <= w[1]);
        }
    }

    #[test]
    fn concurrent_reads_are_safe() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(InMemoryChunkStore::new());
        let id = store.write(b"shared data").unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let chunk = store.read(&id).unwrap().unwrap();
                    assert_eq!(store.chunk_id(&chunk), id);
                })
            })
            .collect();

        for h in handles {
            h.join().expect("thread should not panic");
        }
    }

    #[test]
    fn debug_format() {
        let store = InMemoryChunkStore::new();
        store.write(b"x").unwrap();
        let debug = format!("{store:?}");
        assert!(debug.contains("InMemoryChunkStore"));
        assert!(debug.contains("chunk_count"));
    }
}
