//! Content-addressed chunk storage for merkledex.
//!
//! A chunk store is a hash-keyed blob store: every chunk is immutable and is
//! identified by the domain-separated BLAKE3 digest of its bytes
//! ([`ContentHasher::CHUNK`](mdx_crypto::ContentHasher::CHUNK)). Index nodes
//! are written here and refer to each other only by chunk id.
//!
//! # Storage Backends
//!
//! All backends implement the [`ChunkStore`] trait:
//!
//! - [`InMemoryChunkStore`] -- `HashMap`-based store for tests and embedding,
//!   with write accounting and an offline switch for fault injection
//! - [`FsChunkStore`] -- one file per chunk in a fan-out directory tree
//!
//! # Design Rules
//!
//! 1. Chunks are immutable once written (content-addressing guarantees this).
//! 2. Writes are idempotent: writing existing content is a no-op.
//! 3. Concurrent reads are always safe.
//! 4. The store never interprets chunk contents.
//! 5. The store never retries; retry policy belongs to the caller.

pub mod error;
pub mod fs;
pub mod memory;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use fs::FsChunkStore;
pub use memory::InMemoryChunkStore;
pub use traits::ChunkStore;
