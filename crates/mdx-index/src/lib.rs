//! Content-addressed indexes for merkledex.
//!
//! Two persistent index structures whose nodes live as immutable chunks in
//! a [`ChunkStore`](mdx_store::ChunkStore), addressed by the hash of their
//! bytes. Committing a handle rewrites only the nodes on mutated paths, so
//! every committed root is a versioned snapshot sharing unchanged subtrees
//! with its predecessors.
//!
//! # Key Types
//!
//! - [`BTree`] -- Ordered index with range scans through a [`Cursor`]
//! - [`HashTrie`] -- Point index branching 64 ways on the key's digest
//! - [`IndexConfig`] -- Fanout and size limits, loadable from TOML
//! - [`IndexError`] -- Errors shared by both index types
//!
//! Both handles load nodes lazily, either commit after every mutation or
//! buffer mutations until [`BTree::flush_buffer`] / [`HashTrie::flush_buffer`],
//! and can be opened and published by name through a
//! [`RootRegistry`](mdx_refs::RootRegistry).

mod arena;
pub mod btree;
pub mod codec;
pub mod config;
pub mod error;
mod registry;
pub mod trie;

pub use btree::{lexicographic, BTree, Comparator, Cursor};
pub use codec::CodecError;
pub use config::{BTreeConfig, IndexConfig, TrieConfig};
pub use error::{IndexError, IndexResult};
pub use trie::HashTrie;
