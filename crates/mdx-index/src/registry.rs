//! Opening and publishing indexes by name through a [`RootRegistry`].
//!
//! The index handles only know root ids. These helpers pair them with an
//! injected registry so a caller can work with stable names instead.

use std::sync::Arc;

use mdx_refs::{validate_index_name, RootRegistry};
use mdx_store::ChunkStore;
use mdx_types::ChunkId;
use tracing::info;

use crate::btree::BTree;
use crate::config::{BTreeConfig, TrieConfig};
use crate::error::IndexResult;
use crate::trie::HashTrie;

impl BTree {
    /// Open the tree last published under `name`, or an empty tree if the
    /// name is unregistered.
    pub fn open_named(
        store: Arc<dyn ChunkStore>,
        registry: &dyn RootRegistry,
        name: &str,
        config: BTreeConfig,
    ) -> IndexResult<Self> {
        validate_index_name(name)?;
        let root = registry.read_root(name)?;
        Self::open(store, config, root)
    }

    /// Flush pending changes and publish the resulting root under `name`.
    pub fn publish(&mut self, registry: &dyn RootRegistry, name: &str) -> IndexResult<ChunkId> {
        validate_index_name(name)?;
        let root = self.flush_buffer()?;
        registry.publish_root(name, root)?;
        info!(index = name, root = %root.short_hex(), "btree published");
        Ok(root)
    }
}

impl HashTrie {
    /// Open the trie last published under `name`, or an empty trie if the
    /// name is unregistered.
    pub fn open_named(
        store: Arc<dyn ChunkStore>,
        registry: &dyn RootRegistry,
        name: &str,
        config: TrieConfig,
    ) -> IndexResult<Self> {
        validate_index_name(name)?;
        let root = registry.read_root(name)?;
        Self::open(store, config, root)
    }

    /// Flush pending changes and publish the resulting root under `name`.
    pub fn publish(&mut self, registry: &dyn RootRegistry, name: &str) -> IndexResult<ChunkId> {
        validate_index_name(name)?;
        let root = self.flush_buffer()?;
        registry.publish_root(name, root)?;
        info!(index = name, root = %root.short_hex(), "trie published");
        Ok(root)
    }
}
