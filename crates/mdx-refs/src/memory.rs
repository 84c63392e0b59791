//! In-memory root registry for testing and embedding.
//!
//! [`InMemoryRootRegistry`] stores registrations in a `BTreeMap` protected by
//! a `RwLock`. Data is lost when the registry is dropped.

use std::collections::BTreeMap;
use std::sync::RwLock;

use mdx_types::ChunkId;
use tracing::debug;

use crate::error::{RegistryError, Result};
use crate::names::validate_index_name;
use crate::traits::RootRegistry;

/// An in-memory implementation of [`RootRegistry`].
#[derive(Debug, Default)]
pub struct InMemoryRootRegistry {
    roots: RwLock<BTreeMap<String, ChunkId>>,
}

impl InMemoryRootRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned(e: impl std::fmt::Display) -> RegistryError {
    RegistryError::Backend(format!("lock poisoned: {e}"))
}

impl RootRegistry for InMemoryRootRegistry {
    fn read_root(&self, name: &str) -> Result<Option<ChunkId>> {
        let roots = self.roots.read().map_err(poisoned)?;
        Ok(roots.get(name).copied())
    }

    fn publish_root(&self, name: &str, root: ChunkId) -> Result<()> {
        validate_index_name(name)?;
        let mut roots = self.roots.write().map_err(poisoned)?;
        let previous = roots.insert(name.to_string(), root);
        debug!(
            index = name,
            root = %root.short_hex(),
            replaced = previous.is_some(),
            "root published"
        );
        Ok(())
    }

    fn remove_root(&self, name: &str) -> Result<bool> {
        let mut roots = self.roots.write().map_err(poisoned)?;
        Ok(roots.remove(name).is_some())
    }

    fn list_roots(&self, prefix: &str) -> Result<Vec<(String, ChunkId)>> {
        let roots = self.roots.read().map_err(poisoned)?;
        Ok(roots
            .range(prefix.to_string()..)
            .take_while(|(name, _)| name.starts_with(prefix))
            .map(|(name, root)| (name.clone(), *root))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(tag: &[u8]) -> ChunkId {
        ChunkId::from_bytes(tag)
    }

    #[test]
    fn unpublished_name_reads_none() {
        let reg = InMemoryRootRegistry::new();
        assert!(reg.read_root("orders").unwrap().is_none());
        assert!(matches!(
            reg.require_root("orders"),
            Err(RegistryError::NotFound { .. })
        ));
    }

    #[test]
    fn publish_then_read() {
        let reg = InMemoryRootRegistry::new();
        reg.publish_root("orders", id(b"v1")).unwrap();
        assert_eq!(reg.read_root("orders").unwrap(), Some(id(b"v1")));
        assert_eq!(reg.require_root("orders").unwrap(), id(b"v1"));
    }

    #[test]
    fn publish_overwrites_previous_root() {
        let reg = InMemoryRootRegistry::new();
        reg.publish_root("orders", id(b"v1")).unwrap();
        reg.publish_root("orders", id(b"v2")).unwrap();
        assert_eq!(reg.read_root("orders").unwrap(), Some(id(b"v2")));
    }

    #[test]
    fn publish_rejects_invalid_name() {
        let reg = InMemoryRootRegistry::new();
        let result = reg.publish_root("bad name", id(b"v1"));
        assert!(matches!(result, Err(RegistryError::InvalidName { .. })));
    }

    #[test]
    fn remove_root() {
        let reg = InMemoryRootRegistry::new();
        reg.publish_root("orders", id(b"v1")).unwrap();
        assert!(reg.remove_root("orders").unwrap());
        assert!(!reg.remove_root("orders").unwrap());
        assert!(reg.read_root("orders").unwrap().is_none());
    }

    #[test]
    fn list_roots_by_prefix_is_sorted() {
        let reg = InMemoryRootRegistry::new();
        reg.publish_root("shop/orders", id(b"a")).unwrap();
        reg.publish_root("shop/customers", id(b"b")).unwrap();
        reg.publish_root("audit/log", id(b"c")).unwrap();

        let shop = reg.list_roots("shop/").unwrap();
        let names: Vec<&str> = shop.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["shop/customers", "shop/orders"]);
        assert_eq!(reg.list_roots("").unwrap().len(), 3);
    }
}
