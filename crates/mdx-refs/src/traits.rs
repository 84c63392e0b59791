//! The [`RootRegistry`] trait defining the registry interface.

use mdx_types::ChunkId;

use crate::error::Result;

/// Storage backend mapping index names to published root ids.
///
/// Implementations must be thread-safe (`Send + Sync`). Publication is a plain
/// overwrite: the index layer assumes a single writer per name.
pub trait RootRegistry: Send + Sync {
    /// Read the root currently published under `name`.
    ///
    /// Returns `Ok(None)` if nothing has been published.
    fn read_root(&self, name: &str) -> Result<Option<ChunkId>>;

    /// Publish `root` under `name`, replacing any previous root.
    fn publish_root(&self, name: &str, root: ChunkId) -> Result<()>;

    /// Forget `name`. Returns `Ok(true)` if it was registered.
    fn remove_root(&self, name: &str) -> Result<bool>;

    /// List all registrations whose name starts with `prefix`, sorted by name.
    fn list_roots(&self, prefix: &str) -> Result<Vec<(String, ChunkId)>>;

    /// Read the root published under `name`, failing if there is none.
    fn require_root(&self, name: &str) -> Result<ChunkId> {
        self.read_root(name)?
            .ok_or_else(|| crate::error::RegistryError::NotFound {
                name: name.to_string(),
            })
    }
}
