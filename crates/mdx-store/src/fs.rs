//! Filesystem-backed chunk store.
//!
//! Layout mirrors git's loose objects: a chunk with id `abcdef…` lives at
//! `<root>/ab/cdef…`. Writes go to a uniquely named temporary file in the
//! fan-out directory and are renamed into place, so a reader never observes
//! a partial chunk. A failed write removes its temporary file.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use mdx_types::ChunkId;
use tempfile::NamedTempFile;
use tracing::trace;

use crate::error::{StoreError, StoreResult};
use crate::traits::ChunkStore;

/// Chunk store keeping one file per chunk below a root directory.
#[derive(Debug, Clone)]
pub struct FsChunkStore {
    root: PathBuf,
    read_only: bool,
}

impl FsChunkStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            read_only: false,
        })
    }

    /// Open an existing store that rejects writes.
    pub fn open_read_only(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(StoreError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("chunk directory {} does not exist", root.display()),
            )));
        }
        Ok(Self {
            root,
            read_only: true,
        })
    }

    /// The directory holding the chunks.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, id: &ChunkId) -> PathBuf {
        let hex = id.to_hex();
        self.root.join(&hex[..2]).join(&hex[2..])
    }
}

impl ChunkStore for FsChunkStore {
    fn read(&self, id: &ChunkId) -> StoreResult<Option<Bytes>> {
        let data = match fs::read(self.path_for(id)) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let computed = self.chunk_id(&data);
        if computed != *id {
            return Err(StoreError::HashMismatch { id: *id, computed });
        }
        Ok(Some(Bytes::from(data)))
    }

    fn write(&self, data: &[u8]) -> StoreResult<ChunkId> {
        if self.read_only {
            return Err(StoreError::ReadOnly);
        }
        let id = self.chunk_id(data);
        let path = self.path_for(&id);
        if path.exists() {
            return Ok(id);
        }
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        fs::create_dir_all(&dir)?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| e.error)?;
        trace!(chunk = %id.short_hex(), len = data.len(), "chunk written");
        Ok(id)
    }

    fn exists(&self, id: &ChunkId) -> StoreResult<bool> {
        Ok(self.path_for(id).is_file())
    }
}
