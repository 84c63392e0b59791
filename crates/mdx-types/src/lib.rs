//! Foundation types for merkledex.
//!
//! Every node of every merkledex index is persisted as an immutable chunk
//! addressed by the digest of its content. This crate holds the identifier
//! type shared by the store, the registry, and the index structures.
//!
//! # Key Types
//!
//! - [`ChunkId`] -- Content-addressed chunk identifier (BLAKE3 digest)
//! - [`TypeError`] -- Parse failures for identifiers

pub mod chunk;
pub mod error;

pub use chunk::{ChunkId, CHUNK_ID_LEN};
pub use error::TypeError;
