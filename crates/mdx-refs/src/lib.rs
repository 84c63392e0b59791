//! Root registry for merkledex.
//!
//! Committing an index produces a new root chunk id; nothing inside the index
//! remembers it. The registry is the collaborator that maps a stable index
//! name (for example `orders/by_customer`) to the root id most recently
//! published for it, so a later process can reopen the same version.
//!
//! Registries are injected into the index layer; there is no process-wide
//! registry.
//!
//! # Modules
//!
//! - [`error`] -- Error types for registry operations
//! - [`traits`] -- The [`RootRegistry`] trait
//! - [`names`] -- Index name validation
//! - [`memory`] -- In-memory [`InMemoryRootRegistry`]

pub mod error;
pub mod memory;
pub mod names;
pub mod traits;

pub use error::{RegistryError, Result};
pub use memory::InMemoryRootRegistry;
pub use names::validate_index_name;
pub use traits::RootRegistry;
