//! Hashing primitives for merkledex.
//!
//! Provides domain-separated BLAKE3 hashing. Chunk identifiers and hash-trie
//! key digests use distinct domains so a key can never masquerade as a node.
//!
//! All crypto operations wrap established libraries; there is no custom cryptography.

pub mod hasher;

pub use hasher::{ContentHasher, DIGEST_BITS};
