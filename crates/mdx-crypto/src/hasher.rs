use mdx_types::ChunkId;

/// Number of bits in every digest produced by a [`ContentHasher`].
pub const DIGEST_BITS: usize = 256;

/// Domain-separated BLAKE3 content hasher.
///
/// Each hasher carries a domain tag (e.g., `"mdx-chunk-v1"`) that is prepended
/// to every hash computation. A chunk and a hash-trie key with identical bytes
/// therefore produce different digests.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for stored chunks. A chunk's id is `CHUNK.hash(payload)`.
    pub const CHUNK: Self = Self {
        domain: "mdx-chunk-v1",
    };
    /// Hasher for the keys of a hash trie. Slots are chosen from this digest.
    pub const TRIE_KEY: Self = Self {
        domain: "mdx-trie-key-v1",
    };

    /// Create a hasher with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// Hash raw bytes with domain separation.
    pub fn hash(&self, data: &[u8]) -> ChunkId {
        ChunkId::from_hash(self.digest(data))
    }

    /// Hash raw bytes with domain separation, returning the bare digest.
    pub fn digest(&self, data: &[u8]) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(data);
        *hasher.finalize().as_bytes()
    }

    /// Verify that data produces the expected chunk ID.
    pub fn verify(&self, data: &[u8], expected: &ChunkId) -> bool {
        self.hash(data) == *expected
    }

    /// The domain tag used by this hasher.
    pub fn domain(&self) -> &str {
        self.domain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        let data = b"hello world";
        assert_eq!(ContentHasher::CHUNK.hash(data), ContentHasher::CHUNK.hash(data));
    }

    #[test]
    fn different_domains_produce_different_hashes() {
        let data = b"same content";
        assert_ne!(
            ContentHasher::CHUNK.hash(data),
            ContentHasher::TRIE_KEY.hash(data)
        );
    }

    #[test]
    fn digest_matches_hash() {
        let data = b"digest";
        assert_eq!(
            &ContentHasher::TRIE_KEY.digest(data),
            ContentHasher::TRIE_KEY.hash(data).as_bytes()
        );
    }

    #[test]
    fn verify_correct_and_tampered_data() {
        let id = ContentHasher::CHUNK.hash(b"original");
        assert!(ContentHasher::CHUNK.verify(b"original", &id));
        assert!(!ContentHasher::CHUNK.verify(b"tampered", &id));
    }

    #[test]
    fn custom_domain() {
        let hasher = ContentHasher::new("my-custom-domain-v1");
        assert_eq!(hasher.domain(), "my-custom-domain-v1");
        assert_ne!(hasher.hash(b"data"), ContentHasher::CHUNK.hash(b"data"));
    }

    #[test]
    fn domain_hash_differs_from_plain_blake3() {
        let plain = ChunkId::from_bytes(b"test");
        assert_ne!(plain, ContentHasher::CHUNK.hash(b"test"));
    }
}
