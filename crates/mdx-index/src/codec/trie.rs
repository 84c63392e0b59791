//! Hash-trie node format: one fixed 4096-byte block per node.
//!
//! ```text
//! [0..8)      u64 discriminant: 1 = branch, 0 = leaf
//! [8..10)     u16 layout version
//! [10..12)    u16 level (branch), 0 (leaf)
//! [12..16)    reserved
//! branch:
//! [16..2064)  64 x 32-byte child ids, all-zero = empty slot
//! leaf:
//! [16..48)    owner id
//! [48..52)    u32 key length
//! [52..56)    u32 value length
//! [56..312)   key, zero padded
//! [312..4096) value, zero padded
//! ```
//!
//! Integers are little-endian.

use mdx_types::{ChunkId, CHUNK_ID_LEN};

use super::CodecError;

/// Size of every trie chunk.
pub const CHUNK_SIZE: usize = 4096;
/// Layout version stored at offset 8.
pub const LAYOUT_VERSION: u16 = 1;
/// Children per branch.
pub const FANOUT: usize = 64;

const KIND_LEAF: u64 = 0;
const KIND_BRANCH: u64 = 1;

const HEADER_LEN: usize = 16;
const SLOTS_OFFSET: usize = HEADER_LEN;
const OWNER_OFFSET: usize = HEADER_LEN;
const KEY_LEN_OFFSET: usize = OWNER_OFFSET + CHUNK_ID_LEN;
const VALUE_LEN_OFFSET: usize = KEY_LEN_OFFSET + 4;
const KEY_OFFSET: usize = VALUE_LEN_OFFSET + 4;

/// Width of the leaf key field.
pub const KEY_FIELD_LEN: usize = 256;
const VALUE_OFFSET: usize = KEY_OFFSET + KEY_FIELD_LEN;
/// Width of the leaf value field.
pub const VALUE_FIELD_LEN: usize = CHUNK_SIZE - VALUE_OFFSET;

/// Child slots of a branch.
pub type Slots = [Option<ChunkId>; FANOUT];

/// A decoded trie chunk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TrieChunk {
    Branch {
        level: u16,
        slots: Box<Slots>,
    },
    Leaf {
        owner: ChunkId,
        key: Vec<u8>,
        value: Vec<u8>,
    },
}

fn header(kind: u64, level: u16) -> Vec<u8> {
    let mut block = vec![0u8; CHUNK_SIZE];
    block[0..8].copy_from_slice(&kind.to_le_bytes());
    block[8..10].copy_from_slice(&LAYOUT_VERSION.to_le_bytes());
    block[10..12].copy_from_slice(&level.to_le_bytes());
    block
}

/// Encode a branch at `level`.
pub fn encode_branch(level: u16, slots: &Slots) -> Vec<u8> {
    let mut block = header(KIND_BRANCH, level);
    for (i, slot) in slots.iter().enumerate() {
        if let Some(id) = slot {
            let at = SLOTS_OFFSET + i * CHUNK_ID_LEN;
            block[at..at + CHUNK_ID_LEN].copy_from_slice(id.as_bytes());
        }
    }
    block
}

/// Encode a leaf. Fails if the key or value does not fit its field.
pub fn encode_leaf(owner: &ChunkId, key: &[u8], value: &[u8]) -> Result<Vec<u8>, CodecError> {
    check_field("key", key.len(), KEY_FIELD_LEN)?;
    check_field("value", value.len(), VALUE_FIELD_LEN)?;

    let mut block = header(KIND_LEAF, 0);
    block[OWNER_OFFSET..KEY_LEN_OFFSET].copy_from_slice(owner.as_bytes());
    block[KEY_LEN_OFFSET..VALUE_LEN_OFFSET].copy_from_slice(&(key.len() as u32).to_le_bytes());
    block[VALUE_LEN_OFFSET..KEY_OFFSET].copy_from_slice(&(value.len() as u32).to_le_bytes());
    block[KEY_OFFSET..KEY_OFFSET + key.len()].copy_from_slice(key);
    block[VALUE_OFFSET..VALUE_OFFSET + value.len()].copy_from_slice(value);
    Ok(block)
}

fn check_field(field: &'static str, len: usize, max: usize) -> Result<(), CodecError> {
    if len > max {
        return Err(CodecError::FieldOverflow { field, len, max });
    }
    Ok(())
}

fn le_u16(block: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([block[at], block[at + 1]])
}

fn le_u32(block: &[u8], at: usize) -> usize {
    u32::from_le_bytes([block[at], block[at + 1], block[at + 2], block[at + 3]]) as usize
}

/// Decode a trie chunk. The block must be exactly [`CHUNK_SIZE`] bytes.
pub fn decode(block: &[u8]) -> Result<TrieChunk, CodecError> {
    if block.len() < CHUNK_SIZE {
        return Err(CodecError::Truncated {
            needed: CHUNK_SIZE,
            remaining: block.len(),
        });
    }
    if block.len() > CHUNK_SIZE {
        return Err(CodecError::TrailingBytes(block.len() - CHUNK_SIZE));
    }

    let mut kind = [0u8; 8];
    kind.copy_from_slice(&block[0..8]);
    let kind = u64::from_le_bytes(kind);
    let version = le_u16(block, 8);
    if version != LAYOUT_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }
    let level = le_u16(block, 10);

    match kind {
        KIND_BRANCH => {
            let mut slots: Box<Slots> = Box::new([None; FANOUT]);
            for (i, slot) in slots.iter_mut().enumerate() {
                let at = SLOTS_OFFSET + i * CHUNK_ID_LEN;
                let id = ChunkId::from_slice(&block[at..at + CHUNK_ID_LEN])
                    .map_err(|e| CodecError::Malformed(e.to_string()))?;
                if !id.is_null() {
                    *slot = Some(id);
                }
            }
            Ok(TrieChunk::Branch { level, slots })
        }
        KIND_LEAF => {
            let owner = ChunkId::from_slice(&block[OWNER_OFFSET..KEY_LEN_OFFSET])
                .map_err(|e| CodecError::Malformed(e.to_string()))?;
            let key_len = le_u32(block, KEY_LEN_OFFSET);
            let value_len = le_u32(block, VALUE_LEN_OFFSET);
            check_field("key", key_len, KEY_FIELD_LEN)?;
            check_field("value", value_len, VALUE_FIELD_LEN)?;
            Ok(TrieChunk::Leaf {
                owner,
                key: block[KEY_OFFSET..KEY_OFFSET + key_len].to_vec(),
                value: block[VALUE_OFFSET..VALUE_OFFSET + value_len].to_vec(),
            })
        }
        other => Err(CodecError::UnknownTag(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_widths_fill_the_block() {
        assert_eq!(KEY_OFFSET, 56);
        assert_eq!(VALUE_OFFSET, 312);
        assert_eq!(VALUE_FIELD_LEN, 3784);
        assert_eq!(SLOTS_OFFSET + FANOUT * CHUNK_ID_LEN, 2064);
    }

    #[test]
    fn branch_layout() {
        let mut slots: Slots = [None; FANOUT];
        let child = ChunkId::from_bytes(b"child");
        slots[5] = Some(child);

        let block = encode_branch(3, &slots);
        assert_eq!(block.len(), CHUNK_SIZE);
        assert_eq!(&block[0..8], &1u64.to_le_bytes());
        assert_eq!(&block[8..10], &1u16.to_le_bytes());
        assert_eq!(&block[10..12], &3u16.to_le_bytes());
        let at = SLOTS_OFFSET + 5 * CHUNK_ID_LEN;
        assert_eq!(&block[at..at + CHUNK_ID_LEN], child.as_bytes());

        match decode(&block).unwrap() {
            TrieChunk::Branch { level, slots: decoded } => {
                assert_eq!(level, 3);
                assert_eq!(*decoded, slots);
            }
            other => panic!("expected branch, got {other:?}"),
        }
    }

    #[test]
    fn leaf_layout() {
        let owner = ChunkId::from_bytes(b"table");
        let block = encode_leaf(&owner, b"alice", b"engineer").unwrap();
        assert_eq!(block.len(), CHUNK_SIZE);
        assert_eq!(&block[0..8], &[0u8; 8]);
        assert_eq!(&block[KEY_OFFSET..KEY_OFFSET + 5], b"alice");
        assert_eq!(block[KEY_OFFSET + 5], 0);
        assert_eq!(&block[VALUE_OFFSET..VALUE_OFFSET + 8], b"engineer");

        assert_eq!(
            decode(&block).unwrap(),
            TrieChunk::Leaf {
                owner,
                key: b"alice".to_vec(),
                value: b"engineer".to_vec(),
            }
        );
    }

    #[test]
    fn oversized_fields_are_rejected() {
        let owner = ChunkId::null();
        let long_key = vec![1u8; KEY_FIELD_LEN + 1];
        assert!(matches!(
            encode_leaf(&owner, &long_key, b""),
            Err(CodecError::FieldOverflow { field: "key", .. })
        ));
        let long_value = vec![1u8; VALUE_FIELD_LEN + 1];
        assert!(matches!(
            encode_leaf(&owner, b"k", &long_value),
            Err(CodecError::FieldOverflow { field: "value", .. })
        ));
        // Exactly full fields fit.
        let full = encode_leaf(&owner, &[7u8; KEY_FIELD_LEN], &[9u8; VALUE_FIELD_LEN]).unwrap();
        assert!(decode(&full).is_ok());
    }

    #[test]
    fn decode_rejects_bad_blocks() {
        let owner = ChunkId::null();
        let block = encode_leaf(&owner, b"k", b"v").unwrap();

        assert!(matches!(
            decode(&block[..100]),
            Err(CodecError::Truncated { .. })
        ));

        let mut wrong_kind = block.clone();
        wrong_kind[0] = 7;
        assert_eq!(decode(&wrong_kind), Err(CodecError::UnknownTag(7)));

        let mut wrong_version = block.clone();
        wrong_version[8] = 2;
        assert_eq!(decode(&wrong_version), Err(CodecError::UnsupportedVersion(2)));

        let mut bad_len = block;
        bad_len[KEY_LEN_OFFSET..VALUE_LEN_OFFSET].copy_from_slice(&1000u32.to_le_bytes());
        assert!(matches!(
            decode(&bad_len),
            Err(CodecError::FieldOverflow { field: "key", .. })
        ));
    }
}
