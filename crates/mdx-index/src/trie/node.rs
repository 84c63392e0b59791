use mdx_crypto::DIGEST_BITS;
use mdx_types::ChunkId;

use crate::arena::NodeId;
use crate::codec::trie::FANOUT;

/// Deepest level a branch can sit at: level `L` consumes digest bits
/// `6L..6L+6`, so the digest runs out during this level.
pub(crate) const MAX_LEVEL: u16 = (DIGEST_BITS.div_ceil(6) - 1) as u16;

pub(crate) type Children = [Option<NodeId>; FANOUT];

#[derive(Clone, Debug)]
pub(crate) struct Branch {
    pub level: u16,
    pub children: Box<Children>,
}

impl Branch {
    pub fn empty(level: u16) -> Self {
        Self {
            level,
            children: Box::new([None; FANOUT]),
        }
    }

    /// Occupied slots other than `except`.
    pub fn others(&self, except: usize) -> Vec<NodeId> {
        self.children
            .iter()
            .enumerate()
            .filter(|&(i, _)| i != except)
            .filter_map(|(_, c)| *c)
            .collect()
    }
}

#[derive(Clone, Debug)]
pub(crate) struct Leaf {
    pub owner: ChunkId,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

#[derive(Clone, Debug)]
pub(crate) enum TrieNode {
    Branch(Branch),
    Leaf(Leaf),
}

impl TrieNode {
    #[track_caller]
    pub fn as_branch(&self) -> &Branch {
        match self {
            TrieNode::Branch(b) => b,
            TrieNode::Leaf(_) => panic!("expected a trie branch"),
        }
    }

    #[track_caller]
    pub fn as_branch_mut(&mut self) -> &mut Branch {
        match self {
            TrieNode::Branch(b) => b,
            TrieNode::Leaf(_) => panic!("expected a trie branch"),
        }
    }

    #[track_caller]
    pub fn as_leaf(&self) -> &Leaf {
        match self {
            TrieNode::Leaf(l) => l,
            TrieNode::Branch(_) => panic!("expected a trie leaf"),
        }
    }

    #[track_caller]
    pub fn as_leaf_mut(&mut self) -> &mut Leaf {
        match self {
            TrieNode::Leaf(l) => l,
            TrieNode::Branch(_) => panic!("expected a trie leaf"),
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, TrieNode::Leaf(_))
    }
}

/// Slot selected by `digest` at `level`: six bits starting at bit `6 * level`,
/// most significant first. Bits past the end of the digest read as zero.
pub(crate) fn slot_at(digest: &[u8; 32], level: u16) -> usize {
    let bit = level as usize * 6;
    let byte = bit / 8;
    let hi = digest.get(byte).copied().unwrap_or(0) as u16;
    let lo = digest.get(byte + 1).copied().unwrap_or(0) as u16;
    let window = (hi << 8) | lo;
    ((window >> (10 - bit % 8)) & 0x3f) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_walk_the_digest_six_bits_at_a_time() {
        let mut digest = [0u8; 32];
        // 101010 | 11 0011 | 0000...
        digest[0] = 0b1010_1011;
        digest[1] = 0b0011_0000;
        assert_eq!(slot_at(&digest, 0), 0b101010);
        assert_eq!(slot_at(&digest, 1), 0b110011);
        assert_eq!(slot_at(&digest, 2), 0);
    }

    #[test]
    fn last_level_pads_with_zeros() {
        assert_eq!(MAX_LEVEL, 42);
        let digest = [0xff; 32];
        assert_eq!(slot_at(&digest, MAX_LEVEL - 1), 63);
        // Bits 252..256 are ones, 256..258 do not exist.
        assert_eq!(slot_at(&digest, MAX_LEVEL), 0b111100);
    }

    #[test]
    fn others_skips_the_given_slot() {
        let mut branch = Branch::empty(0);
        assert!(branch.others(0).is_empty());
        let ids: Vec<NodeId> = {
            let mut arena: crate::arena::Arena<u8> = crate::arena::Arena::new();
            (0..2).map(|_| arena.alloc(crate::arena::Slot::fresh(0))).collect()
        };
        branch.children[3] = Some(ids[0]);
        branch.children[9] = Some(ids[1]);
        assert_eq!(branch.others(3), vec![ids[1]]);
        assert_eq!(branch.others(0).len(), 2);
    }
}
