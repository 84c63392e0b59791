//! B+tree node format.
//!
//! ```text
//! index node: 'X' | version u8 | child kind u8 ('X' | 'D') | n u32
//!             | n x child id (32 bytes) | (n - 1) x (len u32 | separator)
//! data node:  'D' | version u8 | count u32 | count x (klen u32 | key | vlen u32 | value)
//! ```
//!
//! Integers are little-endian. Sibling links are not part of the format, so
//! a leaf's id depends only on its own entries.

use bytes::BufMut;
use mdx_types::{ChunkId, CHUNK_ID_LEN};

use super::{CodecError, Reader};

/// Layout version written after the tag byte.
pub const FORMAT_VERSION: u8 = 1;

/// Kind of a B+tree node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    /// Branch holding separators and child ids.
    Index,
    /// Leaf holding key/value entries.
    Data,
}

impl NodeKind {
    /// Serialize to a tag byte.
    pub fn tag(self) -> u8 {
        match self {
            Self::Index => b'X',
            Self::Data => b'D',
        }
    }

    /// Parse a tag byte.
    pub fn from_tag(byte: u8) -> Option<Self> {
        match byte {
            b'X' => Some(Self::Index),
            b'D' => Some(Self::Data),
            _ => None,
        }
    }
}

/// A decoded B+tree chunk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BTreeChunk {
    Index {
        child_kind: NodeKind,
        children: Vec<ChunkId>,
        separators: Vec<Vec<u8>>,
    },
    Data {
        entries: Vec<(Vec<u8>, Vec<u8>)>,
    },
}

impl BTreeChunk {
    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Index { .. } => NodeKind::Index,
            Self::Data { .. } => NodeKind::Data,
        }
    }
}

/// Encode an index node. `separators` must hold one fewer element than
/// `children`.
pub fn encode_index(child_kind: NodeKind, children: &[ChunkId], separators: &[Vec<u8>]) -> Vec<u8> {
    debug_assert_eq!(separators.len() + 1, children.len());
    let keys_len: usize = separators.iter().map(|k| 4 + k.len()).sum();
    let mut buf = Vec::with_capacity(7 + children.len() * CHUNK_ID_LEN + keys_len);
    buf.put_u8(NodeKind::Index.tag());
    buf.put_u8(FORMAT_VERSION);
    buf.put_u8(child_kind.tag());
    buf.put_u32_le(children.len() as u32);
    for child in children {
        buf.put_slice(child.as_bytes());
    }
    for key in separators {
        buf.put_u32_le(key.len() as u32);
        buf.put_slice(key);
    }
    buf
}

/// Encode a data node from its entries in key order.
pub fn encode_data<'a, I>(entries: I) -> Vec<u8>
where
    I: ExactSizeIterator<Item = (&'a [u8], &'a [u8])>,
{
    let mut buf = Vec::with_capacity(6 + entries.len() * 16);
    buf.put_u8(NodeKind::Data.tag());
    buf.put_u8(FORMAT_VERSION);
    buf.put_u32_le(entries.len() as u32);
    for (key, value) in entries {
        buf.put_u32_le(key.len() as u32);
        buf.put_slice(key);
        buf.put_u32_le(value.len() as u32);
        buf.put_slice(value);
    }
    buf
}

/// Decode a B+tree chunk of either kind.
pub fn decode(data: &[u8]) -> Result<BTreeChunk, CodecError> {
    let mut r = Reader::new(data);
    let tag = r.u8()?;
    let kind = NodeKind::from_tag(tag).ok_or(CodecError::UnknownTag(tag as u64))?;
    let version = r.u8()?;
    if version != FORMAT_VERSION {
        return Err(CodecError::UnsupportedVersion(version as u16));
    }

    let chunk = match kind {
        NodeKind::Index => {
            let child_tag = r.u8()?;
            let child_kind =
                NodeKind::from_tag(child_tag).ok_or(CodecError::UnknownTag(child_tag as u64))?;
            let n = r.u32()? as usize;
            if n == 0 {
                return Err(CodecError::Malformed("index node without children".into()));
            }
            // Bound the allocation by what the payload can actually hold.
            let mut children = Vec::with_capacity(n.min(r.remaining() / CHUNK_ID_LEN));
            for _ in 0..n {
                children.push(r.chunk_id()?);
            }
            let mut separators = Vec::with_capacity(n - 1);
            for _ in 1..n {
                separators.push(r.bytes()?);
            }
            BTreeChunk::Index {
                child_kind,
                children,
                separators,
            }
        }
        NodeKind::Data => {
            let count = r.u32()? as usize;
            let mut entries = Vec::with_capacity(count.min(r.remaining() / 8));
            for _ in 0..count {
                let key = r.bytes()?;
                let value = r.bytes()?;
                entries.push((key, value));
            }
            BTreeChunk::Data { entries }
        }
    };
    r.finish()?;
    Ok(chunk)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(tag: &[u8]) -> ChunkId {
        ChunkId::from_bytes(tag)
    }

    #[test]
    fn data_node_layout() {
        let entries = [(&b"k"[..], &b"vv"[..])];
        let bytes = encode_data(entries.iter().copied());
        assert_eq!(
            bytes,
            vec![b'D', 1, 1, 0, 0, 0, 1, 0, 0, 0, b'k', 2, 0, 0, 0, b'v', b'v']
        );
        assert_eq!(
            decode(&bytes).unwrap(),
            BTreeChunk::Data {
                entries: vec![(b"k".to_vec(), b"vv".to_vec())]
            }
        );
    }

    #[test]
    fn index_node_decodes() {
        let children = [id(b"a"), id(b"b"), id(b"c")];
        let separators = [b"m".to_vec(), b"t".to_vec()];
        let bytes = encode_index(NodeKind::Data, &children, &separators);
        assert_eq!(&bytes[..3], &[b'X', 1, b'D']);

        match decode(&bytes).unwrap() {
            BTreeChunk::Index {
                child_kind,
                children: decoded,
                separators: keys,
            } => {
                assert_eq!(child_kind, NodeKind::Data);
                assert_eq!(decoded, children);
                assert_eq!(keys, separators);
            }
            other => panic!("expected index node, got {other:?}"),
        }
    }

    #[test]
    fn empty_data_node() {
        let bytes = encode_data(std::iter::empty());
        assert_eq!(decode(&bytes).unwrap(), BTreeChunk::Data { entries: vec![] });
    }

    #[test]
    fn rejects_unknown_tag_and_version() {
        assert_eq!(decode(b"Q\x01"), Err(CodecError::UnknownTag(b'Q' as u64)));
        assert_eq!(
            decode(&[b'D', 9, 0, 0, 0, 0]),
            Err(CodecError::UnsupportedVersion(9))
        );
    }

    #[test]
    fn rejects_truncated_and_trailing() {
        let bytes = encode_data([(&b"key"[..], &b"value"[..])].into_iter());
        assert!(matches!(
            decode(&bytes[..bytes.len() - 1]),
            Err(CodecError::Truncated { .. })
        ));

        let mut padded = bytes.clone();
        padded.push(0);
        assert_eq!(decode(&padded), Err(CodecError::TrailingBytes(1)));
    }

    #[test]
    fn rejects_childless_index() {
        let bytes = [b'X', 1, b'D', 0, 0, 0, 0];
        assert!(matches!(decode(&bytes), Err(CodecError::Malformed(_))));
    }

    #[test]
    fn huge_count_does_not_preallocate() {
        let bytes = [b'D', 1, 0xff, 0xff, 0xff, 0xff];
        assert!(matches!(decode(&bytes), Err(CodecError::Truncated { .. })));
    }
}
