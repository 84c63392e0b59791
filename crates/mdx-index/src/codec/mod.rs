//! Chunk encodings for index nodes.
//!
//! B+tree nodes use a compact length-prefixed format ([`btree`]); hash-trie
//! nodes use a fixed 4096-byte block so any slot can be addressed without
//! parsing the rest of the chunk ([`trie`]). Both are deterministic: the same
//! node always encodes to the same bytes, which is what lets an unchanged
//! node keep its chunk id across commits.

pub mod btree;
pub mod trie;

use mdx_types::ChunkId;

use crate::error::IndexError;

/// A chunk payload that does not decode as the expected node.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("truncated: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    #[error("unknown node tag {0:#x}")]
    UnknownTag(u64),

    #[error("unsupported layout version {0}")]
    UnsupportedVersion(u16),

    #[error("{0} trailing bytes after node")]
    TrailingBytes(usize),

    #[error("{field} length {len} exceeds field width {max}")]
    FieldOverflow {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("malformed node: {0}")]
    Malformed(String),
}

impl CodecError {
    /// Attach the id of the offending chunk.
    pub(crate) fn in_chunk(self, id: ChunkId) -> IndexError {
        IndexError::CorruptChunk {
            id,
            reason: self.to_string(),
        }
    }
}

/// Cursor over a payload that reports truncation instead of panicking.
pub(crate) struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    fn need(&self, n: usize) -> Result<(), CodecError> {
        if self.buf.len() < n {
            return Err(CodecError::Truncated {
                needed: n,
                remaining: self.buf.len(),
            });
        }
        Ok(())
    }

    pub fn u8(&mut self) -> Result<u8, CodecError> {
        self.need(1)?;
        Ok(bytes::Buf::get_u8(&mut self.buf))
    }

    pub fn u32(&mut self) -> Result<u32, CodecError> {
        self.need(4)?;
        Ok(bytes::Buf::get_u32_le(&mut self.buf))
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        self.need(n)?;
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    pub fn chunk_id(&mut self) -> Result<ChunkId, CodecError> {
        let raw = self.take(mdx_types::CHUNK_ID_LEN)?;
        ChunkId::from_slice(raw).map_err(|e| CodecError::Malformed(e.to_string()))
    }

    /// A `u32`-length-prefixed byte string.
    pub fn bytes(&mut self) -> Result<Vec<u8>, CodecError> {
        let len = self.u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    pub fn finish(self) -> Result<(), CodecError> {
        match self.buf.len() {
            0 => Ok(()),
            n => Err(CodecError::TrailingBytes(n)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reader_reports_truncation() {
        let mut r = Reader::new(&[1, 2, 3]);
        assert_eq!(r.u8().unwrap(), 1);
        assert_eq!(
            r.u32(),
            Err(CodecError::Truncated {
                needed: 4,
                remaining: 2
            })
        );
        // A failed read consumes nothing.
        assert_eq!(r.remaining(), 2);
        assert_eq!(r.finish(), Err(CodecError::TrailingBytes(2)));
    }

    #[test]
    fn length_prefixed_bytes() {
        let mut r = Reader::new(&[3, 0, 0, 0, b'a', b'b', b'c']);
        assert_eq!(r.bytes().unwrap(), b"abc");
        r.finish().unwrap();
    }

    #[test]
    fn corrupt_chunk_carries_id_and_reason() {
        let id = ChunkId::from_bytes(b"bad");
        let err = CodecError::UnknownTag(0x51).in_chunk(id);
        assert!(err.is_missing_chunk());
        assert!(err.to_string().contains("unknown node tag 0x51"));
    }
}
