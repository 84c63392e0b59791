//! Ordered iteration over a [`BTree`].
//!
//! A [`Cursor`] sits in a gap between two adjacent entries. [`Cursor::next`]
//! returns the entry after the gap and moves past it, [`Cursor::prev`] the
//! entry before it. The cursor does not borrow the tree; each step takes the
//! tree by `&mut` so it can hydrate leaves it walks into.
//!
//! When the tree's version has moved since the cursor last looked, the
//! cursor re-seeks to the gap next to the last key it reported before
//! continuing. Entries inserted or deleted around that point may be skipped
//! or seen twice relative to the old order; nothing is ever reported out of
//! order within one direction of travel.

use tracing::warn;

use super::BTree;
use crate::arena::NodeId;
use crate::error::IndexResult;

/// Where a cursor re-seeks to after the tree changed under it.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Anchor {
    Start,
    End,
    /// Gap before the first key `>= k`.
    AtOrAfter(Vec<u8>),
    /// Gap after `k`: before the first key `> k`.
    After(Vec<u8>),
}

/// Position in a [`BTree`] between two entries.
///
/// Once a cursor has reported the end of the sequence in either direction
/// it stays exhausted; start a new one with [`BTree::seek`].
#[derive(Clone, Debug)]
pub struct Cursor {
    leaf: NodeId,
    /// Gap index within `leaf`: entries `[..index]` lie before the gap.
    index: usize,
    anchor: Anchor,
    version: u64,
    exhausted: bool,
}

impl Cursor {
    /// Returns `true` once the cursor has run off either end.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Entry after the gap, advancing past it.
    pub fn next(&mut self, tree: &mut BTree) -> IndexResult<Option<(Vec<u8>, Vec<u8>)>> {
        if self.exhausted {
            return Ok(None);
        }
        self.resync(tree)?;
        loop {
            let leaf = tree.data(self.leaf);
            if let Some(e) = leaf.entries.get(self.index) {
                self.index += 1;
                self.anchor = Anchor::After(e.key.clone());
                return Ok(Some((e.key.clone(), e.value.clone())));
            }
            match tree.next_leaf(self.leaf)? {
                Some(next) => {
                    self.leaf = next;
                    self.index = 0;
                }
                None => {
                    self.exhausted = true;
                    return Ok(None);
                }
            }
        }
    }

    /// Entry before the gap, moving back over it.
    pub fn prev(&mut self, tree: &mut BTree) -> IndexResult<Option<(Vec<u8>, Vec<u8>)>> {
        if self.exhausted {
            return Ok(None);
        }
        self.resync(tree)?;
        loop {
            if self.index > 0 {
                let e = &tree.data(self.leaf).entries[self.index - 1];
                self.index -= 1;
                self.anchor = Anchor::AtOrAfter(e.key.clone());
                return Ok(Some((e.key.clone(), e.value.clone())));
            }
            match tree.prev_leaf(self.leaf)? {
                Some(prev) => {
                    self.leaf = prev;
                    self.index = tree.data(prev).entries.len();
                }
                None => {
                    self.exhausted = true;
                    return Ok(None);
                }
            }
        }
    }

    fn resync(&mut self, tree: &mut BTree) -> IndexResult<()> {
        if self.version == tree.version {
            return Ok(());
        }
        let (leaf, index) = tree.locate(&self.anchor)?;
        self.leaf = leaf;
        self.index = index;
        self.version = tree.version;
        Ok(())
    }
}

impl BTree {
    /// Position a cursor before the first entry `>= key`. The flag reports
    /// whether `key` itself is present.
    pub fn seek(&mut self, key: &[u8]) -> IndexResult<(Cursor, bool)> {
        let (_, leaf) = self.path_to(key)?;
        let (index, found) = match self.search(self.data(leaf), key) {
            Ok(i) => (i, true),
            Err(i) => (i, false),
        };
        Ok((
            self.cursor(leaf, index, Anchor::AtOrAfter(key.to_vec())),
            found,
        ))
    }

    /// Cursor before the smallest entry.
    pub fn seek_first(&mut self) -> IndexResult<Cursor> {
        let leaf = self.first_leaf()?;
        Ok(self.cursor(leaf, 0, Anchor::Start))
    }

    /// Cursor after the largest entry, for walking backwards.
    pub fn seek_last(&mut self) -> IndexResult<Cursor> {
        let leaf = self.last_leaf()?;
        let index = self.data(leaf).entries.len();
        Ok(self.cursor(leaf, index, Anchor::End))
    }

    fn cursor(&self, leaf: NodeId, index: usize, anchor: Anchor) -> Cursor {
        Cursor {
            leaf,
            index,
            anchor,
            version: self.version,
            exhausted: false,
        }
    }

    fn locate(&mut self, anchor: &Anchor) -> IndexResult<(NodeId, usize)> {
        match anchor {
            Anchor::Start => Ok((self.first_leaf()?, 0)),
            Anchor::End => {
                let leaf = self.last_leaf()?;
                Ok((leaf, self.data(leaf).entries.len()))
            }
            Anchor::AtOrAfter(key) => {
                let (_, leaf) = self.path_to(key)?;
                let index = self.search(self.data(leaf), key).unwrap_or_else(|i| i);
                Ok((leaf, index))
            }
            Anchor::After(key) => {
                let (_, leaf) = self.path_to(key)?;
                let index = match self.search(self.data(leaf), key) {
                    Ok(i) => i + 1,
                    Err(i) => i,
                };
                Ok((leaf, index))
            }
        }
    }

    // ---------------------------------------------------------------
    // Leaf chain
    // ---------------------------------------------------------------

    /// Right neighbour of `leaf` in key order, resolving the link from the
    /// index path the first time it is needed.
    pub(super) fn next_leaf(&mut self, leaf: NodeId) -> IndexResult<Option<NodeId>> {
        if let Some(next) = self.data(leaf).next {
            return Ok(Some(next));
        }
        if self.last_leaf == Some(leaf) {
            return Ok(None);
        }
        let Some(path) = self.path_of(leaf)? else {
            return Ok(None);
        };
        let Some(&(parent, i)) = path
            .iter()
            .rev()
            .find(|&&(parent, i)| i + 1 < self.index(parent).children.len())
        else {
            self.last_leaf = Some(leaf);
            return Ok(None);
        };
        let ix = self.index(parent);
        let (start, kind) = (ix.children[i + 1], ix.child_kind);
        let next = self.descend_edge(start, Some(kind), false)?;
        self.links_mut(leaf).next = Some(next);
        self.links_mut(next).prev = Some(leaf);
        Ok(Some(next))
    }

    /// Left neighbour of `leaf` in key order.
    pub(super) fn prev_leaf(&mut self, leaf: NodeId) -> IndexResult<Option<NodeId>> {
        if let Some(prev) = self.data(leaf).prev {
            return Ok(Some(prev));
        }
        if self.first_leaf == Some(leaf) {
            return Ok(None);
        }
        let Some(path) = self.path_of(leaf)? else {
            return Ok(None);
        };
        let Some(&(parent, i)) = path.iter().rev().find(|&&(_, i)| i > 0) else {
            self.first_leaf = Some(leaf);
            return Ok(None);
        };
        let ix = self.index(parent);
        let (start, kind) = (ix.children[i - 1], ix.child_kind);
        let prev = self.descend_edge(start, Some(kind), true)?;
        self.links_mut(leaf).prev = Some(prev);
        self.links_mut(prev).next = Some(leaf);
        Ok(Some(prev))
    }

    /// Index path down to `leaf`, found by routing its first key.
    fn path_of(&mut self, leaf: NodeId) -> IndexResult<Option<super::Path>> {
        let Some(first) = self.data(leaf).entries.first().map(|e| e.key.clone()) else {
            // Only an empty root leaf has no entries, and it has no neighbours.
            return Ok(None);
        };
        let (path, found) = self.path_to(&first)?;
        if found != leaf {
            warn!(
                leaf = ?leaf,
                routed = ?found,
                root = ?self.root_id(),
                "leaf is not reachable by its first key; treating it as unlinked"
            );
            return Ok(None);
        }
        Ok(Some(path))
    }
}
