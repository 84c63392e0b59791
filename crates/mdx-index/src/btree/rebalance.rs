//! Splits, borrows and merges.
//!
//! Callers hydrate every node these functions touch beforehand, so nothing
//! here performs I/O or can fail.

use tracing::debug;

use super::node::{DataNode, IndexNode, Node};
use super::{BTree, Path};
use crate::arena::{NodeId, Slot};
use crate::error::IndexResult;

impl BTree {
    // ---------------------------------------------------------------
    // Insertion overflow
    // ---------------------------------------------------------------

    /// Split the overfull `leaf` and push separators up `path`, splitting
    /// index nodes as they overflow. A root split adds one level.
    pub(super) fn split_upward(&mut self, mut path: Path, leaf: NodeId) {
        let (mut sep, mut right) = self.split_data(leaf);
        let mut left = leaf;

        let max_children = self.config.max_children();
        while let Some((parent, i)) = path.pop() {
            let ix = self.index_mut(parent);
            ix.keys.insert(i, sep);
            ix.children.insert(i + 1, right);
            if ix.children.len() <= max_children {
                return;
            }
            (sep, right) = self.split_index(parent);
            left = parent;
        }

        let child_kind = self.node(left).kind();
        self.root = self.arena.alloc(Slot::fresh(Node::Index(IndexNode {
            keys: vec![sep],
            children: vec![left, right],
            child_kind,
        })));
        debug!(kind = ?child_kind, "root split, tree grew one level");
    }

    /// Move the upper half of `leaf` into a new right sibling. Returns the
    /// separator (the sibling's first key) and the sibling.
    fn split_data(&mut self, leaf: NodeId) -> (Vec<u8>, NodeId) {
        let node = self.data_mut(leaf);
        let upper = node.entries.split_off(node.entries.len() / 2);
        let old_next = node.next;
        let sep = upper[0].key.clone();

        let right = self.arena.alloc(Slot::fresh(Node::Data(DataNode {
            entries: upper,
            prev: Some(leaf),
            next: old_next,
        })));
        self.links_mut(leaf).next = Some(right);
        if let Some(next) = old_next {
            self.links_mut(next).prev = Some(right);
        }
        if self.last_leaf == Some(leaf) {
            self.last_leaf = Some(right);
        }
        debug!(
            left = self.data(leaf).entries.len(),
            right = self.data(right).entries.len(),
            "data node split"
        );
        (sep, right)
    }

    /// Split an index node holding `2 * order_kx + 2` children: `order_kx + 1`
    /// stay, the middle separator moves up, the rest go right.
    fn split_index(&mut self, id: NodeId) -> (Vec<u8>, NodeId) {
        let kx = self.config.order_kx;
        let ix = self.index_mut(id);
        let keys = ix.keys.split_off(kx + 1);
        let sep = ix.keys.remove(kx);
        let children = ix.children.split_off(kx + 1);
        let child_kind = ix.child_kind;

        let right = self.arena.alloc(Slot::fresh(Node::Index(IndexNode {
            keys,
            children,
            child_kind,
        })));
        debug!(children = self.index(right).children.len(), "index node split");
        (sep, right)
    }

    // ---------------------------------------------------------------
    // Deletion underflow
    // ---------------------------------------------------------------

    fn underfull(&self, id: NodeId) -> bool {
        match self.node(id) {
            Node::Data(d) => d.entries.len() < self.config.order_kd,
            Node::Index(ix) => ix.children.len() < self.config.order_kx + 1,
        }
    }

    fn can_lend(&self, id: NodeId) -> bool {
        match self.node(id) {
            Node::Data(d) => d.entries.len() > self.config.order_kd,
            Node::Index(ix) => ix.children.len() > self.config.order_kx + 1,
        }
    }

    /// Hydrate the siblings that removing one entry from `leaf` could
    /// borrow from or merge with, level by level, as far up as the
    /// underflow can reach.
    pub(super) fn prepare_rebalance(&mut self, path: &Path, leaf: NodeId) -> IndexResult<()> {
        let mut short = self.data(leaf).entries.len() <= self.config.order_kd;
        for &(parent, i) in path.iter().rev() {
            if !short {
                break;
            }
            let ix = self.index(parent);
            let kind = ix.child_kind;
            let left = i.checked_sub(1).map(|j| ix.children[j]);
            let right = ix.children.get(i + 1).copied();
            for sibling in left.into_iter().chain(right) {
                self.hydrate(sibling, Some(kind))?;
            }
            short = self.index(parent).children.len() <= self.config.order_kx + 1;
        }
        Ok(())
    }

    /// Restore the minimum occupancy on the way back up from `child`, then
    /// drop index roots left with a single child.
    pub(super) fn rebalance_upward(&mut self, mut path: Path, mut child: NodeId) {
        while let Some((parent, i)) = path.pop() {
            if !self.underfull(child) {
                break;
            }
            self.fix_underflow(parent, i);
            child = parent;
        }
        self.collapse_root();
    }

    fn fix_underflow(&mut self, parent: NodeId, i: usize) {
        let ix = self.index(parent);
        let left = i.checked_sub(1).map(|j| ix.children[j]);
        let right = ix.children.get(i + 1).copied();

        match (left, right) {
            (Some(l), _) if self.can_lend(l) => self.borrow_from_left(parent, i),
            (_, Some(r)) if self.can_lend(r) => self.borrow_from_right(parent, i),
            (Some(_), _) => self.merge(parent, i - 1),
            (None, Some(_)) => self.merge(parent, i),
            (None, None) => {}
        }
    }

    fn borrow_from_left(&mut self, parent: NodeId, i: usize) {
        let ix = self.index(parent);
        let (left, child) = (ix.children[i - 1], ix.children[i]);

        if matches!(self.node(child), Node::Data(_)) {
            let Some(moved) = self.data_mut(left).entries.pop() else {
                return;
            };
            self.index_mut(parent).keys[i - 1] = moved.key.clone();
            self.data_mut(child).entries.insert(0, moved);
        } else {
            let lender = self.index_mut(left);
            let (Some(key), Some(grandchild)) = (lender.keys.pop(), lender.children.pop()) else {
                return;
            };
            let down = std::mem::replace(&mut self.index_mut(parent).keys[i - 1], key);
            let node = self.index_mut(child);
            node.keys.insert(0, down);
            node.children.insert(0, grandchild);
        }
    }

    fn borrow_from_right(&mut self, parent: NodeId, i: usize) {
        let ix = self.index(parent);
        let (child, right) = (ix.children[i], ix.children[i + 1]);

        if matches!(self.node(child), Node::Data(_)) {
            let lender = self.data_mut(right);
            if lender.entries.len() < 2 {
                return;
            }
            let moved = lender.entries.remove(0);
            let sep = lender.entries[0].key.clone();
            self.data_mut(child).entries.push(moved);
            self.index_mut(parent).keys[i] = sep;
        } else {
            let lender = self.index_mut(right);
            if lender.keys.is_empty() {
                return;
            }
            let key = lender.keys.remove(0);
            let grandchild = lender.children.remove(0);
            let down = std::mem::replace(&mut self.index_mut(parent).keys[i], key);
            let node = self.index_mut(child);
            node.keys.push(down);
            node.children.push(grandchild);
        }
    }

    /// Fold `children[j + 1]` into `children[j]` and drop the separator
    /// between them.
    fn merge(&mut self, parent: NodeId, j: usize) {
        let ix = self.index_mut(parent);
        let sep = ix.keys.remove(j);
        let right = ix.children.remove(j + 1);
        let left = ix.children[j];

        let Some(Slot::Loaded(absorbed)) = self.arena.release(right) else {
            return;
        };
        match absorbed.node {
            Node::Data(d) => {
                let node = self.data_mut(left);
                node.entries.extend(d.entries);
                node.next = d.next;
                if let Some(next) = d.next {
                    self.links_mut(next).prev = Some(left);
                }
                if self.last_leaf == Some(right) {
                    self.last_leaf = Some(left);
                }
                debug!(entries = self.data(left).entries.len(), "data nodes merged");
            }
            Node::Index(x) => {
                let node = self.index_mut(left);
                node.keys.push(sep);
                node.keys.extend(x.keys);
                node.children.extend(x.children);
                debug!(children = node.children.len(), "index nodes merged");
            }
        }
    }

    fn collapse_root(&mut self) {
        loop {
            let only = match self.node(self.root) {
                Node::Index(ix) if ix.children.len() == 1 => ix.children[0],
                _ => return,
            };
            let old = self.root;
            self.root = only;
            self.arena.release(old);
            debug!("root collapsed, tree shrank one level");
        }
    }
}
