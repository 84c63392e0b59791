//! In-memory B+tree nodes.

use crate::arena::NodeId;
use crate::codec::btree::NodeKind;

/// A key/value pair held by a data node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Entry {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// Branch node. `keys[i]` separates `children[i]` from `children[i + 1]`:
/// every key below `children[i]` sorts before it, every key below
/// `children[i + 1]` at or after it.
#[derive(Clone, Debug)]
pub(crate) struct IndexNode {
    pub keys: Vec<Vec<u8>>,
    pub children: Vec<NodeId>,
    pub child_kind: NodeKind,
}

/// Leaf node with its neighbours in key order.
///
/// `prev`/`next` are in-memory links only. `None` means "not known yet",
/// not "no neighbour"; the tree resolves unknown links from the index path.
/// Links are kept pairwise: `a.next == Some(b)` exactly when `b.prev == Some(a)`.
#[derive(Clone, Debug, Default)]
pub(crate) struct DataNode {
    pub entries: Vec<Entry>,
    pub prev: Option<NodeId>,
    pub next: Option<NodeId>,
}

#[derive(Clone, Debug)]
pub(crate) enum Node {
    Index(IndexNode),
    Data(DataNode),
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Index(_) => NodeKind::Index,
            Node::Data(_) => NodeKind::Data,
        }
    }

    #[track_caller]
    pub fn as_index(&self) -> &IndexNode {
        match self {
            Node::Index(ix) => ix,
            Node::Data(_) => panic!("expected an index node"),
        }
    }

    #[track_caller]
    pub fn as_index_mut(&mut self) -> &mut IndexNode {
        match self {
            Node::Index(ix) => ix,
            Node::Data(_) => panic!("expected an index node"),
        }
    }

    #[track_caller]
    pub fn as_data(&self) -> &DataNode {
        match self {
            Node::Data(d) => d,
            Node::Index(_) => panic!("expected a data node"),
        }
    }

    #[track_caller]
    pub fn as_data_mut(&mut self) -> &mut DataNode {
        match self {
            Node::Data(d) => d,
            Node::Index(_) => panic!("expected a data node"),
        }
    }
}
