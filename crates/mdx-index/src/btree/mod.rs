//! Copy-on-write B+tree over a [`ChunkStore`].
//!
//! A [`BTree`] handle owns an arena of nodes. Opening a tree by root id loads
//! nothing; nodes are read from the store the first time an operation walks
//! through them. Mutations only touch the in-memory nodes on the affected
//! path and mark them dirty. A commit walks the dirty part of the tree
//! bottom-up, re-encodes each dirty node and writes the chunks whose id
//! changed. Everything else keeps its id, so two committed versions of a tree
//! share every subtree the mutations did not reach.

mod cursor;
mod node;
mod rebalance;


use std::cmp::Ordering;
use std::fmt::{self, Write as _};
use std::sync::Arc;

use mdx_store::ChunkStore;
use mdx_types::ChunkId;
use tracing::{debug, trace, warn};

use crate::arena::{Arena, NodeId, Slot};
use crate::codec::btree::{self as codec, BTreeChunk, NodeKind};
use crate::codec::CodecError;
use crate::config::BTreeConfig;
use crate::error::{IndexError, IndexResult};

pub use cursor::Cursor;
use node::{DataNode, Entry, IndexNode, Node};

/// Total order over encoded keys.
pub type Comparator = fn(&[u8], &[u8]) -> Ordering;

/// Plain byte-wise ordering, the default comparator.
pub fn lexicographic(a: &[u8], b: &[u8]) -> Ordering {
    a.cmp(b)
}

/// Index path from the root: each index node visited and the child taken.
type Path = Vec<(NodeId, usize)>;

#[derive(Clone, Copy, PartialEq, Eq)]
enum PutMode {
    Upsert,
    Insert,
    Update,
}

/// Ordered index over byte-string keys.
///
/// Operations take `&mut self` because any of them may hydrate nodes. A
/// handle is single-writer; share it behind a lock if several callers need
/// it.
pub struct BTree {
    store: Arc<dyn ChunkStore>,
    config: BTreeConfig,
    compare: Comparator,
    arena: Arena<Node>,
    root: NodeId,
    /// Leftmost leaf, once known. Merges always absorb the right node, so
    /// this never goes stale.
    first_leaf: Option<NodeId>,
    last_leaf: Option<NodeId>,
    /// Bumped on every insertion of a new key and every deletion.
    version: u64,
    buffering: bool,
    last_commit_writes: usize,
}

impl fmt::Debug for BTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BTree")
            .field("root", &self.root_id())
            .field("version", &self.version)
            .field("resident_nodes", &self.arena.resident())
            .field("buffering", &self.buffering)
            .finish()
    }
}

impl BTree {
    /// Open a tree with byte-wise key order.
    ///
    /// With `root: None` the tree starts empty. Otherwise the root chunk is
    /// read lazily by the first operation that needs it.
    pub fn open(
        store: Arc<dyn ChunkStore>,
        config: BTreeConfig,
        root: Option<ChunkId>,
    ) -> IndexResult<Self> {
        Self::with_comparator(store, config, root, lexicographic)
    }

    /// Open a tree ordered by `compare`. A tree must always be reopened with
    /// the comparator it was built with.
    pub fn with_comparator(
        store: Arc<dyn ChunkStore>,
        config: BTreeConfig,
        root: Option<ChunkId>,
        compare: Comparator,
    ) -> IndexResult<Self> {
        config.validate()?;
        let mut arena = Arena::new();
        let root = match root {
            Some(id) => arena.alloc(Slot::Unloaded(id)),
            None => arena.alloc(Slot::fresh(Node::Data(DataNode::default()))),
        };
        Ok(Self {
            store,
            config,
            compare,
            arena,
            root,
            first_leaf: None,
            last_leaf: None,
            version: 0,
            buffering: false,
            last_commit_writes: 0,
        })
    }

    pub fn config(&self) -> &BTreeConfig {
        &self.config
    }

    /// Id of the committed root, or `None` while uncommitted changes exist.
    pub fn root_id(&self) -> Option<ChunkId> {
        match self.arena.slot(self.root) {
            Slot::Unloaded(id) => Some(*id),
            Slot::Loaded(r) if !r.dirty => r.digest,
            Slot::Loaded(_) => None,
        }
    }

    /// Returns `true` if some mutation has not been committed yet.
    pub fn is_dirty(&self) -> bool {
        self.root_id().is_none()
    }

    /// Structural version, bumped whenever a key is added or removed.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Number of chunks written by the most recent commit.
    pub fn last_commit_writes(&self) -> usize {
        self.last_commit_writes
    }

    // ---------------------------------------------------------------
    // Node access
    // ---------------------------------------------------------------

    fn node(&self, id: NodeId) -> &Node {
        self.arena.node(id)
    }

    fn index(&self, id: NodeId) -> &IndexNode {
        self.arena.node(id).as_index()
    }

    fn index_mut(&mut self, id: NodeId) -> &mut IndexNode {
        self.arena.node_mut(id).as_index_mut()
    }

    fn data(&self, id: NodeId) -> &DataNode {
        self.arena.node(id).as_data()
    }

    fn data_mut(&mut self, id: NodeId) -> &mut DataNode {
        self.arena.node_mut(id).as_data_mut()
    }

    /// Leaf access for link maintenance; does not dirty the node.
    fn links_mut(&mut self, id: NodeId) -> &mut DataNode {
        self.arena.node_mut_clean(id).as_data_mut()
    }

    /// Read `id` from the store if it is still a placeholder.
    ///
    /// On failure the slot stays unloaded, so the operation can be retried.
    fn hydrate(&mut self, id: NodeId, expect: Option<NodeKind>) -> IndexResult<()> {
        let digest = match self.arena.slot(id) {
            Slot::Loaded(_) => return Ok(()),
            Slot::Unloaded(digest) => *digest,
        };
        let bytes = self.store.retrieve(&digest)?;
        let chunk = codec::decode(&bytes).map_err(|e| e.in_chunk(digest))?;
        if let Some(expected) = expect {
            if chunk.kind() != expected {
                return Err(CodecError::Malformed(format!(
                    "expected {expected:?} node, found {:?}",
                    chunk.kind()
                ))
                .in_chunk(digest));
            }
        }

        let node = match chunk {
            BTreeChunk::Index {
                child_kind,
                children,
                separators,
            } => {
                if children.len() > self.config.max_children() {
                    warn!(
                        chunk = %digest.short_hex(),
                        children = children.len(),
                        "index node exceeds configured fanout"
                    );
                }
                let children = children
                    .into_iter()
                    .map(|c| self.arena.alloc(Slot::Unloaded(c)))
                    .collect();
                Node::Index(IndexNode {
                    keys: separators,
                    children,
                    child_kind,
                })
            }
            BTreeChunk::Data { entries } => {
                if entries.len() > self.config.max_entries() {
                    warn!(
                        chunk = %digest.short_hex(),
                        entries = entries.len(),
                        "data node exceeds configured capacity"
                    );
                }
                Node::Data(DataNode {
                    entries: entries
                        .into_iter()
                        .map(|(key, value)| Entry { key, value })
                        .collect(),
                    prev: None,
                    next: None,
                })
            }
        };
        trace!(chunk = %digest.short_hex(), kind = ?node.kind(), "node hydrated");
        *self.arena.slot_mut(id) = Slot::clean(node, digest);
        Ok(())
    }

    /// Number of separators at or below `key`: the child to descend into.
    /// A key equal to a separator routes right.
    fn route(&self, keys: &[Vec<u8>], key: &[u8]) -> usize {
        keys.partition_point(|sep| (self.compare)(sep, key) != Ordering::Greater)
    }

    fn search(&self, leaf: &DataNode, key: &[u8]) -> Result<usize, usize> {
        leaf.entries
            .binary_search_by(|e| (self.compare)(&e.key, key))
    }

    /// Walk from the root to the leaf responsible for `key`, hydrating as
    /// needed.
    fn path_to(&mut self, key: &[u8]) -> IndexResult<(Path, NodeId)> {
        let mut path = Vec::new();
        let mut id = self.root;
        self.hydrate(id, None)?;
        loop {
            let (child, kind) = match self.node(id) {
                Node::Data(_) => return Ok((path, id)),
                Node::Index(ix) => {
                    let i = self.route(&ix.keys, key);
                    path.push((id, i));
                    (ix.children[i], ix.child_kind)
                }
            };
            self.hydrate(child, Some(kind))?;
            id = child;
        }
    }

    /// Follow the leftmost (or rightmost) edge down from `id` to a leaf.
    fn descend_edge(
        &mut self,
        mut id: NodeId,
        kind: Option<NodeKind>,
        rightmost: bool,
    ) -> IndexResult<NodeId> {
        self.hydrate(id, kind)?;
        loop {
            let (child, kind) = match self.node(id) {
                Node::Data(_) => return Ok(id),
                Node::Index(ix) => {
                    let child = if rightmost {
                        ix.children[ix.children.len() - 1]
                    } else {
                        ix.children[0]
                    };
                    (child, ix.child_kind)
                }
            };
            self.hydrate(child, Some(kind))?;
            id = child;
        }
    }

    fn first_leaf(&mut self) -> IndexResult<NodeId> {
        if let Some(leaf) = self.first_leaf {
            return Ok(leaf);
        }
        let leaf = self.descend_edge(self.root, None, false)?;
        self.first_leaf = Some(leaf);
        Ok(leaf)
    }

    fn last_leaf(&mut self) -> IndexResult<NodeId> {
        if let Some(leaf) = self.last_leaf {
            return Ok(leaf);
        }
        let leaf = self.descend_edge(self.root, None, true)?;
        self.last_leaf = Some(leaf);
        Ok(leaf)
    }

    /// Mark every index node on `path` dirty: their encodings embed the ids
    /// of the children below.
    fn dirty_path(&mut self, path: &Path) {
        for &(id, _) in path {
            self.arena.mark_dirty(id);
        }
    }

    fn check_sizes(&self, key: &[u8], value: &[u8]) -> IndexResult<()> {
        if key.len() > self.config.max_key_size {
            return Err(IndexError::KeySize {
                size: key.len(),
                max: self.config.max_key_size,
            });
        }
        if value.len() > self.config.max_value_size {
            return Err(IndexError::ValueSize {
                size: value.len(),
                max: self.config.max_value_size,
            });
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------

    /// Look up `key`. Absence is `Ok(None)`, not an error.
    pub fn get(&mut self, key: &[u8]) -> IndexResult<Option<Vec<u8>>> {
        let (_, leaf) = self.path_to(key)?;
        let node = self.data(leaf);
        Ok(self
            .search(node, key)
            .ok()
            .map(|i| node.entries[i].value.clone()))
    }

    pub fn contains_key(&mut self, key: &[u8]) -> IndexResult<bool> {
        let (_, leaf) = self.path_to(key)?;
        Ok(self.search(self.data(leaf), key).is_ok())
    }

    /// Smallest entry, if any.
    pub fn first(&mut self) -> IndexResult<Option<(Vec<u8>, Vec<u8>)>> {
        let leaf = self.first_leaf()?;
        Ok(self
            .data(leaf)
            .entries
            .first()
            .map(|e| (e.key.clone(), e.value.clone())))
    }

    /// Largest entry, if any.
    pub fn last(&mut self) -> IndexResult<Option<(Vec<u8>, Vec<u8>)>> {
        let leaf = self.last_leaf()?;
        Ok(self
            .data(leaf)
            .entries
            .last()
            .map(|e| (e.key.clone(), e.value.clone())))
    }

    /// Number of levels, counting the leaves. An empty tree has height 1.
    pub fn height(&mut self) -> IndexResult<usize> {
        let mut height = 1;
        let mut id = self.root;
        self.hydrate(id, None)?;
        loop {
            let (child, kind) = match self.node(id) {
                Node::Data(_) => return Ok(height),
                Node::Index(ix) => (ix.children[0], ix.child_kind),
            };
            self.hydrate(child, Some(kind))?;
            id = child;
            height += 1;
        }
    }

    // ---------------------------------------------------------------
    // Mutations
    // ---------------------------------------------------------------

    /// Insert `key`, or replace its value if present.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> IndexResult<()> {
        self.upsert(key, value, PutMode::Upsert)
    }

    /// Insert `key`; fails with [`IndexError::DuplicateKey`] if present,
    /// leaving the stored value alone.
    pub fn insert(&mut self, key: &[u8], value: &[u8]) -> IndexResult<()> {
        self.upsert(key, value, PutMode::Insert)
    }

    /// Replace the value of an existing key; fails with
    /// [`IndexError::KeyNotFound`] if absent.
    pub fn update(&mut self, key: &[u8], value: &[u8]) -> IndexResult<()> {
        self.upsert(key, value, PutMode::Update)
    }

    fn upsert(&mut self, key: &[u8], value: &[u8], mode: PutMode) -> IndexResult<()> {
        self.check_sizes(key, value)?;
        let (path, leaf) = self.path_to(key)?;
        match self.search(self.data(leaf), key) {
            Ok(_) if mode == PutMode::Insert => Err(IndexError::DuplicateKey),
            Ok(i) => self.apply(|tree| {
                tree.data_mut(leaf).entries[i].value = value.to_vec();
                tree.dirty_path(&path);
            }),
            Err(_) if mode == PutMode::Update => Err(IndexError::KeyNotFound),
            Err(i) => self.apply(|tree| {
                tree.data_mut(leaf).entries.insert(
                    i,
                    Entry {
                        key: key.to_vec(),
                        value: value.to_vec(),
                    },
                );
                tree.dirty_path(&path);
                tree.version += 1;
                if tree.data(leaf).entries.len() > tree.config.max_entries() {
                    tree.split_upward(path, leaf);
                }
            }),
        }
    }

    /// Remove `key`; fails with [`IndexError::KeyNotFound`] if absent.
    ///
    /// Every node the rebalancing could touch is read before anything is
    /// modified, so a store failure leaves the tree as it was.
    pub fn delete(&mut self, key: &[u8]) -> IndexResult<()> {
        let (path, leaf) = self.path_to(key)?;
        let i = self
            .search(self.data(leaf), key)
            .map_err(|_| IndexError::KeyNotFound)?;
        self.prepare_rebalance(&path, leaf)?;

        self.apply(|tree| {
            tree.data_mut(leaf).entries.remove(i);
            tree.dirty_path(&path);
            tree.version += 1;
            tree.rebalance_upward(path, leaf);
        })
    }

    // ---------------------------------------------------------------
    // Buffer / commit
    // ---------------------------------------------------------------

    /// Stop committing after every mutation. Idempotent.
    pub fn start_buffer(&mut self) {
        self.buffering = true;
    }

    pub fn is_buffering(&self) -> bool {
        self.buffering
    }

    /// Run one mutation. Outside a buffer it is committed straight away,
    /// and undone if that commit fails.
    fn apply(&mut self, mutate: impl FnOnce(&mut Self)) -> IndexResult<()> {
        if self.buffering {
            mutate(self);
            return Ok(());
        }

        let saved = (self.root, self.first_leaf, self.last_leaf, self.version);
        self.arena.begin_journal();
        mutate(self);
        match self.commit() {
            Ok(_) => {
                self.arena.end_journal();
                Ok(())
            }
            Err(err) => {
                self.arena.rollback();
                (self.root, self.first_leaf, self.last_leaf, self.version) = saved;
                debug!(error = %err, "write-through commit failed; mutation undone");
                Err(err)
            }
        }
    }

    /// Persist every dirty node and return the root id.
    ///
    /// Nodes are written children first. A node whose encoding hashes to
    /// its previous id is not written again. If the store fails midway, the
    /// nodes already written stay committed and a later call picks up the
    /// rest.
    pub fn commit(&mut self) -> IndexResult<ChunkId> {
        let mut writes = 0;
        let result = self.commit_node(self.root, &mut writes);
        self.last_commit_writes = writes;
        let root = result?;
        debug!(root = %root.short_hex(), writes, "btree committed");
        Ok(root)
    }

    fn commit_node(&mut self, id: NodeId, writes: &mut usize) -> IndexResult<ChunkId> {
        let previous = match self.arena.slot(id) {
            Slot::Unloaded(digest) => return Ok(*digest),
            Slot::Loaded(r) => match (r.dirty, r.digest) {
                (false, Some(digest)) => return Ok(digest),
                (_, digest) => digest,
            },
        };

        let children = match self.node(id) {
            Node::Index(ix) => ix.children.clone(),
            Node::Data(_) => Vec::new(),
        };
        let mut child_ids = Vec::with_capacity(children.len());
        for child in children {
            child_ids.push(self.commit_node(child, writes)?);
        }

        let bytes = match self.node(id) {
            Node::Index(ix) => codec::encode_index(ix.child_kind, &child_ids, &ix.keys),
            Node::Data(d) => codec::encode_data(
                d.entries
                    .iter()
                    .map(|e| (e.key.as_slice(), e.value.as_slice())),
            ),
        };
        let mut digest = self.store.chunk_id(&bytes);
        if previous != Some(digest) {
            digest = self.store.write(&bytes)?;
            *writes += 1;
        }

        if let Slot::Loaded(r) = self.arena.slot_mut(id) {
            r.digest = Some(digest);
            r.dirty = false;
        }
        Ok(digest)
    }

    /// Commit and leave buffer mode.
    pub fn flush_buffer(&mut self) -> IndexResult<ChunkId> {
        let root = self.commit()?;
        self.buffering = false;
        Ok(root)
    }

    /// Commit any pending changes and release the in-memory nodes.
    pub fn close(mut self) -> IndexResult<ChunkId> {
        let root = self.commit()?;
        self.arena.clear();
        Ok(root)
    }

    // ---------------------------------------------------------------
    // Debug dump
    // ---------------------------------------------------------------

    /// Render the resident part of the tree, one node per line. Nodes not
    /// read yet are shown by id only; nothing is loaded.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        self.dump_node(self.root, 0, &mut out);
        out
    }

    fn dump_node(&self, id: NodeId, depth: usize, out: &mut String) {
        let pad = "  ".repeat(depth);
        let resident = match self.arena.slot(id) {
            Slot::Unloaded(digest) => {
                let _ = writeln!(out, "{pad}~ {} (not loaded)", digest.short_hex());
                return;
            }
            Slot::Loaded(r) => r,
        };
        let state = match (resident.dirty, resident.digest) {
            (true, _) | (false, None) => "dirty".to_string(),
            (false, Some(digest)) => digest.short_hex(),
        };
        match &resident.node {
            Node::Index(ix) => {
                let keys: Vec<String> = ix.keys.iter().map(|k| render_key(k)).collect();
                let _ = writeln!(out, "{pad}X {state} [{}]", keys.join(" | "));
                for &child in &ix.children {
                    self.dump_node(child, depth + 1, out);
                }
            }
            Node::Data(d) => {
                let cells: Vec<String> = d
                    .entries
                    .iter()
                    .map(|e| format!("{}={}", render_key(&e.key), render_key(&e.value)))
                    .collect();
                let _ = writeln!(out, "{pad}D {state} {}", cells.join(" "));
            }
        }
    }
}

/// Printable ASCII as-is, anything else as hex.
pub(crate) fn render_key(bytes: &[u8]) -> String {
    if bytes.iter().all(|b| b.is_ascii_graphic()) {
        String::from_utf8_lossy(bytes).into_owned()
    } else {
        format!("0x{}", hex::encode(bytes))
    }
}
