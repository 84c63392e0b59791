//! 64-way hash trie over a [`ChunkStore`].
//!
//! Keys are placed by their [`ContentHasher::TRIE_KEY`] digest: a branch at
//! level `L` picks one of 64 children with digest bits `6L..6L+6`. A slot
//! holds either a leaf (the original key, its value and an owner id) or a
//! deeper branch. A branch below the root only exists while at least two
//! keys share its prefix: inserting into a slot held by a different key
//! promotes that slot to a branch, and deleting down to a single leaf
//! collapses the branch again. The root is always a level-0 branch.
//!
//! Every node is one fixed-size chunk (see [`crate::codec::trie`]).
//! Persistence follows the same lazy-load and dirty/commit cycle as
//! [`BTree`](crate::BTree).

mod node;


use std::fmt::{self, Write as _};
use std::sync::Arc;

use mdx_crypto::ContentHasher;
use mdx_store::ChunkStore;
use mdx_types::ChunkId;
use tracing::{debug, trace};

use crate::arena::{Arena, NodeId, Slot};
use crate::btree::render_key;
use crate::codec::trie::{self as codec, TrieChunk};
use crate::codec::CodecError;
use crate::config::TrieConfig;
use crate::error::{IndexError, IndexResult};

use node::{slot_at, Branch, Leaf, TrieNode, MAX_LEVEL};

type Digest = [u8; 32];

#[derive(Clone, Copy, PartialEq, Eq)]
enum PutMode {
    Upsert,
    Insert,
    Update,
}

/// Where a descent towards a digest stopped.
struct Descent {
    /// Branches visited and the slot taken in each, ending with `bottom`.
    path: Vec<(NodeId, usize)>,
    /// The deepest branch reached and the digest's slot in it.
    bottom: (NodeId, usize),
    /// The leaf in that slot, if it is occupied.
    found: Option<NodeId>,
}

/// How a put changes the slot it lands in.
enum Placement {
    /// The slot is empty.
    Fill,
    /// The slot holds this leaf with the same key.
    Replace(NodeId),
    /// The slot holds this leaf with a different key, which must move down
    /// to the given level.
    Promote(NodeId, u16),
}

/// What a collapse step left behind in the parent's slot.
#[derive(Clone, Copy)]
enum Vacated {
    /// The slot is now empty.
    Removed,
    /// The slot now holds this leaf.
    Replaced(NodeId),
}

/// Point index over byte-string keys.
pub struct HashTrie {
    store: Arc<dyn ChunkStore>,
    config: TrieConfig,
    owner: ChunkId,
    arena: Arena<TrieNode>,
    root: NodeId,
    buffering: bool,
    last_commit_writes: usize,
}

impl fmt::Debug for HashTrie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashTrie")
            .field("root", &self.root_id())
            .field("owner", &self.owner)
            .field("resident_nodes", &self.arena.resident())
            .field("buffering", &self.buffering)
            .finish()
    }
}

impl HashTrie {
    /// Open a trie, empty when `root` is `None`. The root chunk is read on
    /// first use.
    pub fn open(
        store: Arc<dyn ChunkStore>,
        config: TrieConfig,
        root: Option<ChunkId>,
    ) -> IndexResult<Self> {
        config.validate()?;
        let mut arena = Arena::new();
        let root = match root {
            Some(id) => arena.alloc(Slot::Unloaded(id)),
            None => arena.alloc(Slot::fresh(TrieNode::Branch(Branch::empty(0)))),
        };
        Ok(Self {
            store,
            config,
            owner: ChunkId::null(),
            arena,
            root,
            buffering: false,
            last_commit_writes: 0,
        })
    }

    /// Stamp `owner` into every leaf this handle creates from now on.
    pub fn with_owner(mut self, owner: ChunkId) -> Self {
        self.owner = owner;
        self
    }

    pub fn owner(&self) -> ChunkId {
        self.owner
    }

    /// Id of the committed root, or `None` while uncommitted changes exist.
    pub fn root_id(&self) -> Option<ChunkId> {
        match self.arena.slot(self.root) {
            Slot::Unloaded(id) => Some(*id),
            Slot::Loaded(r) if !r.dirty => r.digest,
            Slot::Loaded(_) => None,
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.root_id().is_none()
    }

    /// Number of chunks written by the most recent commit.
    pub fn last_commit_writes(&self) -> usize {
        self.last_commit_writes
    }

    fn node(&self, id: NodeId) -> &TrieNode {
        self.arena.node(id)
    }

    fn branch(&self, id: NodeId) -> &Branch {
        self.arena.node(id).as_branch()
    }

    fn branch_mut(&mut self, id: NodeId) -> &mut Branch {
        self.arena.node_mut(id).as_branch_mut()
    }

    /// Read `id`, which sits at `level`, if it is still a placeholder.
    fn hydrate(&mut self, id: NodeId, level: u16) -> IndexResult<()> {
        let digest = match self.arena.slot(id) {
            Slot::Loaded(_) => return Ok(()),
            Slot::Unloaded(digest) => *digest,
        };
        let bytes = self.store.retrieve(&digest)?;
        let chunk = codec::decode(&bytes).map_err(|e| e.in_chunk(digest))?;
        let node = match chunk {
            TrieChunk::Branch { level: found, .. } if found != level => {
                return Err(CodecError::Malformed(format!(
                    "branch at level {level} claims level {found}"
                ))
                .in_chunk(digest));
            }
            TrieChunk::Leaf { .. } if level == 0 => {
                return Err(CodecError::Malformed("trie root is a leaf".into()).in_chunk(digest));
            }
            TrieChunk::Branch { level, slots } => {
                let mut children = Box::new([None; codec::FANOUT]);
                for (child, slot) in children.iter_mut().zip(slots.iter()) {
                    if let Some(id) = slot {
                        *child = Some(self.arena.alloc(Slot::Unloaded(*id)));
                    }
                }
                TrieNode::Branch(Branch { level, children })
            }
            TrieChunk::Leaf { owner, key, value } => TrieNode::Leaf(Leaf { owner, key, value }),
        };
        trace!(chunk = %digest.short_hex(), level, leaf = node.is_leaf(), "trie node hydrated");
        *self.arena.slot_mut(id) = Slot::clean(node, digest);
        Ok(())
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

    /// Descend towards `digest` until an empty slot or a leaf.
    fn descend(&mut self, digest: &Digest) -> IndexResult<Descent> {
        let mut path = Vec::new();
        let mut id = self.root;
        self.hydrate(id, 0)?;
        loop {
            let branch = self.branch(id);
            let level = branch.level;
            let slot = slot_at(digest, level);
            let child = branch.children[slot];
            path.push((id, slot));
            let found = match child {
                None => None,
                Some(child) => {
                    self.hydrate(child, level + 1)?;
                    if !self.node(child).is_leaf() {
                        id = child;
                        continue;
                    }
                    Some(child)
                }
            };
            return Ok(Descent {
                path,
                bottom: (id, slot),
                found,
            });
        }
    }

    /// The leaf holding exactly `key`, if any.
    fn find(&mut self, key: &[u8]) -> IndexResult<Option<(Vec<(NodeId, usize)>, NodeId)>> {
        let digest = ContentHasher::TRIE_KEY.digest(key);
        let Descent { path, found, .. } = self.descend(&digest)?;
        // Reaching a leaf only proves a shared digest prefix.
        Ok(found
            .filter(|&leaf| self.node(leaf).as_leaf().key == key)
            .map(|leaf| (path, leaf)))
    }

    // ---------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------

    pub fn get(&mut self, key: &[u8]) -> IndexResult<Option<Vec<u8>>> {
        let found = self.find(key)?;
        Ok(found.map(|(_, leaf)| self.node(leaf).as_leaf().value.clone()))
    }

    pub fn contains_key(&mut self, key: &[u8]) -> IndexResult<bool> {
        Ok(self.find(key)?.is_some())
    }

    // ---------------------------------------------------------------
    // Mutations
    // ---------------------------------------------------------------

    /// Insert `key`, or replace its value if present.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> IndexResult<()> {
        self.put_with(key, value, PutMode::Upsert)
    }

    /// Insert `key`; fails with [`IndexError::DuplicateKey`] if present.
    pub fn insert(&mut self, key: &[u8], value: &[u8]) -> IndexResult<()> {
        self.put_with(key, value, PutMode::Insert)
    }

    /// Replace the value of `key`; fails with [`IndexError::KeyNotFound`]
    /// if absent.
    pub fn update(&mut self, key: &[u8], value: &[u8]) -> IndexResult<()> {
        self.put_with(key, value, PutMode::Update)
    }

    fn put_with(&mut self, key: &[u8], value: &[u8], mode: PutMode) -> IndexResult<()> {
        self.check_sizes(key, value)?;
        let digest = ContentHasher::TRIE_KEY.digest(key);
        let Descent {
            path,
            bottom: (parent, slot),
            found,
        } = self.descend(&digest)?;

        let placement = match found {
            None if mode == PutMode::Update => return Err(IndexError::KeyNotFound),
            None => Placement::Fill,
            Some(existing) => {
                let same_key = self.node(existing).as_leaf().key == key;
                match (same_key, mode) {
                    (true, PutMode::Insert) => return Err(IndexError::DuplicateKey),
                    (false, PutMode::Update) => return Err(IndexError::KeyNotFound),
                    (true, _) => Placement::Replace(existing),
                    (false, _) => {
                        let bottom = self.split_level(parent, existing, &digest)?;
                        Placement::Promote(existing, bottom)
                    }
                }
            }
        };

        self.apply(|trie| {
            match placement {
                Placement::Fill => {
                    let leaf = trie.new_leaf(key, value);
                    trie.branch_mut(parent).children[slot] = Some(leaf);
                }
                Placement::Replace(existing) => {
                    trie.arena.node_mut(existing).as_leaf_mut().value = value.to_vec();
                }
                Placement::Promote(existing, bottom) => {
                    let leaf = trie.new_leaf(key, value);
                    trie.promote(parent, slot, existing, leaf, &digest, bottom);
                }
            }
            trie.dirty_path(&path);
            Ok(())
        })
    }

    fn new_leaf(&mut self, key: &[u8], value: &[u8]) -> NodeId {
        self.arena.alloc(Slot::fresh(TrieNode::Leaf(Leaf {
            owner: self.owner,
            key: key.to_vec(),
            value: value.to_vec(),
        })))
    }

    fn dirty_path(&mut self, path: &[(NodeId, usize)]) {
        for &(id, _) in path {
            self.arena.mark_dirty(id);
        }
    }

    /// First level below `parent` at which the digests of `existing` and
    /// `digest` pick different slots.
    fn split_level(&self, parent: NodeId, existing: NodeId, digest: &Digest) -> IndexResult<u16> {
        let other = ContentHasher::TRIE_KEY.digest(&self.node(existing).as_leaf().key);
        let mut level = self.branch(parent).level + 1;
        while slot_at(&other, level) == slot_at(digest, level) {
            if level >= MAX_LEVEL {
                return Err(IndexError::DigestExhausted(MAX_LEVEL as usize + 1));
            }
            level += 1;
        }
        Ok(level)
    }

    /// Replace the leaf `existing` in `parent[slot]` with a chain of
    /// branches ending at level `bottom`, where it sits beside `leaf`. The
    /// existing leaf is moved, not rewritten, so its chunk id is unchanged.
    fn promote(
        &mut self,
        parent: NodeId,
        slot: usize,
        existing: NodeId,
        leaf: NodeId,
        digest: &Digest,
        bottom: u16,
    ) {
        let other = ContentHasher::TRIE_KEY.digest(&self.node(existing).as_leaf().key);
        let top = self.branch(parent).level + 1;

        let mut branch = Branch::empty(bottom);
        branch.children[slot_at(&other, bottom)] = Some(existing);
        branch.children[slot_at(digest, bottom)] = Some(leaf);
        let mut node = self.arena.alloc(Slot::fresh(TrieNode::Branch(branch)));

        for level in (top..bottom).rev() {
            let mut branch = Branch::empty(level);
            branch.children[slot_at(digest, level)] = Some(node);
            node = self.arena.alloc(Slot::fresh(TrieNode::Branch(branch)));
        }
        self.branch_mut(parent).children[slot] = Some(node);
        debug!(from = top, to = bottom, "trie slot promoted to branch");
    }

    /// Remove `key`; fails with [`IndexError::KeyNotFound`] if absent.
    ///
    /// Collapsing may need to read the sibling that is left behind; that
    /// read happens before anything is modified.
    pub fn delete(&mut self, key: &[u8]) -> IndexResult<()> {
        let (path, leaf) = self.find(key)?.ok_or(IndexError::KeyNotFound)?;
        self.collapse_upward(&path, false)?;

        self.apply(|trie| {
            trie.dirty_path(&path);
            trie.arena.release(leaf);
            trie.collapse_upward(&path, true)
        })
    }

    /// Walk `path` bottom-up after its last slot lost its leaf, collapsing
    /// non-root branches left empty or holding a single leaf. With
    /// `apply == false` only the nodes the collapse needs are read.
    fn collapse_upward(&mut self, path: &[(NodeId, usize)], apply: bool) -> IndexResult<()> {
        let mut vacated = Vacated::Removed;
        for (depth, &(branch, slot)) in path.iter().enumerate().rev() {
            if apply {
                self.branch_mut(branch).children[slot] = match vacated {
                    Vacated::Removed => None,
                    Vacated::Replaced(leaf) => Some(leaf),
                };
            }
            if depth == 0 {
                break;
            }
            let level = self.branch(branch).level;
            let others = self.branch(branch).others(slot);
            vacated = match (vacated, others.as_slice()) {
                (vacated, []) => vacated,
                (Vacated::Removed, &[only]) => {
                    self.hydrate(only, level + 1)?;
                    if !self.node(only).is_leaf() {
                        break;
                    }
                    Vacated::Replaced(only)
                }
                _ => break,
            };
            if apply {
                self.arena.release(branch);
                debug!(level, "trie branch collapsed");
            }
        }
        Ok(())
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
    /// and undone if it or the commit fails.
    fn apply(&mut self, mutate: impl FnOnce(&mut Self) -> IndexResult<()>) -> IndexResult<()> {
        if self.buffering {
            return mutate(self);
        }

        self.arena.begin_journal();
        let result = mutate(self).and_then(|()| self.commit().map(|_| ()));
        match &result {
            Ok(()) => self.arena.end_journal(),
            Err(err) => {
                self.arena.rollback();
                debug!(error = %err, "write-through mutation failed; undone");
            }
        }
        result
    }

    /// Persist every dirty node, children first, skipping nodes whose
    /// encoding still hashes to their previous id. Returns the root id.
    pub fn commit(&mut self) -> IndexResult<ChunkId> {
        let mut writes = 0;
        let result = self.commit_node(self.root, &mut writes);
        self.last_commit_writes = writes;
        let root = result?;
        debug!(root = %root.short_hex(), writes, "trie committed");
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

        let bytes = match self.node(id) {
            TrieNode::Leaf(l) => {
                codec::encode_leaf(&l.owner, &l.key, &l.value).map_err(oversized)?
            }
            TrieNode::Branch(b) => {
                let (level, children) = (b.level, *b.children);
                let mut slots = [None; codec::FANOUT];
                for (slot, child) in slots.iter_mut().zip(children) {
                    if let Some(child) = child {
                        *slot = Some(self.commit_node(child, writes)?);
                    }
                }
                codec::encode_branch(level, &slots)
            }
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

    /// Render the resident part of the trie without loading anything.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        self.dump_node(self.root, None, 0, &mut out);
        out
    }

    fn dump_node(&self, id: NodeId, slot: Option<usize>, depth: usize, out: &mut String) {
        let pad = "  ".repeat(depth);
        let label = slot.map(|s| format!("[{s:02}] ")).unwrap_or_default();
        let resident = match self.arena.slot(id) {
            Slot::Unloaded(digest) => {
                let _ = writeln!(out, "{pad}{label}~ {} (not loaded)", digest.short_hex());
                return;
            }
            Slot::Loaded(r) => r,
        };
        let state = match (resident.dirty, resident.digest) {
            (false, Some(digest)) => digest.short_hex(),
            _ => "dirty".to_string(),
        };
        match &resident.node {
            TrieNode::Branch(b) => {
                let _ = writeln!(out, "{pad}{label}B{} {state}", b.level);
                for (i, child) in b.children.iter().enumerate() {
                    if let Some(child) = child {
                        self.dump_node(*child, Some(i), depth + 1, out);
                    }
                }
            }
            TrieNode::Leaf(l) => {
                let _ = writeln!(
                    out,
                    "{pad}{label}L {state} {}={}",
                    render_key(&l.key),
                    render_key(&l.value)
                );
            }
        }
    }
}

fn oversized(err: CodecError) -> IndexError {
    match err {
        CodecError::FieldOverflow {
            field: "key",
            len,
            max,
        } => IndexError::KeySize { size: len, max },
        CodecError::FieldOverflow { len, max, .. } => IndexError::ValueSize { size: len, max },
        other => IndexError::RequestFormat(other.to_string()),
    }
}
