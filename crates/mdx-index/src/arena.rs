//! Per-handle node arena.
//!
//! Every node a tree handle knows about occupies one slot. A slot is either
//! a placeholder carrying only the chunk id of a node that has not been read
//! yet, or a resident node together with its last committed id and a dirty
//! flag. Parents refer to children by [`NodeId`], never by pointer, so a
//! placeholder can be hydrated in place without touching its parent.
//!
//! Released slots go on a free list owned by the arena; arenas are never
//! shared between handles.
//!
//! While a journal is open the arena remembers the first state of every slot
//! it touches, so a whole mutation can be undone with [`Arena::rollback`].

use std::collections::HashMap;
use std::fmt;

use mdx_types::ChunkId;

/// Index of a slot in an [`Arena`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct NodeId(u32);

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A node in memory together with its persistence state.
#[derive(Clone, Debug)]
pub(crate) struct Resident<N> {
    pub node: N,
    /// Id of the chunk this node was read from or last committed as.
    pub digest: Option<ChunkId>,
    /// Mutated since `digest` was computed.
    pub dirty: bool,
}

/// Hydration state of a slot.
#[derive(Clone, Debug)]
pub(crate) enum Slot<N> {
    /// Only the chunk id is known.
    Unloaded(ChunkId),
    /// The node has been read or created.
    Loaded(Resident<N>),
}

impl<N> Slot<N> {
    /// A freshly created node, dirty until its first commit.
    pub fn fresh(node: N) -> Self {
        Slot::Loaded(Resident {
            node,
            digest: None,
            dirty: true,
        })
    }

    /// A node just decoded from the chunk `digest`.
    pub fn clean(node: N, digest: ChunkId) -> Self {
        Slot::Loaded(Resident {
            node,
            digest: Some(digest),
            dirty: false,
        })
    }
}

/// Undo log for the slots touched since [`Arena::begin_journal`].
#[derive(Debug)]
struct Journal<N> {
    len: usize,
    free: Vec<u32>,
    saved: HashMap<u32, Option<Slot<N>>>,
}

/// Slot storage with a free list.
#[derive(Debug)]
pub(crate) struct Arena<N> {
    slots: Vec<Option<Slot<N>>>,
    free: Vec<u32>,
    journal: Option<Journal<N>>,
}

impl<N: Clone> Arena<N> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            journal: None,
        }
    }

    /// Start recording changes. Replaces any journal already open.
    pub fn begin_journal(&mut self) {
        self.journal = Some(Journal {
            len: self.slots.len(),
            free: self.free.clone(),
            saved: HashMap::new(),
        });
    }

    /// Keep every change made since [`Arena::begin_journal`].
    pub fn end_journal(&mut self) {
        self.journal = None;
    }

    /// Put every slot back the way it was at [`Arena::begin_journal`].
    pub fn rollback(&mut self) {
        let Some(journal) = self.journal.take() else {
            return;
        };
        self.slots.truncate(journal.len);
        for (i, slot) in journal.saved {
            self.slots[i as usize] = slot;
        }
        self.free = journal.free;
    }

    /// Save the pre-journal state of slot `i` on first touch.
    fn touch(&mut self, i: u32) {
        let Some(journal) = self.journal.as_mut() else {
            return;
        };
        if (i as usize) < journal.len && !journal.saved.contains_key(&i) {
            journal.saved.insert(i, self.slots[i as usize].clone());
        }
    }

    pub fn alloc(&mut self, slot: Slot<N>) -> NodeId {
        match self.free.pop() {
            Some(i) => {
                self.touch(i);
                self.slots[i as usize] = Some(slot);
                NodeId(i)
            }
            None => {
                self.slots.push(Some(slot));
                NodeId((self.slots.len() - 1) as u32)
            }
        }
    }

    /// Return a slot to the free list, handing back its contents.
    pub fn release(&mut self, id: NodeId) -> Option<Slot<N>> {
        if (id.0 as usize) < self.slots.len() {
            self.touch(id.0);
        }
        let slot = self.slots.get_mut(id.0 as usize)?.take();
        if slot.is_some() {
            self.free.push(id.0);
        }
        slot
    }

    #[track_caller]
    pub fn slot(&self, id: NodeId) -> &Slot<N> {
        match self.slots.get(id.0 as usize) {
            Some(Some(slot)) => slot,
            _ => panic!("dangling node id {id:?}"),
        }
    }

    #[track_caller]
    pub fn slot_mut(&mut self, id: NodeId) -> &mut Slot<N> {
        if (id.0 as usize) < self.slots.len() {
            self.touch(id.0);
        }
        match self.slots.get_mut(id.0 as usize) {
            Some(Some(slot)) => slot,
            _ => panic!("dangling node id {id:?}"),
        }
    }

    /// The resident node behind `id`. Callers hydrate first.
    #[track_caller]
    pub fn node(&self, id: NodeId) -> &N {
        match self.slot(id) {
            Slot::Loaded(resident) => &resident.node,
            Slot::Unloaded(_) => panic!("node {id:?} used before hydration"),
        }
    }

    /// Mutable access to a resident node; marks it dirty.
    #[track_caller]
    pub fn node_mut(&mut self, id: NodeId) -> &mut N {
        match self.slot_mut(id) {
            Slot::Loaded(resident) => {
                resident.dirty = true;
                &mut resident.node
            }
            Slot::Unloaded(_) => panic!("node {id:?} used before hydration"),
        }
    }

    /// Mutable access that leaves the dirty flag alone (in-memory links only).
    #[track_caller]
    pub fn node_mut_clean(&mut self, id: NodeId) -> &mut N {
        match self.slot_mut(id) {
            Slot::Loaded(resident) => &mut resident.node,
            Slot::Unloaded(_) => panic!("node {id:?} used before hydration"),
        }
    }

    pub fn mark_dirty(&mut self, id: NodeId) {
        if let Slot::Loaded(resident) = self.slot_mut(id) {
            resident.dirty = true;
        }
    }

    /// Number of occupied slots.
    #[cfg(test)]
    pub fn live(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Number of occupied slots holding a resident node.
    pub fn resident(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| matches!(s, Some(Slot::Loaded(_))))
            .count()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.journal = None;
    }
}
