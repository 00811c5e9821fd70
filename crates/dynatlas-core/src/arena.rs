//! Fixed-capacity node storage for the allocator tree.
//!
//! Nodes refer to each other through [`NodeId`] indices into one `Vec`, so the
//! arena owns every node and parent/child links never form ownership cycles.
//! Freed slots are threaded into an intrusive freelist and handed out again in
//! LIFO order.

use crate::error::{AtlasError, Result};
use crate::model::Rect;
use std::ops::{Index, IndexMut};

/// Index of a node slot. Carries no generation: a handle is only meaningful
/// between the `create` that produced it and the matching `free`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct NodeId(u32);

impl NodeId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub(crate) parent: Option<NodeId>,
    /// `(left, right)`; both present on a split node, both absent on a leaf.
    pub(crate) children: Option<(NodeId, NodeId)>,
    pub(crate) occupied: bool,
    pub(crate) rect: Rect,
    next_free: Option<NodeId>,
}

impl Node {
    fn new(parent: Option<NodeId>) -> Self {
        Self {
            parent,
            children: None,
            occupied: false,
            rect: Rect::default(),
            next_free: None,
        }
    }

    pub(crate) fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    pub(crate) fn is_free_leaf(&self) -> bool {
        self.is_leaf() && !self.occupied
    }
}

#[derive(Debug)]
pub(crate) struct NodeArena {
    nodes: Vec<Node>,
    capacity: usize,
    freelist_head: Option<NodeId>,
    in_use: usize,
}

impl NodeArena {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity),
            capacity,
            freelist_head: None,
            in_use: 0,
        }
    }

    /// Takes a slot for a fresh node under `parent`, recycling the freelist
    /// head when there is one.
    pub(crate) fn create(&mut self, parent: Option<NodeId>) -> Result<NodeId> {
        if let Some(id) = self.freelist_head {
            let slot = &mut self.nodes[id.index()];
            self.freelist_head = slot.next_free;
            *slot = Node::new(parent);
            self.in_use += 1;
            return Ok(id);
        }
        if self.nodes.len() >= self.capacity {
            return Err(AtlasError::ArenaExhausted {
                nodes: self.capacity,
            });
        }
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node::new(parent));
        self.in_use += 1;
        Ok(id)
    }

    /// Returns `id` to the freelist. The slot's contents are dead from here on.
    pub(crate) fn free(&mut self, id: NodeId) {
        debug_assert!(self.in_use > 0, "freeing node {id} from an empty arena");
        self.nodes[id.index()].next_free = self.freelist_head;
        self.freelist_head = Some(id);
        self.in_use -= 1;
    }

    /// Logically discards every node.
    pub(crate) fn clear(&mut self) {
        self.nodes.clear();
        self.freelist_head = None;
        self.in_use = 0;
    }

    /// Plants a parentless node covering `rect` into an empty arena.
    ///
    /// Cannot fail: a validated config always has room for the root.
    pub(crate) fn push_root(&mut self, rect: Rect) -> NodeId {
        debug_assert!(self.nodes.is_empty() && self.capacity > 0);
        let mut root = Node::new(None);
        root.rect = rect;
        self.nodes.push(root);
        self.in_use = 1;
        NodeId(0)
    }

    /// Slots that `create` can still hand out.
    pub(crate) fn available(&self) -> usize {
        self.capacity - self.in_use
    }

    pub(crate) fn in_use(&self) -> usize {
        self.in_use
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Walks the freelist; used only by tree verification.
    pub(crate) fn free_slots(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cursor = self.freelist_head;
        while let Some(id) = cursor {
            if out.len() > self.nodes.len() {
                // cycle; let the caller's count check report it
                break;
            }
            out.push(id);
            cursor = self.nodes[id.index()].next_free;
        }
        out
    }

    /// Slots ever touched since the last clear (live + free).
    pub(crate) fn high_water_mark(&self) -> usize {
        self.nodes.len()
    }
}

impl Index<NodeId> for NodeArena {
    type Output = Node;

    fn index(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }
}

impl IndexMut<NodeId> for NodeArena {
    fn index_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }
}
