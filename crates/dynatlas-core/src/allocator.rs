//! Binary-tree guillotine allocator.
//!
//! Every node of the tree owns a rectangle of the atlas. A leaf is either free
//! or occupied by exactly one region; a split node's two children tile its
//! rectangle along one axis. Allocation descends left-first to the first free
//! leaf large enough and carves the request out of its top-left corner.
//! Release clears the leaf and merges upward for as long as both children of
//! the parent are free leaves.
//!
//! The search order and split heuristic are deliberately simple: the left
//! subtree is always tried before the right one, and a leaf is cut across the
//! axis with more slack. Neither is optimal for packing density.

use crate::arena::{NodeArena, NodeId};
use crate::config::AtlasConfig;
use crate::error::{AtlasError, Result};
use crate::model::{AtlasStats, Rect};
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::hash::Hash;
use tracing::{debug, error, instrument, trace};

/// Dynamic rectangle allocator keyed by caller-chosen identifiers.
///
/// Node handles never leave this type: callers address regions by key only,
/// which is what makes generation-less handle reuse safe.
#[derive(Debug)]
pub struct AtlasAllocator<K = u64> {
    width: u32,
    height: u32,
    capacity: usize,
    arena: NodeArena,
    root: NodeId,
    nodes_by_key: HashMap<K, NodeId>,
}

impl<K: Eq + Hash> AtlasAllocator<K> {
    /// Creates an empty allocator for a `width`×`height` atlas holding up to
    /// `capacity` concurrent regions, with the default node budget.
    pub fn new(width: u32, height: u32, capacity: usize) -> Result<Self> {
        Self::from_config(&AtlasConfig {
            width,
            height,
            capacity,
            node_capacity: None,
        })
    }

    pub fn from_config(cfg: &AtlasConfig) -> Result<Self> {
        cfg.validate()?;
        let mut arena = NodeArena::new(cfg.node_capacity());
        let root = arena.push_root(Rect::new(0, 0, cfg.width, cfg.height));
        Ok(Self {
            width: cfg.width,
            height: cfg.height,
            capacity: cfg.capacity,
            arena,
            root,
            nodes_by_key: HashMap::with_capacity(cfg.capacity),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Maximum number of concurrent regions.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Reserves a `width`×`height` region for `key` and returns its pixel rectangle.
    ///
    /// Errors:
    /// - `InvalidRequest` if either dimension is zero
    /// - `KeyInUse` if `key` already owns a region
    /// - `CapacityExceeded` if `capacity` regions are already resident
    /// - `NoFit` if no free leaf is large enough
    /// - `ArenaExhausted` if the node arena cannot hold the split
    ///
    /// On any error the tree is left exactly as it was.
    #[instrument(level = "trace", skip(self, key))]
    pub fn allocate(&mut self, key: K, width: u32, height: u32) -> Result<Rect> {
        if width < 1 || height < 1 {
            return Err(AtlasError::InvalidRequest { width, height });
        }
        if self.nodes_by_key.contains_key(&key) {
            return Err(AtlasError::KeyInUse);
        }
        if self.nodes_by_key.len() >= self.capacity {
            error!(capacity = self.capacity, "atlas capacity exceeded");
            return Err(AtlasError::CapacityExceeded {
                capacity: self.capacity,
            });
        }
        let Some(leaf) = self.find_leaf(width, height) else {
            trace!("no free leaf fits");
            return Err(AtlasError::NoFit { width, height });
        };
        let node = self.carve(leaf, width, height)?;
        let rect = self.arena[node].rect;
        self.nodes_by_key.insert(key, node);
        debug!(
            node = %node,
            x = rect.x,
            y = rect.y,
            w = rect.w,
            h = rect.h,
            "allocated region"
        );
        Ok(rect)
    }

    /// Frees the region owned by `key` and merges freed siblings upward.
    /// Returns false (and does nothing) if `key` is not resident.
    #[instrument(level = "trace", skip_all)]
    pub fn release(&mut self, key: &K) -> bool {
        let Some(node) = self.nodes_by_key.remove(key) else {
            return false;
        };
        self.release_and_merge(node);
        true
    }

    /// Drops every region and starts over with a single free root.
    pub fn reset(&mut self) {
        self.arena.clear();
        self.root = self
            .arena
            .push_root(Rect::new(0, 0, self.width, self.height));
        self.nodes_by_key.clear();
        debug!(width = self.width, height = self.height, "allocator reset");
    }

    /// Pixel rectangle currently owned by `key`.
    pub fn get(&self, key: &K) -> Option<Rect> {
        self.nodes_by_key.get(key).map(|&id| self.arena[id].rect)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.nodes_by_key.contains_key(key)
    }

    /// Number of resident regions.
    pub fn len(&self) -> usize {
        self.nodes_by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes_by_key.is_empty()
    }

    /// Resident regions in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, Rect)> + '_ {
        self.nodes_by_key
            .iter()
            .map(|(k, &id)| (k, self.arena[id].rect))
    }

    pub fn stats(&self) -> AtlasStats {
        let mut used_area = 0u64;
        let mut largest_free: Option<Rect> = None;
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let node = &self.arena[id];
            match node.children {
                Some((left, right)) => {
                    stack.push(right);
                    stack.push(left);
                }
                None if node.occupied => used_area += node.rect.area(),
                None => {
                    if !node.rect.is_empty()
                        && largest_free.is_none_or(|best| node.rect.area() > best.area())
                    {
                        largest_free = Some(node.rect);
                    }
                }
            }
        }
        let total_area = (self.width as u64) * (self.height as u64);
        AtlasStats {
            width: self.width,
            height: self.height,
            resident: self.len(),
            capacity: self.capacity,
            nodes_in_use: self.arena.in_use(),
            node_capacity: self.arena.capacity(),
            total_area,
            used_area,
            occupancy: used_area as f64 / total_area as f64,
            largest_free,
        }
    }

    /// Human-readable pre-order dump of the tree, one node per line.
    ///
    /// Children are listed only while the current depth is below `max_depth`;
    /// `None` dumps the whole tree.
    pub fn debug_string(&self, max_depth: Option<usize>) -> String {
        let mut out = String::new();
        let mut stack = vec![(self.root, 0usize)];
        while let Some((id, depth)) = stack.pop() {
            let node = &self.arena[id];
            let r = node.rect;
            let _ = writeln!(
                out,
                "{{[{}], occupied = {}, self = {}, {},{}, {}, {}}}",
                depth, node.occupied, id, r.w, r.h, r.x, r.y
            );
            if max_depth.is_none_or(|max| depth < max) {
                if let Some((left, right)) = node.children {
                    stack.push((right, depth + 1));
                    stack.push((left, depth + 1));
                }
            }
        }
        out
    }

    /// Checks the structural invariants of the tree and its bookkeeping.
    ///
    /// - every split node's children tile it exactly along one axis
    /// - only leaves are occupied, and occupied leaves are exactly the nodes
    ///   referenced by the key map
    /// - occupied rectangles are disjoint and inside the atlas
    /// - every arena slot is either reachable from the root or on the freelist
    pub fn verify(&self) -> Result<()> {
        let corrupt = |msg: String| Err(AtlasError::CorruptTree(msg));
        let atlas = Rect::new(0, 0, self.width, self.height);
        let root = &self.arena[self.root];
        if root.parent.is_some() {
            return corrupt(format!("root {} has a parent", self.root));
        }
        if root.rect != atlas {
            return corrupt(format!("root covers {:?}, expected {:?}", root.rect, atlas));
        }

        let mut reachable = 0usize;
        let mut occupied: Vec<(NodeId, Rect)> = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            reachable += 1;
            if reachable > self.arena.in_use() {
                return corrupt(format!(
                    "more reachable nodes than the {} in use",
                    self.arena.in_use()
                ));
            }
            let node = &self.arena[id];
            let Some((left, right)) = node.children else {
                if node.occupied {
                    occupied.push((id, node.rect));
                }
                continue;
            };
            if node.occupied {
                return corrupt(format!("split node {id} is marked occupied"));
            }
            for child in [left, right] {
                if self.arena[child].parent != Some(id) {
                    return corrupt(format!("node {child} does not point back to parent {id}"));
                }
            }
            let (p, l, r) = (node.rect, self.arena[left].rect, self.arena[right].rect);
            let vertical = l.x == p.x
                && l.y == p.y
                && l.h == p.h
                && r.x == l.x2()
                && r.y == p.y
                && r.h == p.h
                && l.w + r.w == p.w;
            let horizontal = l.x == p.x
                && l.y == p.y
                && l.w == p.w
                && r.x == p.x
                && r.y == l.y2()
                && r.w == p.w
                && l.h + r.h == p.h;
            if !vertical && !horizontal {
                return corrupt(format!(
                    "children of {id} do not tile it: {p:?} -> {l:?} + {r:?}"
                ));
            }
            stack.push(right);
            stack.push(left);
        }

        if reachable != self.arena.in_use() {
            return corrupt(format!(
                "{} nodes reachable but {} in use",
                reachable,
                self.arena.in_use()
            ));
        }
        let free = self.arena.free_slots().len();
        if reachable + free != self.arena.high_water_mark() {
            return corrupt(format!(
                "{} live + {} free slots != {} touched",
                reachable,
                free,
                self.arena.high_water_mark()
            ));
        }

        if occupied.len() != self.nodes_by_key.len() {
            return corrupt(format!(
                "{} occupied leaves but {} resident keys",
                occupied.len(),
                self.nodes_by_key.len()
            ));
        }
        let owned: HashSet<NodeId> = self.nodes_by_key.values().copied().collect();
        for (i, (id, rect)) in occupied.iter().enumerate() {
            if !owned.contains(id) {
                return corrupt(format!("occupied leaf {id} has no key"));
            }
            if !atlas.contains(rect) {
                return corrupt(format!("leaf {id} {rect:?} leaves the atlas"));
            }
            for (other, other_rect) in &occupied[i + 1..] {
                if rect.overlaps(other_rect) {
                    return corrupt(format!("leaves {id} and {other} overlap"));
                }
            }
        }
        Ok(())
    }

    /// Left-first depth-first search for a free leaf that fits.
    fn find_leaf(&self, width: u32, height: u32) -> Option<NodeId> {
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let node = &self.arena[id];
            match node.children {
                Some((left, right)) => {
                    stack.push(right);
                    stack.push(left);
                }
                None => {
                    if !node.occupied && width <= node.rect.w && height <= node.rect.h {
                        return Some(id);
                    }
                }
            }
        }
        None
    }

    /// Splits `leaf` until a child of exactly `width`×`height` sits at its
    /// origin, marks that child occupied and returns it.
    fn carve(&mut self, leaf: NodeId, width: u32, height: u32) -> Result<NodeId> {
        let rect = self.arena[leaf].rect;
        let cross_slack = split_axis(&rect, width, height).cross_slack;
        // One split when the cut already yields the exact size, two otherwise.
        let needed = if cross_slack < 1 { 2 } else { 4 };
        if self.arena.available() < needed {
            error!(
                capacity = self.capacity,
                node_capacity = self.arena.capacity(),
                needed,
                available = self.arena.available(),
                resident = self.nodes_by_key.len(),
                "node arena exhausted"
            );
            return Err(AtlasError::ArenaExhausted {
                nodes: self.arena.capacity(),
            });
        }

        let (left, _) = self.split(leaf, width, height)?;
        let target = if cross_slack < 1 {
            left
        } else {
            self.split(left, width, height)?.0
        };
        self.arena[target].occupied = true;
        Ok(target)
    }

    /// Cuts leaf `id` in two; the left child is `width` (or `height`) deep.
    fn split(&mut self, id: NodeId, width: u32, height: u32) -> Result<(NodeId, NodeId)> {
        let rect = self.arena[id].rect;
        let axis = split_axis(&rect, width, height);
        let (left_rect, right_rect) = if axis.vertical {
            (
                Rect::new(rect.x, rect.y, width, rect.h),
                Rect::new(rect.x + width, rect.y, rect.w - width, rect.h),
            )
        } else {
            (
                Rect::new(rect.x, rect.y, rect.w, height),
                Rect::new(rect.x, rect.y + height, rect.w, rect.h - height),
            )
        };
        let left = self.arena.create(Some(id))?;
        let right = self.arena.create(Some(id))?;
        self.arena[left].rect = left_rect;
        self.arena[right].rect = right_rect;
        self.arena[id].children = Some((left, right));
        trace!(
            node = %id,
            vertical = axis.vertical,
            left = ?left_rect,
            right = ?right_rect,
            "split leaf"
        );
        Ok((left, right))
    }

    fn release_and_merge(&mut self, id: NodeId) {
        let mut current = id;
        loop {
            self.free_descendants(current);
            self.arena[current].occupied = false;
            match self.arena[current].parent {
                Some(parent) if self.children_are_free_leaves(parent) => {
                    trace!(node = %parent, "merging children");
                    current = parent;
                }
                _ => break,
            }
        }
    }

    /// Returns every node below `id` to the arena, deepest first, leaving
    /// `id` a leaf.
    fn free_descendants(&mut self, id: NodeId) {
        let Some((left, right)) = self.arena[id].children.take() else {
            return;
        };
        let mut pending = vec![left, right];
        let mut doomed = Vec::new();
        while let Some(n) = pending.pop() {
            if let Some((l, r)) = self.arena[n].children.take() {
                pending.push(l);
                pending.push(r);
            }
            doomed.push(n);
        }
        for n in doomed.into_iter().rev() {
            self.arena.free(n);
        }
    }

    fn children_are_free_leaves(&self, id: NodeId) -> bool {
        match self.arena[id].children {
            Some((left, right)) => {
                self.arena[left].is_free_leaf() && self.arena[right].is_free_leaf()
            }
            None => false,
        }
    }
}

struct SplitAxis {
    /// Cut perpendicular to x (left/right halves).
    vertical: bool,
    /// Slack left on the axis that the cut does not consume.
    cross_slack: u32,
}

/// Cuts across the axis with more slack, preferring a vertical cut on ties.
fn split_axis(rect: &Rect, width: u32, height: u32) -> SplitAxis {
    let delta_w = rect.w - width;
    let delta_h = rect.h - height;
    if delta_w >= delta_h {
        SplitAxis {
            vertical: true,
            cross_slack: delta_h,
        }
    } else {
        SplitAxis {
            vertical: false,
            cross_slack: delta_w,
        }
    }
}
