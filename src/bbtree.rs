//! Broad-Phase: Dynamic AABB Tree with Leaf-Pair Threading
//!
//! A binary bounding-volume tree whose leaves are shapes (identified by
//! their stable hash) and whose internal nodes carry the union box of their
//! subtree. Two roots share one node/pair arena: the **active** root holds
//! moving shapes and is reindexed every step; the **static** root is
//! indexed once at insertion.
//!
//! # Features
//!
//! - **Fat AABBs**: leaf boxes are enlarged along the velocity direction so
//!   small translations don't force re-insertion
//! - **Pair threading**: each known overlapping leaf pair is a node in two
//!   doubly-linked lists at once, so unmoved leaves replay cached pairs
//!   without any geometric test
//! - **Stamps**: a monotone counter records the step each leaf last moved;
//!   pair insertion and emission are deduplicated by stamp comparison
//! - **Pooled nodes and pairs**: free lists recycle arena slots
//!
//! Internal invariant violations (replacing a child of a leaf, unlinking a
//! node from the wrong parent) are bugs and panic with a descriptive
//! message.

#[cfg(not(feature = "std"))]
use alloc::collections::BTreeMap;
#[cfg(not(feature = "std"))]
use alloc::vec::Vec;
#[cfg(feature = "std")]
use std::collections::BTreeMap;

use crate::aabb::{combine, merged_area, proximity, test_overlap, Aabb};
use crate::contact::HashValue;
use crate::math::{Float, Vec2};

/// Null index sentinel for nodes and pairs.
pub const NULL: u32 = u32::MAX;

type NodeId = u32;
type PairId = u32;

/// Broad-phase expansion coefficient for both size and velocity.
const EXPANSION_COEF: Float = 0.1;

/// Current bounds of a shape, fed to the tree by the owner.
#[derive(Clone, Copy, Debug)]
pub struct LeafBounds {
    /// The shape's true bounding box.
    pub bb: Aabb,
    /// The owning body's velocity.
    pub velocity: Vec2,
    /// Whether to expand the cached box along the velocity.
    pub use_velocity: bool,
}

impl LeafBounds {
    /// Bounds for a shape that should not be velocity-expanded.
    #[must_use]
    pub fn fixed(bb: Aabb) -> Self {
        Self {
            bb,
            velocity: Vec2::ZERO,
            use_velocity: false,
        }
    }
}

/// One endpoint of a [`Pair`]: a doubly-linked list node inside `leaf`'s
/// pair list.
#[derive(Clone, Copy, Debug)]
struct Thread {
    prev: PairId,
    leaf: NodeId,
    next: PairId,
}

impl Thread {
    const fn null() -> Self {
        Self {
            prev: NULL,
            leaf: NULL,
            next: NULL,
        }
    }
}

/// A known overlapping leaf pair, threaded through both leaves' lists.
#[derive(Clone, Copy, Debug)]
struct Pair {
    a: Thread,
    b: Thread,
}

impl Pair {
    const fn null() -> Self {
        Self {
            a: Thread::null(),
            b: Thread::null(),
        }
    }
}

/// Tree node: a leaf (`obj != 0`) or an internal node with children `a`/`b`.
#[derive(Clone, Copy, Debug)]
struct Node {
    /// Shape hash for leaves; 0 for internal nodes (hashes start at 1).
    obj: HashValue,
    /// Union box of the subtree (enlarged box for leaves).
    bb: Aabb,
    parent: NodeId,

    // Internal nodes
    a: NodeId,
    b: NodeId,

    // Leaves
    stamp: u64,
    pairs: PairId,
}

impl Node {
    const fn empty() -> Self {
        Self {
            obj: 0,
            bb: Aabb {
                lower: Vec2::ZERO,
                upper: Vec2::ZERO,
            },
            parent: NULL,
            a: NULL,
            b: NULL,
            stamp: 0,
            pairs: NULL,
        }
    }

    #[inline]
    fn is_leaf(&self) -> bool {
        self.obj != 0
    }
}

// ============================================================================
// BbTree
// ============================================================================

/// The broad-phase index: active and static trees over shared pools.
pub struct BbTree {
    nodes: Vec<Node>,
    node_free: Vec<NodeId>,
    pairs: Vec<Pair>,
    pair_free: Vec<PairId>,

    active_root: NodeId,
    static_root: NodeId,

    /// Leaves by shape hash. Ordered, so reindex traversal order is
    /// reproducible for a fixed construction order.
    active_leaves: BTreeMap<HashValue, NodeId>,
    static_leaves: BTreeMap<HashValue, NodeId>,

    /// Master stamp, incremented after every insertion and reindex.
    stamp: u64,

    /// Scratch list reused by `reindex_query`.
    leaf_scratch: Vec<NodeId>,
}

impl BbTree {
    /// Create an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            node_free: Vec::new(),
            pairs: Vec::new(),
            pair_free: Vec::new(),
            active_root: NULL,
            static_root: NULL,
            active_leaves: BTreeMap::new(),
            static_leaves: BTreeMap::new(),
            stamp: 0,
            leaf_scratch: Vec::new(),
        }
    }

    /// Number of active leaves.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active_leaves.len()
    }

    /// Number of static leaves.
    #[must_use]
    pub fn static_count(&self) -> usize {
        self.static_leaves.len()
    }

    /// Whether the given shape hash is indexed (either tree).
    #[must_use]
    pub fn contains(&self, hash: HashValue) -> bool {
        self.active_leaves.contains_key(&hash) || self.static_leaves.contains_key(&hash)
    }

    /// Current master stamp.
    #[inline]
    #[must_use]
    pub fn stamp(&self) -> u64 {
        self.stamp
    }

    /// Nodes currently available for reuse (pool bound check).
    #[must_use]
    pub fn pooled_nodes(&self) -> usize {
        self.node_free.len()
    }

    /// Pairs currently available for reuse (pool bound check).
    #[must_use]
    pub fn pooled_pairs(&self) -> usize {
        self.pair_free.len()
    }

    // ------------------------------------------------------------------
    // Pools
    // ------------------------------------------------------------------

    fn node_from_pool(&mut self) -> NodeId {
        if let Some(id) = self.node_free.pop() {
            id
        } else {
            let id = self.nodes.len() as NodeId;
            self.nodes.push(Node::empty());
            id
        }
    }

    fn node_recycle(&mut self, id: NodeId) {
        self.nodes[id as usize] = Node::empty();
        self.node_free.push(id);
    }

    fn pair_from_pool(&mut self) -> PairId {
        if let Some(id) = self.pair_free.pop() {
            id
        } else {
            let id = self.pairs.len() as PairId;
            self.pairs.push(Pair::null());
            id
        }
    }

    fn pair_recycle(&mut self, id: PairId) {
        self.pairs[id as usize] = Pair::null();
        self.pair_free.push(id);
    }

    // ------------------------------------------------------------------
    // Node helpers
    // ------------------------------------------------------------------

    fn node_set_a(&mut self, node: NodeId, value: NodeId) {
        self.nodes[node as usize].a = value;
        self.nodes[value as usize].parent = node;
    }

    fn node_set_b(&mut self, node: NodeId, value: NodeId) {
        self.nodes[node as usize].b = value;
        self.nodes[value as usize].parent = node;
    }

    fn node_other(&self, node: NodeId, child: NodeId) -> NodeId {
        let n = &self.nodes[node as usize];
        if n.a == child {
            n.b
        } else {
            n.a
        }
    }

    fn node_new(&mut self, a: NodeId, b: NodeId) -> NodeId {
        let id = self.node_from_pool();
        self.nodes[id as usize].bb =
            combine(&self.nodes[a as usize].bb, &self.nodes[b as usize].bb);
        self.node_set_a(id, a);
        self.node_set_b(id, b);
        id
    }

    /// Enlarged box: the shape's box expanded toward its velocity, with a
    /// margin proportional to its size. The leaf is only reinserted once
    /// the true box escapes this one.
    fn enlarged_bb(bounds: &LeafBounds) -> Aabb {
        if !bounds.use_velocity {
            return bounds.bb;
        }

        let bb = bounds.bb;
        let x = (bb.upper.x - bb.lower.x) * EXPANSION_COEF;
        let y = (bb.upper.y - bb.lower.y) * EXPANSION_COEF;
        let v = bounds.velocity * EXPANSION_COEF;

        Aabb::from_edges(
            bb.lower.x + fmin(-x, v.x),
            bb.lower.y + fmin(-y, v.y),
            bb.upper.x + fmax(x, v.x),
            bb.upper.y + fmax(y, v.y),
        )
    }

    // ------------------------------------------------------------------
    // Structural operations
    // ------------------------------------------------------------------

    fn subtree_insert(&mut self, subtree: NodeId, leaf: NodeId) -> NodeId {
        if subtree == NULL {
            self.nodes[leaf as usize].parent = NULL;
            return leaf;
        }
        if self.nodes[subtree as usize].is_leaf() {
            return self.node_new(leaf, subtree);
        }

        let leaf_bb = self.nodes[leaf as usize].bb;
        let a = self.nodes[subtree as usize].a;
        let b = self.nodes[subtree as usize].b;
        let a_bb = self.nodes[a as usize].bb;
        let b_bb = self.nodes[b as usize].bb;

        let mut cost_a = b_bb.area() + merged_area(&a_bb, &leaf_bb);
        let mut cost_b = a_bb.area() + merged_area(&b_bb, &leaf_bb);

        if cost_a == cost_b {
            cost_a = proximity(&a_bb, &leaf_bb);
            cost_b = proximity(&b_bb, &leaf_bb);
        }

        if cost_b < cost_a {
            let new_b = self.subtree_insert(b, leaf);
            self.node_set_b(subtree, new_b);
        } else {
            let new_a = self.subtree_insert(a, leaf);
            self.node_set_a(subtree, new_a);
        }

        self.nodes[subtree as usize].bb =
            combine(&self.nodes[subtree as usize].bb, &leaf_bb);
        subtree
    }

    fn node_replace_child(&mut self, parent: NodeId, child: NodeId, value: NodeId) {
        let p = &self.nodes[parent as usize];
        if p.is_leaf() {
            panic!("internal error: cannot replace the child of a leaf");
        }
        if p.a != child && p.b != child {
            panic!("internal error: node is not a child of its parent");
        }

        if self.nodes[parent as usize].a == child {
            self.node_recycle(child);
            self.node_set_a(parent, value);
        } else {
            self.node_recycle(child);
            self.node_set_b(parent, value);
        }

        // Refit union boxes up to the root.
        let mut node = parent;
        while node != NULL {
            let a = self.nodes[node as usize].a;
            let b = self.nodes[node as usize].b;
            self.nodes[node as usize].bb =
                combine(&self.nodes[a as usize].bb, &self.nodes[b as usize].bb);
            node = self.nodes[node as usize].parent;
        }
    }

    fn subtree_remove(&mut self, subtree: NodeId, leaf: NodeId) -> NodeId {
        if leaf == subtree {
            return NULL;
        }

        let parent = self.nodes[leaf as usize].parent;
        if parent == subtree {
            let other = self.node_other(subtree, leaf);
            self.nodes[other as usize].parent = self.nodes[subtree as usize].parent;
            self.node_recycle(subtree);
            return other;
        }

        let grandparent = self.nodes[parent as usize].parent;
        let sibling = self.node_other(parent, leaf);
        self.node_replace_child(grandparent, parent, sibling);
        subtree
    }

    // ------------------------------------------------------------------
    // Pair threading
    // ------------------------------------------------------------------

    fn pair_insert(&mut self, a: NodeId, b: NodeId) {
        let next_a = self.nodes[a as usize].pairs;
        let next_b = self.nodes[b as usize].pairs;
        let pair = self.pair_from_pool();
        self.nodes[a as usize].pairs = pair;
        self.nodes[b as usize].pairs = pair;
        self.pairs[pair as usize] = Pair {
            a: Thread {
                prev: NULL,
                leaf: a,
                next: next_a,
            },
            b: Thread {
                prev: NULL,
                leaf: b,
                next: next_b,
            },
        };

        if next_a != NULL {
            if self.pairs[next_a as usize].a.leaf == a {
                self.pairs[next_a as usize].a.prev = pair;
            } else {
                self.pairs[next_a as usize].b.prev = pair;
            }
        }
        if next_b != NULL {
            if self.pairs[next_b as usize].a.leaf == b {
                self.pairs[next_b as usize].a.prev = pair;
            } else {
                self.pairs[next_b as usize].b.prev = pair;
            }
        }
    }

    /// Remove one endpoint thread from its leaf's pair list.
    fn thread_unlink(&mut self, thread: Thread) {
        let next = thread.next;
        let prev = thread.prev;

        if next != NULL {
            if self.pairs[next as usize].a.leaf == thread.leaf {
                self.pairs[next as usize].a.prev = prev;
            } else {
                self.pairs[next as usize].b.prev = prev;
            }
        }

        if prev != NULL {
            if self.pairs[prev as usize].a.leaf == thread.leaf {
                self.pairs[prev as usize].a.next = next;
            } else {
                self.pairs[prev as usize].b.next = next;
            }
        } else {
            self.nodes[thread.leaf as usize].pairs = next;
        }
    }

    /// Drop every pair in a leaf's list, unlinking each sibling thread from
    /// the other leaf's list.
    fn pairs_clear(&mut self, leaf: NodeId) {
        let mut pair = self.nodes[leaf as usize].pairs;
        self.nodes[leaf as usize].pairs = NULL;

        while pair != NULL {
            let p = self.pairs[pair as usize];
            if p.a.leaf == leaf {
                let next = p.a.next;
                self.thread_unlink(p.b);
                self.pair_recycle(pair);
                pair = next;
            } else {
                let next = p.b.next;
                self.thread_unlink(p.a);
                self.pair_recycle(pair);
                pair = next;
            }
        }
    }

    // ------------------------------------------------------------------
    // Insert / remove
    // ------------------------------------------------------------------

    /// Insert a shape into the active tree.
    pub fn insert_active(&mut self, hash: HashValue, bounds: LeafBounds) {
        let leaf = self.node_from_pool();
        self.nodes[leaf as usize].obj = hash;
        self.nodes[leaf as usize].bb = Self::enlarged_bb(&bounds);

        self.active_leaves.insert(hash, leaf);

        let root = self.active_root;
        self.active_root = self.subtree_insert(root, leaf);
        self.nodes[leaf as usize].stamp = self.stamp;

        // Discover pairs with everything this leaf already overlaps. No
        // collisions are emitted here; the next reindex replays the list.
        let static_root = self.static_root;
        if static_root != NULL {
            self.mark_leaf_query(static_root, leaf, false, &mut |_, _| {});
        }
        let mut node = leaf;
        loop {
            let parent = self.nodes[node as usize].parent;
            if parent == NULL {
                break;
            }
            if node == self.nodes[parent as usize].a {
                let sibling = self.nodes[parent as usize].b;
                self.mark_leaf_query(sibling, leaf, true, &mut |_, _| {});
            } else {
                let sibling = self.nodes[parent as usize].a;
                self.mark_leaf_query(sibling, leaf, false, &mut |_, _| {});
            }
            node = parent;
        }

        self.stamp += 1;
    }

    /// Insert a shape into the static tree.
    pub fn insert_static(&mut self, hash: HashValue, bounds: LeafBounds) {
        let leaf = self.node_from_pool();
        self.nodes[leaf as usize].obj = hash;
        self.nodes[leaf as usize].bb = Self::enlarged_bb(&bounds);

        self.static_leaves.insert(hash, leaf);

        let root = self.static_root;
        self.static_root = self.subtree_insert(root, leaf);
        self.nodes[leaf as usize].stamp = self.stamp;

        // Pair with every overlapping active leaf; the active side has not
        // been traversed for this leaf, so insert unconditionally.
        let active_root = self.active_root;
        if active_root != NULL {
            self.mark_leaf_query(active_root, leaf, true, &mut |_, _| {});
        }

        self.stamp += 1;
    }

    /// Remove a shape from whichever tree holds it. Unknown hashes are
    /// ignored.
    pub fn remove(&mut self, hash: HashValue) {
        if let Some(leaf) = self.active_leaves.remove(&hash) {
            let root = self.active_root;
            self.active_root = self.subtree_remove(root, leaf);
            self.pairs_clear(leaf);
            self.node_recycle(leaf);
        } else if let Some(leaf) = self.static_leaves.remove(&hash) {
            let root = self.static_root;
            self.static_root = self.subtree_remove(root, leaf);
            self.pairs_clear(leaf);
            self.node_recycle(leaf);
        }
    }

    // ------------------------------------------------------------------
    // Reindex + query
    // ------------------------------------------------------------------

    /// Re-fit moved leaves, then emit every candidate overlapping pair
    /// exactly once into `out`, in deterministic traversal order.
    ///
    /// `bounds` supplies the current box and velocity for an active shape.
    pub fn reindex_query<G>(&mut self, bounds: G, out: &mut Vec<(HashValue, HashValue)>)
    where
        G: Fn(HashValue) -> LeafBounds,
    {
        if self.active_root == NULL {
            return;
        }

        // Leaf updates may restructure the tree; don't hold the root.
        let mut scratch = core::mem::take(&mut self.leaf_scratch);
        scratch.clear();
        scratch.extend(self.active_leaves.values().copied());
        for &leaf in &scratch {
            self.leaf_update(leaf, &bounds);
        }
        self.leaf_scratch = scratch;

        let static_root = self.static_root;
        let root = self.active_root;
        let mut emit = |a: HashValue, b: HashValue| out.push((a, b));
        self.mark_subtree(root, static_root, &mut emit);

        self.stamp += 1;
    }

    /// Re-fit a leaf whose true box escaped its enlarged box. Returns
    /// whether the tree changed.
    fn leaf_update<G>(&mut self, leaf: NodeId, bounds: &G) -> bool
    where
        G: Fn(HashValue) -> LeafBounds,
    {
        let hash = self.nodes[leaf as usize].obj;
        let current = bounds(hash);

        if self.nodes[leaf as usize].bb.contains(&current.bb) {
            return false;
        }

        self.nodes[leaf as usize].bb = Self::enlarged_bb(&current);

        let root = self.active_root;
        let root = self.subtree_remove(root, leaf);
        self.active_root = self.subtree_insert(root, leaf);

        self.pairs_clear(leaf);
        self.nodes[leaf as usize].stamp = self.stamp;
        true
    }

    fn mark_subtree<F>(&mut self, node: NodeId, static_root: NodeId, emit: &mut F)
    where
        F: FnMut(HashValue, HashValue),
    {
        if self.nodes[node as usize].is_leaf() {
            self.mark_leaf(node, static_root, emit);
        } else {
            let a = self.nodes[node as usize].a;
            let b = self.nodes[node as usize].b;
            self.mark_subtree(a, static_root, emit);
            self.mark_subtree(b, static_root, emit);
        }
    }

    fn mark_leaf<F>(&mut self, leaf: NodeId, static_root: NodeId, emit: &mut F)
    where
        F: FnMut(HashValue, HashValue),
    {
        if self.nodes[leaf as usize].stamp == self.stamp {
            // This leaf moved this step: its pair list was cleared. Rebuild
            // it by querying the static tree and every sibling subtree on
            // the way up. Siblings not yet visited by the traversal are
            // queried with `left = true` (pair only, emission happens from
            // their side); already-visited siblings emit immediately.
            if static_root != NULL {
                self.mark_leaf_query(static_root, leaf, false, emit);
            }

            let mut node = leaf;
            loop {
                let parent = self.nodes[node as usize].parent;
                if parent == NULL {
                    break;
                }
                if node == self.nodes[parent as usize].a {
                    let sibling = self.nodes[parent as usize].b;
                    self.mark_leaf_query(sibling, leaf, true, emit);
                } else {
                    let sibling = self.nodes[parent as usize].a;
                    self.mark_leaf_query(sibling, leaf, false, emit);
                }
                node = parent;
            }
        } else {
            // Unmoved leaf: replay the cached pair list without geometric
            // tests. Each pair is emitted once, from its `b` endpoint.
            let mut pair = self.nodes[leaf as usize].pairs;
            while pair != NULL {
                let p = self.pairs[pair as usize];
                if leaf == p.b.leaf {
                    emit(self.nodes[p.a.leaf as usize].obj, self.nodes[leaf as usize].obj);
                    pair = p.b.next;
                } else {
                    pair = p.a.next;
                }
            }
        }
    }

    fn mark_leaf_query<F>(&mut self, subtree: NodeId, leaf: NodeId, left: bool, emit: &mut F)
    where
        F: FnMut(HashValue, HashValue),
    {
        if !test_overlap(
            &self.nodes[leaf as usize].bb,
            &self.nodes[subtree as usize].bb,
        ) {
            return;
        }

        if self.nodes[subtree as usize].is_leaf() {
            if left {
                self.pair_insert(leaf, subtree);
            } else {
                // Insert once from the younger side; stamps tie means the
                // other leaf's own walk inserts it.
                if self.nodes[subtree as usize].stamp < self.nodes[leaf as usize].stamp {
                    self.pair_insert(subtree, leaf);
                }
                emit(
                    self.nodes[leaf as usize].obj,
                    self.nodes[subtree as usize].obj,
                );
            }
        } else {
            let a = self.nodes[subtree as usize].a;
            let b = self.nodes[subtree as usize].b;
            self.mark_leaf_query(a, leaf, left, emit);
            self.mark_leaf_query(b, leaf, left, emit);
        }
    }

    /// Visit every active leaf overlapping `bb`.
    pub fn query_active<F: FnMut(HashValue)>(&self, bb: &Aabb, f: F) {
        self.query_subtree(self.active_root, bb, f);
    }

    /// Visit every static leaf overlapping `bb`.
    pub fn query_static<F: FnMut(HashValue)>(&self, bb: &Aabb, f: F) {
        self.query_subtree(self.static_root, bb, f);
    }

    fn query_subtree<F: FnMut(HashValue)>(&self, root: NodeId, bb: &Aabb, mut f: F) {
        if root == NULL {
            return;
        }

        let mut stack = Vec::with_capacity(64);
        stack.push(root);

        while let Some(node_id) = stack.pop() {
            let node = &self.nodes[node_id as usize];
            if !test_overlap(&node.bb, bb) {
                continue;
            }
            if node.is_leaf() {
                f(node.obj);
            } else {
                stack.push(node.a);
                stack.push(node.b);
            }
        }
    }

    // ------------------------------------------------------------------
    // Invariant checking (test support)
    // ------------------------------------------------------------------

    /// Walk both trees and panic on any violated structural invariant:
    /// parent/child links, union boxes, and pair-thread symmetry.
    pub fn validate(&self) {
        self.validate_subtree(self.active_root);
        self.validate_subtree(self.static_root);
        self.validate_pairs(&self.active_leaves);
        self.validate_pairs(&self.static_leaves);
    }

    fn validate_subtree(&self, node_id: NodeId) {
        if node_id == NULL {
            return;
        }
        let node = &self.nodes[node_id as usize];
        if node.is_leaf() {
            return;
        }

        let a = &self.nodes[node.a as usize];
        let b = &self.nodes[node.b as usize];
        assert_eq!(a.parent, node_id, "child A has wrong parent link");
        assert_eq!(b.parent, node_id, "child B has wrong parent link");
        assert_eq!(
            node.bb,
            combine(&a.bb, &b.bb),
            "internal node box is not the union of its children"
        );

        self.validate_subtree(node.a);
        self.validate_subtree(node.b);
    }

    fn validate_pairs(&self, leaves: &BTreeMap<HashValue, NodeId>) {
        for &leaf in leaves.values() {
            let mut pair = self.nodes[leaf as usize].pairs;
            while pair != NULL {
                let p = self.pairs[pair as usize];
                let (this, other) = if p.a.leaf == leaf {
                    (p.a, p.b)
                } else {
                    assert_eq!(p.b.leaf, leaf, "pair thread does not reference its leaf");
                    (p.b, p.a)
                };

                // The sibling thread must appear exactly once in the other
                // leaf's list.
                let mut seen = 0;
                let mut scan = self.nodes[other.leaf as usize].pairs;
                while scan != NULL {
                    let sp = self.pairs[scan as usize];
                    if scan == pair {
                        seen += 1;
                    }
                    scan = if sp.a.leaf == other.leaf {
                        sp.a.next
                    } else {
                        sp.b.next
                    };
                }
                assert_eq!(seen, 1, "pair missing from sibling leaf's list");

                pair = this.next;
            }
        }
    }
}

impl Default for BbTree {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for BbTree {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BbTree")
            .field("active", &self.active_leaves.len())
            .field("static", &self.static_leaves.len())
            .field("stamp", &self.stamp)
            .finish()
    }
}

#[inline]
fn fmin(a: Float, b: Float) -> Float {
    if a < b {
        a
    } else {
        b
    }
}

#[inline]
fn fmax(a: Float, b: Float) -> Float {
    if a > b {
        a
    } else {
        b
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_bounds(x: Float, y: Float) -> LeafBounds {
        LeafBounds::fixed(Aabb::from_edges(x, y, x + 1.0, y + 1.0))
    }

    fn moving_bounds(x: Float, y: Float, v: Vec2) -> LeafBounds {
        LeafBounds {
            bb: Aabb::from_edges(x, y, x + 1.0, y + 1.0),
            velocity: v,
            use_velocity: true,
        }
    }

    fn collect_pairs(tree: &mut BbTree, positions: &BTreeMap<HashValue, (Float, Float)>) -> Vec<(HashValue, HashValue)> {
        let mut out = Vec::new();
        tree.reindex_query(
            |hash| {
                let (x, y) = positions[&hash];
                unit_bounds(x, y)
            },
            &mut out,
        );
        out
    }

    #[test]
    fn test_insert_remove_leaves_tree_empty() {
        let mut tree = BbTree::new();
        tree.insert_active(1, unit_bounds(0.0, 0.0));
        assert_eq!(tree.active_count(), 1);
        tree.remove(1);
        assert_eq!(tree.active_count(), 0);
        // The leaf node went back to the pool; nothing leaked.
        assert_eq!(tree.pooled_nodes(), 1);
        tree.validate();
    }

    #[test]
    fn test_query_active() {
        let mut tree = BbTree::new();
        tree.insert_active(1, unit_bounds(0.0, 0.0));
        tree.insert_active(2, unit_bounds(10.0, 10.0));
        tree.insert_active(3, unit_bounds(20.0, 20.0));
        tree.validate();

        let mut hits = Vec::new();
        tree.query_active(&Aabb::from_edges(-1.0, -1.0, 2.0, 2.0), |h| hits.push(h));
        assert!(hits.contains(&1));
        assert!(!hits.contains(&3));

        let mut all = Vec::new();
        tree.query_active(&Aabb::from_edges(-100.0, -100.0, 100.0, 100.0), |h| {
            all.push(h)
        });
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_overlapping_pair_emitted_once() {
        let mut tree = BbTree::new();
        let mut positions = BTreeMap::new();
        tree.insert_active(1, unit_bounds(0.0, 0.0));
        positions.insert(1, (0.0, 0.0));
        tree.insert_active(2, unit_bounds(0.5, 0.5));
        positions.insert(2, (0.5, 0.5));
        tree.insert_active(3, unit_bounds(50.0, 50.0));
        positions.insert(3, (50.0, 50.0));

        let pairs = collect_pairs(&mut tree, &positions);
        let normalized: Vec<_> = pairs
            .iter()
            .map(|&(a, b)| if a < b { (a, b) } else { (b, a) })
            .collect();
        assert_eq!(
            normalized.iter().filter(|&&p| p == (1, 2)).count(),
            1,
            "overlapping pair must be emitted exactly once, got {:?}",
            pairs
        );
        assert!(!normalized.iter().any(|&p| p == (1, 3) || p == (2, 3)));
        tree.validate();
    }

    #[test]
    fn test_pair_cache_replayed_when_nothing_moves() {
        let mut tree = BbTree::new();
        let mut positions = BTreeMap::new();
        tree.insert_active(1, unit_bounds(0.0, 0.0));
        positions.insert(1, (0.0, 0.0));
        tree.insert_active(2, unit_bounds(0.5, 0.5));
        positions.insert(2, (0.5, 0.5));

        let first = collect_pairs(&mut tree, &positions);
        assert_eq!(first.len(), 1);
        // Second reindex with no movement: the cached pair is replayed.
        let second = collect_pairs(&mut tree, &positions);
        assert_eq!(second.len(), 1);
        tree.validate();
    }

    #[test]
    fn test_small_move_does_not_restamp_leaf() {
        let mut tree = BbTree::new();
        tree.insert_active(1, moving_bounds(0.0, 0.0, Vec2::ZERO));
        let mut out = Vec::new();
        // Move within the enlarged box: no restructure.
        tree.reindex_query(|_| moving_bounds(0.05, 0.0, Vec2::ZERO), &mut out);
        let stamp_after_first = tree.stamp();
        // The leaf keeps its insertion stamp, so it is treated as unmoved.
        tree.reindex_query(|_| moving_bounds(0.05, 0.0, Vec2::ZERO), &mut out);
        assert_eq!(tree.stamp(), stamp_after_first + 1);
        tree.validate();
    }

    #[test]
    fn test_large_move_reindexes_and_finds_new_pairs() {
        let mut tree = BbTree::new();
        let mut positions = BTreeMap::new();
        tree.insert_active(1, unit_bounds(0.0, 0.0));
        positions.insert(1, (0.0, 0.0));
        tree.insert_active(2, unit_bounds(30.0, 0.0));
        positions.insert(2, (30.0, 0.0));

        // Step 1: far apart.
        assert!(collect_pairs(&mut tree, &positions).is_empty());

        // Step 2: shape 1 jumps next to shape 2.
        positions.insert(1, (29.5, 0.0));
        let pairs = collect_pairs(&mut tree, &positions);
        assert_eq!(pairs.len(), 1, "expected a new pair after the jump, got {:?}", pairs);
        tree.validate();

        // Step 3: no movement; cached pair replays.
        let pairs = collect_pairs(&mut tree, &positions);
        assert_eq!(pairs.len(), 1);
    }

    #[test]
    fn test_static_tree_pairs() {
        let mut tree = BbTree::new();
        let mut positions = BTreeMap::new();

        tree.insert_static(10, unit_bounds(0.0, 0.0));
        tree.insert_active(1, unit_bounds(0.5, 0.0));
        positions.insert(1, (0.5, 0.0));

        // Inserting the active shape paired it with the static leaf; the
        // first reindex replays that pair (the active leaf has not moved).
        let pairs = collect_pairs(&mut tree, &positions);
        assert_eq!(pairs.len(), 1);
        let (a, b) = pairs[0];
        assert!(
            (a == 10 && b == 1) || (a == 1 && b == 10),
            "expected static/active pair, got ({a}, {b})"
        );
        tree.validate();

        // Moving the active leaf re-discovers the static pair.
        positions.insert(1, (0.25, 0.0));
        // Force re-insertion with a box escape.
        let mut out = Vec::new();
        tree.reindex_query(
            |_| unit_bounds(5.0, 5.0),
            &mut out,
        );
        out.clear();
        tree.reindex_query(
            |_| unit_bounds(0.25, 0.0),
            &mut out,
        );
        assert_eq!(out.len(), 1, "static pair should be rediscovered: {:?}", out);
        tree.validate();
    }

    #[test]
    fn test_remove_unlinks_pairs_from_sibling() {
        let mut tree = BbTree::new();
        let mut positions = BTreeMap::new();
        tree.insert_active(1, unit_bounds(0.0, 0.0));
        positions.insert(1, (0.0, 0.0));
        tree.insert_active(2, unit_bounds(0.5, 0.0));
        positions.insert(2, (0.5, 0.0));
        tree.insert_active(3, unit_bounds(0.25, 0.0));
        positions.insert(3, (0.25, 0.0));

        let _ = collect_pairs(&mut tree, &positions);
        tree.validate();

        tree.remove(2);
        tree.validate();

        positions.remove(&2);
        let pairs = collect_pairs(&mut tree, &positions);
        assert!(
            pairs.iter().all(|&(a, b)| a != 2 && b != 2),
            "removed shape must not appear in pairs: {:?}",
            pairs
        );
    }

    #[test]
    fn test_pools_are_reused() {
        let mut tree = BbTree::new();
        for round in 0..5 {
            for i in 0..10u32 {
                tree.insert_active(100 + i, unit_bounds(i as Float * 2.0, 0.0));
            }
            for i in 0..10u32 {
                tree.remove(100 + i);
            }
            let _ = round;
        }
        assert_eq!(tree.active_count(), 0);
        // Pool never exceeds the peak working set: 10 leaves + 9 internal.
        assert!(
            tree.pooled_nodes() <= 19,
            "node pool should be bounded, got {}",
            tree.pooled_nodes()
        );
    }

    #[test]
    fn test_enlarged_bb_follows_velocity() {
        let bounds = LeafBounds {
            bb: Aabb::from_edges(0.0, 0.0, 1.0, 1.0),
            velocity: Vec2::new(10.0, 0.0),
            use_velocity: true,
        };
        let fat = BbTree::enlarged_bb(&bounds);
        // Expanded forward by v*0.1 = 1.0, backward only by the size margin.
        assert_eq!(fat.upper.x, 2.0);
        assert_eq!(fat.lower.x, -0.1);
        assert_eq!(fat.lower.y, -0.1);
        assert_eq!(fat.upper.y, 1.1);
    }

    #[test]
    fn test_validate_detects_clean_tree() {
        let mut tree = BbTree::new();
        for i in 0..32u32 {
            tree.insert_active(1000 + i, unit_bounds((i % 8) as Float * 3.0, (i / 8) as Float * 3.0));
        }
        tree.validate();
    }
}
