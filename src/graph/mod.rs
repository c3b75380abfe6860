//! The reference graph: node arena, anchor storage, and shortcut pool.
//!
//! `RefGraph` owns the three pools and every invariant-preserving mutation on
//! them. Higher layers (`GcRuntime`, `GarbageProcessor`) never touch a pool
//! directly; they go through the operations here so that safe-anchor state
//! and shortcut membership stay consistent with the anchor sets.

pub(crate) mod anchors;
pub mod node;
pub mod shortcut;

use crate::config::GcConfig;
use crate::graph::anchors::{AnchorCursor, ChunkPool};
use crate::graph::node::{Node, NodeId, SafeAnchorState};
use crate::graph::shortcut::Shortcut;
use crate::pool::SlotPool;
use crate::stats::GcStats;

/// Arena-backed reference graph shared by the counter and the collector.
#[derive(Debug)]
pub(crate) struct RefGraph {
    /// Per-object metadata records.
    pub(crate) nodes: SlotPool<Node>,
    /// Backing store for multi-anchor sets.
    pub(crate) chunks: ChunkPool,
    /// Path-compression records.
    pub(crate) shortcuts: SlotPool<Shortcut>,
    /// Tuning knobs (shortcut thresholds, verification).
    pub(crate) config: GcConfig,
    /// Shared counters.
    pub(crate) stats: GcStats,
}

impl RefGraph {
    pub(crate) fn new(config: GcConfig) -> Self {
        Self {
            nodes: SlotPool::with_capacity(config.initial_node_capacity),
            chunks: ChunkPool::with_capacity(config.initial_chunk_capacity),
            shortcuts: SlotPool::with_capacity(config.initial_shortcut_capacity),
            config,
            stats: GcStats::new(),
        }
    }

    // =========================================================================
    // Node access
    // =========================================================================

    pub(crate) fn register(&mut self) -> NodeId {
        NodeId::from_index(self.nodes.allocate(Node::new()))
    }

    #[inline]
    pub(crate) fn node(&self, id: NodeId) -> &Node {
        self.nodes.get(id.index())
    }

    #[inline]
    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.nodes.get_mut(id.index())
    }

    /// Release a destroyed node's arena slot.
    pub(crate) fn release(&mut self, id: NodeId) {
        debug_assert!(self.node(id).is_destroyed(), "releasing a live node");
        self.nodes.free(id.index());
    }

    // =========================================================================
    // Anchor sets
    // =========================================================================

    /// Add `owner` to `referent`'s anchor set.
    pub(crate) fn add_anchor(&mut self, referent: NodeId, owner: NodeId) {
        let mut slot = self.node(referent).anchors;
        anchors::add(&mut slot, &mut self.chunks, owner);
        self.node_mut(referent).anchors = slot;
    }

    /// Remove one `owner` entry from `referent`'s anchor set, repairing
    /// safe-anchor state if the front entry was removed.
    ///
    /// Returns whether an entry was removed. With `must_exist`, absence
    /// panics (the caller asserted the edge exists).
    pub(crate) fn remove_anchor(
        &mut self,
        referent: NodeId,
        owner: NodeId,
        must_exist: bool,
    ) -> bool {
        let mut slot = self.node(referent).anchors;
        let removed = anchors::remove(&mut slot, &mut self.chunks, owner, must_exist);
        self.node_mut(referent).anchors = slot;
        match removed {
            None => false,
            Some(0) => {
                self.on_safe_anchor_severed(referent, owner);
                true
            }
            Some(_) => true,
        }
    }

    /// Remove every `owner` entry from `referent`'s anchor set (multiset
    /// semantics). Returns whether anything was removed.
    pub(crate) fn remove_matching_anchors(&mut self, referent: NodeId, owner: NodeId) -> bool {
        let had_front = self.safe_anchor_of(referent) == Some(owner);
        let mut slot = self.node(referent).anchors;
        let removed = anchors::remove_all_matching(&mut slot, &mut self.chunks, owner);
        self.node_mut(referent).anchors = slot;
        if removed && had_front {
            self.on_safe_anchor_severed(referent, owner);
        }
        removed
    }

    /// Whether `owner` is recorded as an anchor of `referent`.
    pub(crate) fn has_anchor(&self, referent: NodeId, owner: NodeId) -> bool {
        anchors::contains(self.node(referent).anchors, &self.chunks, owner)
    }

    /// Number of anchors of `referent`.
    pub(crate) fn anchor_count(&self, referent: NodeId) -> usize {
        anchors::count(self.node(referent).anchors, &self.chunks)
    }

    /// Cursor over `referent`'s anchors.
    pub(crate) fn anchor_cursor(&self, referent: NodeId) -> AnchorCursor {
        AnchorCursor::start(self.node(referent).anchors)
    }

    /// Release the anchor storage of a node being destroyed.
    pub(crate) fn clear_anchors(&mut self, referent: NodeId) {
        let mut slot = self.node(referent).anchors;
        anchors::clear(&mut slot, &mut self.chunks);
        let node = self.node_mut(referent);
        node.anchors = slot;
        node.safe_anchor = SafeAnchorState::NoAnchor;
    }

    // =========================================================================
    // Safe anchors
    // =========================================================================

    /// The front anchor, if any (the designated safe anchor when the node's
    /// state says one is known).
    #[inline]
    pub(crate) fn safe_anchor_of(&self, id: NodeId) -> Option<NodeId> {
        anchors::front(self.node(id).anchors, &self.chunks)
    }

    /// The proven safe anchor of a chain member; panics if none is known.
    #[inline]
    pub(crate) fn proven_safe_anchor(&self, id: NodeId) -> NodeId {
        debug_assert!(
            self.node(id).safe_anchor.has_safe_anchor(),
            "node {id} has no proven safe anchor"
        );
        self.safe_anchor_of(id)
            .unwrap_or_else(|| panic!("node {id} has a safe-anchor state but no anchors"))
    }

    /// Record `anchor` as the proven safe anchor of `id`.
    ///
    /// Moves it to the front of the anchor set and downgrades the node to
    /// `Direct` (any chain membership must already be invalid).
    pub(crate) fn set_safe_anchor(&mut self, id: NodeId, anchor: NodeId) {
        debug_assert!(
            !self.chain_is_valid(self.node(id).safe_anchor),
            "rewriting the safe anchor of a live chain member {id}"
        );
        let mut slot = self.node(id).anchors;
        anchors::promote_to_front(&mut slot, &mut self.chunks, anchor);
        let node = self.node_mut(id);
        node.anchors = slot;
        node.safe_anchor = SafeAnchorState::Direct;
    }

    /// Forget everything known about `id`'s path to a root.
    #[inline]
    pub(crate) fn invalidate_safe_anchor(&mut self, id: NodeId) {
        self.node_mut(id).safe_anchor = SafeAnchorState::NoAnchor;
    }

    /// Drop chain membership but keep the safe anchor (the front entry is
    /// still proven to lead toward a root).
    #[inline]
    pub(crate) fn demote_to_direct(&mut self, id: NodeId) {
        self.node_mut(id).safe_anchor = SafeAnchorState::Direct;
    }

    /// Whether a safe-anchor state names a currently-valid shortcut.
    #[inline]
    pub(crate) fn chain_is_valid(&self, state: SafeAnchorState) -> bool {
        match state {
            SafeAnchorState::Chain(sid) => self.shortcut(sid).is_valid(),
            _ => false,
        }
    }

    /// Repair state after the front (safe-anchor) entry was removed.
    ///
    /// Cutting the safe edge of a chain member breaks the chain at that
    /// member, so the member's shortcut is split there; a `Direct` node just
    /// loses its proof.
    fn on_safe_anchor_severed(&mut self, referent: NodeId, removed: NodeId) {
        match self.node(referent).safe_anchor {
            SafeAnchorState::NoAnchor => {}
            SafeAnchorState::Direct => self.invalidate_safe_anchor(referent),
            SafeAnchorState::Chain(sid) => self.split_shortcut(sid, removed, referent),
        }
    }

    // =========================================================================
    // Test support
    // =========================================================================

    /// Collect the anchors of `id` in iteration order.
    #[cfg(test)]
    pub(crate) fn anchors_of(&self, id: NodeId) -> Vec<NodeId> {
        let mut cursor = self.anchor_cursor(id);
        let mut out = Vec::new();
        while let Some(a) = cursor.next(&self.chunks) {
            out.push(a);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> RefGraph {
        RefGraph::new(GcConfig::testing())
    }

    #[test]
    fn test_register_and_anchor_round_trip() {
        let mut g = graph();
        let a = g.register();
        let b = g.register();

        g.add_anchor(b, a);
        assert!(g.has_anchor(b, a));
        assert_eq!(g.anchor_count(b), 1);
        assert_eq!(g.safe_anchor_of(b), Some(a));

        assert!(g.remove_anchor(b, a, true));
        assert!(!g.has_anchor(b, a));
        assert_eq!(g.anchor_count(b), 0);
    }

    #[test]
    fn test_severed_front_drops_direct_proof() {
        let mut g = graph();
        let a = g.register();
        let b = g.register();
        let c = g.register();

        g.add_anchor(c, a);
        g.add_anchor(c, b);
        g.set_safe_anchor(c, a);
        assert_eq!(g.node(c).safe_anchor, SafeAnchorState::Direct);

        g.remove_anchor(c, a, true);
        assert_eq!(g.node(c).safe_anchor, SafeAnchorState::NoAnchor);
        assert!(g.has_anchor(c, b));
    }

    #[test]
    fn test_severed_non_front_keeps_proof() {
        let mut g = graph();
        let a = g.register();
        let b = g.register();
        let c = g.register();

        g.add_anchor(c, a);
        g.add_anchor(c, b);
        g.set_safe_anchor(c, a);

        g.remove_anchor(c, b, true);
        assert_eq!(g.node(c).safe_anchor, SafeAnchorState::Direct);
        assert_eq!(g.safe_anchor_of(c), Some(a));
    }

    #[test]
    fn test_remove_matching_severs_proof_once() {
        let mut g = graph();
        let a = g.register();
        let b = g.register();
        let c = g.register();

        g.add_anchor(c, a);
        g.add_anchor(c, b);
        g.add_anchor(c, a);
        g.set_safe_anchor(c, a);

        assert!(g.remove_matching_anchors(c, a));
        assert_eq!(g.node(c).safe_anchor, SafeAnchorState::NoAnchor);
        assert_eq!(g.anchor_count(c), 1);
    }

    #[test]
    fn test_clear_anchors_resets_state() {
        let mut g = graph();
        let a = g.register();
        let c = g.register();
        for _ in 0..10 {
            g.add_anchor(c, a);
        }
        g.clear_anchors(c);
        assert_eq!(g.anchor_count(c), 0);
        assert_eq!(g.chunks.live_count(), 0);
        assert_eq!(g.node(c).safe_anchor, SafeAnchorState::NoAnchor);
    }
}
