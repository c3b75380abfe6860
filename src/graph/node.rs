//! Per-object reference-tracking metadata.
//!
//! One `Node` exists per tracked host object, addressed by `NodeId` into the
//! node arena. The node never owns the object; it owns only the bookkeeping
//! the collector needs: the root-reference count, a handful of state flags,
//! the anchor-set storage word, and the safe-anchor/shortcut state.

use crate::graph::shortcut::ShortcutId;

/// Handle to a tracked node in the node arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    /// Build a handle from a raw arena index.
    #[inline]
    pub fn from_index(index: u32) -> Self {
        NodeId(index)
    }

    /// The raw arena index.
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where (if anywhere) a node's safe anchor lives.
///
/// The *safe anchor* is the one incoming reference known to lie on a chain
/// toward a root; it is always stored at the front of the anchor set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafeAnchorState {
    /// No anchor is known to reach a root; detection must search.
    NoAnchor,
    /// The front anchor is proven safe, but the node is not on a compressed
    /// chain (the chain was too short, or was invalidated).
    Direct,
    /// The node is a member of the compressed chain with this id; the front
    /// anchor is the next node along the chain.
    Chain(ShortcutId),
}

impl SafeAnchorState {
    /// Whether any safe anchor is known.
    #[inline]
    pub fn has_safe_anchor(self) -> bool {
        !matches!(self, SafeAnchorState::NoAnchor)
    }

    /// The shortcut id, if the node is a chain member.
    #[inline]
    pub fn chain(self) -> Option<ShortcutId> {
        match self {
            SafeAnchorState::Chain(id) => Some(id),
            _ => None,
        }
    }
}

/// Anchor-set storage word, switched by cardinality.
///
/// Empty and single-anchor nodes need no pool storage; multi-anchor nodes
/// point into the chunk pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AnchorSlot {
    /// No incoming references.
    Empty,
    /// Exactly one incoming reference, stored inline.
    Single(NodeId),
    /// Two or more incoming references, in the chunk pool.
    Multi(u32),
}

/// Reference-tracking metadata for one host object.
#[derive(Debug)]
pub struct Node {
    /// Count of direct (stack/global/JNI) references.
    ///
    /// Full-width signed so that underflow is detectable rather than wrapped
    /// into flag bits. Never negative for a live trackable node.
    pub(crate) root_ref_count: i32,

    /// Participates in the anchor graph.
    ///
    /// Cleared when the node is destroyed; objects outside the tracked region
    /// never set it.
    pub(crate) trackable: bool,

    /// Tentatively or finally unreachable.
    ///
    /// Set during a survival-path search; cleared by backtracking within the
    /// same pass. After a pass completes, a set flag is a final verdict.
    pub(crate) garbage: bool,

    /// Queued on the unstable worklist.
    pub(crate) unstable: bool,

    /// Visible to threads other than its allocator.
    ///
    /// Mutations of published nodes run under the host's `MutationLock`.
    pub(crate) published: bool,

    /// Safe-anchor / shortcut-membership state.
    pub(crate) safe_anchor: SafeAnchorState,

    /// Incoming-edge storage.
    pub(crate) anchors: AnchorSlot,
}

impl Node {
    pub(crate) fn new() -> Self {
        Self {
            root_ref_count: 0,
            trackable: true,
            garbage: false,
            unstable: false,
            published: false,
            safe_anchor: SafeAnchorState::NoAnchor,
            anchors: AnchorSlot::Empty,
        }
    }

    /// Current root-reference count.
    #[inline]
    pub fn root_ref_count(&self) -> i32 {
        self.root_ref_count
    }

    #[inline]
    pub(crate) fn increment_root_refs(&mut self) -> i32 {
        self.root_ref_count += 1;
        self.root_ref_count
    }

    #[inline]
    pub(crate) fn decrement_root_refs(&mut self) -> i32 {
        assert!(
            self.root_ref_count > 0,
            "root ref-count underflow (count={}, garbage={})",
            self.root_ref_count,
            self.garbage
        );
        self.root_ref_count -= 1;
        self.root_ref_count
    }

    /// Whether the node participates in the anchor graph.
    #[inline]
    pub fn is_trackable(&self) -> bool {
        self.trackable
    }

    /// Whether the node is (tentatively or finally) garbage-marked.
    #[inline]
    pub fn is_garbage(&self) -> bool {
        self.garbage
    }

    /// Whether the node has been destroyed (garbage and detached).
    #[inline]
    pub fn is_destroyed(&self) -> bool {
        self.garbage && !self.trackable
    }

    /// Whether the node is queued for garbage detection.
    #[inline]
    pub fn is_unstable(&self) -> bool {
        self.unstable
    }

    /// Whether the node is visible outside its allocating thread.
    #[inline]
    pub fn is_published(&self) -> bool {
        self.published
    }

    /// Safe-anchor state.
    #[inline]
    pub fn safe_anchor_state(&self) -> SafeAnchorState {
        self.safe_anchor
    }

    /// Whether any incoming reference is recorded.
    #[inline]
    pub fn has_anchors(&self) -> bool {
        !matches!(self.anchors, AnchorSlot::Empty)
    }

    /// Whether the node is anchored at all: a positive root count or at least
    /// one incoming reference.
    #[inline]
    pub fn is_anchored(&self) -> bool {
        self.root_ref_count > 0 || self.has_anchors()
    }

    /// Whether the node needs garbage detection: no root reference and no
    /// proven safe anchor.
    #[inline]
    pub fn is_unsafe(&self) -> bool {
        self.root_ref_count <= 0 && !self.safe_anchor.has_safe_anchor()
    }

    #[inline]
    pub(crate) fn mark_garbage(&mut self) {
        self.garbage = true;
    }

    #[inline]
    pub(crate) fn unmark_garbage(&mut self) {
        self.garbage = false;
    }

    #[inline]
    pub(crate) fn mark_destroyed(&mut self) {
        debug_assert!(self.garbage, "destroying a node that is not garbage");
        debug_assert!(self.trackable, "double destroy");
        self.trackable = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_node_state() {
        let node = Node::new();
        assert_eq!(node.root_ref_count(), 0);
        assert!(node.is_trackable());
        assert!(!node.is_garbage());
        assert!(!node.has_anchors());
        assert!(node.is_unsafe());
        assert!(!node.is_anchored());
        assert_eq!(node.safe_anchor_state(), SafeAnchorState::NoAnchor);
    }

    #[test]
    fn test_root_count_round_trip() {
        let mut node = Node::new();
        assert_eq!(node.increment_root_refs(), 1);
        assert_eq!(node.increment_root_refs(), 2);
        assert!(node.is_anchored());
        assert!(!node.is_unsafe());
        assert_eq!(node.decrement_root_refs(), 1);
        assert_eq!(node.decrement_root_refs(), 0);
        assert!(node.is_unsafe());
    }

    #[test]
    #[should_panic(expected = "underflow")]
    fn test_root_count_underflow_panics() {
        let mut node = Node::new();
        node.decrement_root_refs();
    }

    #[test]
    fn test_destroy_lifecycle() {
        let mut node = Node::new();
        node.mark_garbage();
        assert!(node.is_garbage());
        assert!(!node.is_destroyed());
        node.mark_destroyed();
        assert!(node.is_destroyed());
    }

    #[test]
    fn test_safe_anchor_state_queries() {
        assert!(!SafeAnchorState::NoAnchor.has_safe_anchor());
        assert!(SafeAnchorState::Direct.has_safe_anchor());
        let id = ShortcutId::from_index(4);
        assert!(SafeAnchorState::Chain(id).has_safe_anchor());
        assert_eq!(SafeAnchorState::Chain(id).chain(), Some(id));
        assert_eq!(SafeAnchorState::Direct.chain(), None);
    }
}
