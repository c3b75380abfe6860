//! Path-compressed safe-anchor chains.
//!
//! A shortcut summarizes a non-branching run of safe-anchor edges:
//!
//! ```text
//!   anchor <- m1 <- m2 <- ... <- tail
//! ```
//!
//! Every node from `tail` up to (but excluding) `anchor` is a *member* and
//! carries `SafeAnchorState::Chain(id)`; the anchor itself belongs to the
//! chain above, if any. A survival-path search that reaches a member jumps
//! straight to the anchor instead of walking the run node by node.
//!
//! Chains are maintained incrementally. Removing a member's safe edge splits
//! the record in two; segments at or below the minimum length are dissolved
//! back to `Direct` members. Records are deleted eagerly, so a live record is
//! almost always a valid one (`in_tracing` is the only transient state).

use std::sync::atomic::Ordering;

use crate::graph::node::{NodeId, SafeAnchorState};
use crate::graph::RefGraph;

/// Handle to a shortcut record in the shortcut pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShortcutId(u32);

impl ShortcutId {
    /// Build a handle from a raw pool index.
    #[inline]
    pub fn from_index(index: u32) -> Self {
        ShortcutId(index)
    }

    /// The raw pool index.
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for ShortcutId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "~{}", self.0)
    }
}

/// One compressed chain: anchor endpoint (exclusive) and tail (inclusive).
#[derive(Debug)]
pub(crate) struct Shortcut {
    /// Upper endpoint. `None` only for a record being dismantled.
    pub(crate) anchor: Option<NodeId>,
    /// Lower endpoint, always a member.
    pub(crate) tail: NodeId,
    /// Member currently on the search stack, if the chain was jumped through.
    pub(crate) in_tracing: Option<NodeId>,
}

impl Shortcut {
    pub(crate) fn new(anchor: NodeId, tail: NodeId) -> Self {
        Self {
            anchor: Some(anchor),
            tail,
            in_tracing: None,
        }
    }

    #[inline]
    pub(crate) fn is_valid(&self) -> bool {
        self.anchor.is_some()
    }

    /// The anchor endpoint of a valid record.
    #[inline]
    pub(crate) fn anchor(&self) -> NodeId {
        self.anchor.expect("reading the anchor of a dismantled shortcut")
    }
}

impl RefGraph {
    #[inline]
    pub(crate) fn shortcut(&self, id: ShortcutId) -> &Shortcut {
        self.shortcuts.get(id.index())
    }

    #[inline]
    pub(crate) fn shortcut_mut(&mut self, id: ShortcutId) -> &mut Shortcut {
        self.shortcuts.get_mut(id.index())
    }

    // =========================================================================
    // Creation and deletion
    // =========================================================================

    /// Compress the safe-anchor run from `tail` up to `anchor` into a new
    /// record, if shortcuts are enabled and `span` clears the minimum length.
    ///
    /// The run's safe anchors must already be wired; every member is switched
    /// to `Chain` membership. With `replace`, members may still carry a stale
    /// chain id from a record being dismantled.
    pub(crate) fn create_shortcut(
        &mut self,
        anchor: NodeId,
        tail: NodeId,
        span: u32,
        replace: bool,
    ) -> Option<ShortcutId> {
        if !self.config.enable_shortcuts || span <= self.config.min_shortcut_length {
            return None;
        }
        let id = ShortcutId::from_index(self.shortcuts.allocate(Shortcut::new(anchor, tail)));
        let mut node = tail;
        while node != anchor {
            debug_assert!(
                replace || !self.chain_is_valid(self.node(node).safe_anchor),
                "enrolling node {node} that is already on a live chain"
            );
            self.node_mut(node).safe_anchor = SafeAnchorState::Chain(id);
            node = self.proven_safe_anchor(node);
        }
        self.stats.shortcuts_created.fetch_add(1, Ordering::Relaxed);
        self.debug_validate_chain(id);
        Some(id)
    }

    /// Free a record whose members have all been demoted or destroyed.
    pub(crate) fn delete_shortcut(&mut self, id: ShortcutId) {
        self.shortcuts.free(id.index());
        self.stats.shortcuts_deleted.fetch_add(1, Ordering::Relaxed);
    }

    // =========================================================================
    // Endpoint adjustment
    // =========================================================================

    /// Grow the chain downward: enroll `new_tail` and everything between it
    /// and the current tail.
    pub(crate) fn extend_shortcut_tail(&mut self, id: ShortcutId, new_tail: NodeId) {
        let old_tail = self.shortcut(id).tail;
        let mut node = new_tail;
        while node != old_tail {
            self.node_mut(node).safe_anchor = SafeAnchorState::Chain(id);
            node = self.proven_safe_anchor(node);
        }
        self.shortcut_mut(id).tail = new_tail;
        self.stats.shortcuts_extended.fetch_add(1, Ordering::Relaxed);
        self.debug_validate_chain(id);
    }

    /// Grow the chain upward: the old anchor and everything up to (but not
    /// including) `new_anchor` become members.
    pub(crate) fn extend_shortcut_anchor(&mut self, id: ShortcutId, new_anchor: NodeId) {
        let mut node = self.shortcut(id).anchor();
        while node != new_anchor {
            self.node_mut(node).safe_anchor = SafeAnchorState::Chain(id);
            node = self.proven_safe_anchor(node);
        }
        self.shortcut_mut(id).anchor = Some(new_anchor);
        self.stats.shortcuts_extended.fetch_add(1, Ordering::Relaxed);
        self.debug_validate_chain(id);
    }

    /// Shrink from the anchor side: members from `new_anchor` (exclusive-to-be)
    /// up to the old anchor leave the chain. Deletes the record if the rest is
    /// too short.
    pub(crate) fn shrink_shortcut_anchor_to(&mut self, id: ShortcutId, new_anchor: NodeId) {
        debug_assert_eq!(self.node(new_anchor).safe_anchor.chain(), Some(id));
        debug_assert!(self.shortcut(id).in_tracing.is_none());
        let old_anchor = self.shortcut(id).anchor();
        let mut node = new_anchor;
        while node != old_anchor {
            self.demote_to_direct(node);
            node = self.proven_safe_anchor(node);
        }
        let tail = self.shortcut(id).tail;
        if self.clear_if_too_short(new_anchor, tail) {
            self.delete_shortcut(id);
        } else {
            self.shortcut_mut(id).anchor = Some(new_anchor);
            self.debug_validate_chain(id);
        }
    }

    /// Shrink from the tail side: members from the old tail up to (but not
    /// including) `new_tail` leave the chain. Deletes the record if the rest
    /// is too short, unless a jump in progress still holds it.
    pub(crate) fn shrink_shortcut_tail_to(&mut self, id: ShortcutId, new_tail: NodeId) {
        debug_assert_eq!(self.node(new_tail).safe_anchor.chain(), Some(id));
        let old_tail = self.shortcut(id).tail;
        let mut node = old_tail;
        while node != new_tail {
            self.demote_to_direct(node);
            node = self.proven_safe_anchor(node);
        }
        let anchor = self.shortcut(id).anchor();
        if self.shortcut(id).in_tracing.is_none() && self.clear_if_too_short(anchor, new_tail) {
            self.delete_shortcut(id);
        } else {
            self.shortcut_mut(id).tail = new_tail;
            self.debug_validate_chain(id);
        }
    }

    // =========================================================================
    // Splitting
    // =========================================================================

    /// Cut the chain at the severed safe edge `left_tail -> right_anchor`
    /// (the edge ran from member `right_anchor` up to `left_tail`).
    ///
    /// `right_anchor` loses its safe anchor entirely; each remaining segment
    /// either keeps a record or dissolves to `Direct` members, depending on
    /// its length.
    pub(crate) fn split_shortcut(&mut self, id: ShortcutId, left_tail: NodeId, right_anchor: NodeId) {
        debug_assert!(self.shortcut(id).is_valid());
        self.invalidate_safe_anchor(right_anchor);
        self.stats.shortcuts_split.fetch_add(1, Ordering::Relaxed);

        let anchor = self.shortcut(id).anchor();
        let tail = self.shortcut(id).tail;

        // Cut at the very top: only the lower segment remains.
        if left_tail == anchor {
            if self.clear_if_too_short(right_anchor, tail) {
                self.delete_shortcut(id);
            } else {
                self.shortcut_mut(id).anchor = Some(right_anchor);
                self.debug_validate_chain(id);
            }
            return;
        }

        // Cut at the very bottom: only the upper segment remains.
        if right_anchor == tail {
            if self.clear_if_too_short(anchor, left_tail) {
                self.delete_shortcut(id);
            } else {
                self.shortcut_mut(id).tail = left_tail;
                self.debug_validate_chain(id);
            }
            return;
        }

        let lower_dissolved = self.clear_if_too_short(right_anchor, tail);
        let upper_dissolved = self.clear_if_too_short(anchor, left_tail);
        match (upper_dissolved, lower_dissolved) {
            (true, true) => self.delete_shortcut(id),
            (true, false) => {
                self.shortcut_mut(id).anchor = Some(right_anchor);
                self.debug_validate_chain(id);
            }
            (false, true) => {
                self.shortcut_mut(id).tail = left_tail;
                self.debug_validate_chain(id);
            }
            (false, false) => {
                // Both halves are long enough; the lower one gets a fresh
                // record and the original keeps the upper.
                self.create_shortcut(
                    right_anchor,
                    tail,
                    self.config.min_shortcut_length + 1,
                    true,
                );
                self.shortcut_mut(id).tail = left_tail;
                self.debug_validate_chain(id);
            }
        }
    }

    /// Dissolve the run from `tail` up to `anchor` if it is at or below the
    /// minimum shortcut length, demoting its members to `Direct`.
    ///
    /// Returns whether the run was dissolved. Members keep their chain id
    /// when it was not.
    pub(crate) fn clear_if_too_short(&mut self, anchor: NodeId, tail: NodeId) -> bool {
        let mut budget = self.config.min_shortcut_length as i64;
        let mut node = tail;
        while node != anchor {
            budget -= 1;
            if budget < 0 {
                return false;
            }
            node = self.proven_safe_anchor(node);
        }
        let mut node = tail;
        while node != anchor {
            self.demote_to_direct(node);
            node = self.proven_safe_anchor(node);
        }
        true
    }

    // =========================================================================
    // Tracing marks
    // =========================================================================

    /// Mark the chain as jumped-through from member `entry`.
    #[inline]
    pub(crate) fn mark_shortcut_in_tracing(&mut self, id: ShortcutId, entry: NodeId) {
        debug_assert!(self.shortcut(id).in_tracing.is_none());
        self.shortcut_mut(id).in_tracing = Some(entry);
    }

    /// Clear the jumped-through mark.
    #[inline]
    pub(crate) fn clear_shortcut_in_tracing(&mut self, id: ShortcutId) {
        self.shortcut_mut(id).in_tracing = None;
    }

    /// Whether member `node` lies inside the span already consumed by the
    /// in-progress jump through this chain.
    ///
    /// A closed cycle can re-enter its own chain below the jump entry point.
    /// When that happens the untraced lower span is carved off into its own
    /// record (or dissolved) so the walk from `node` terminates, and the
    /// traced upper span keeps this record with its tail pulled up to the
    /// entry point.
    pub(crate) fn in_contiguous_tracing(&mut self, id: ShortcutId, node: NodeId) -> bool {
        let Some(entry) = self.shortcut(id).in_tracing else {
            return false;
        };
        if node == entry {
            return true;
        }
        let anchor = self.shortcut(id).anchor();
        let mut below_entry;
        let mut walk = node;
        loop {
            below_entry = walk;
            walk = self.proven_safe_anchor(walk);
            if walk == anchor {
                return true;
            }
            debug_assert_eq!(
                self.node(walk).safe_anchor.chain(),
                Some(id),
                "chain walk left shortcut {id} at {walk}"
            );
            if walk == entry {
                break;
            }
        }

        // The chain re-enters the traced span at `entry`. Detach everything
        // below it so searches starting there no longer ride this record.
        let tail = self.shortcut(id).tail;
        let mut span = 0u32;
        let mut n = tail;
        while n != below_entry {
            span += 1;
            n = self.proven_safe_anchor(n);
        }
        if span <= self.config.min_shortcut_length {
            // Too little below the entry for a record of its own.
            self.shrink_shortcut_tail_to(id, entry);
        } else {
            self.create_shortcut(below_entry, tail, self.config.min_shortcut_length + 1, true);
            self.demote_to_direct(below_entry);
            self.shortcut_mut(id).tail = entry;
            self.debug_validate_chain(id);
        }
        false
    }

    // =========================================================================
    // Validation
    // =========================================================================

    /// Walk the chain end to end, checking membership and endpoint state.
    pub(crate) fn debug_validate_chain(&self, id: ShortcutId) {
        if !cfg!(debug_assertions) {
            return;
        }
        let record = self.shortcut(id);
        let Some(anchor) = record.anchor else {
            return;
        };
        let mut node = record.tail;
        let mut hops = 0u32;
        while node != anchor {
            assert!(
                self.node(node).is_trackable(),
                "chain {id} runs through destroyed node {node}"
            );
            assert_eq!(
                self.node(node).safe_anchor.chain(),
                Some(id),
                "node {node} on chain {id} carries the wrong membership"
            );
            node = self.proven_safe_anchor(node);
            hops += 1;
            assert!(hops <= 1 << 24, "chain {id} does not terminate");
        }
        assert_ne!(
            self.node(anchor).safe_anchor.chain(),
            Some(id),
            "anchor {anchor} is enrolled in its own chain {id}"
        );
    }
}
