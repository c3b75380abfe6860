//! Structural invariant checking.
//!
//! `verify_graph` cross-checks the collector's bookkeeping against the host's
//! own edge table: every recorded anchor must correspond to a real reference
//! and vice versa, every safe-anchor state must be backed by storage, and
//! every shortcut must walk cleanly from its tail to its anchor. Linear in
//! the heap; meant for tests and debug builds, not steady-state production
//! use.
//!
//! Checks assume a quiescent graph (between mutations and outside a
//! collection batch): tentative garbage marks and `in_tracing` marks are
//! reported as corruption.

use rustc_hash::FxHashMap;

use crate::graph::node::{AnchorSlot, NodeId};
use crate::graph::shortcut::ShortcutId;
use crate::graph::RefGraph;
use crate::host::ObjectGraph;

/// A violated structural invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    /// The anchor multiset of a node disagrees with the host's edge table.
    AnchorMismatch {
        /// Referencing node.
        owner: NodeId,
        /// Referenced node.
        referent: NodeId,
        /// Edges the host reports.
        host_edges: usize,
        /// Anchor entries recorded.
        recorded: usize,
    },
    /// A node claims a safe anchor but its anchor set is empty.
    SafeAnchorWithoutAnchors(NodeId),
    /// A node carries a chain id whose record no longer exists.
    StaleChainId {
        /// The mis-labelled node.
        node: NodeId,
        /// The dangling id.
        shortcut: ShortcutId,
    },
    /// A chain walk visited a node not enrolled in the chain.
    ChainMembershipMismatch {
        /// The record being walked.
        shortcut: ShortcutId,
        /// The foreign node encountered.
        node: NodeId,
    },
    /// A chain runs through a garbage-marked or destroyed node.
    ChainThroughGarbage {
        /// The record being walked.
        shortcut: ShortcutId,
        /// The dead member.
        node: NodeId,
    },
    /// A chain's anchor endpoint is enrolled in the chain itself.
    ChainAnchorEnrolled(ShortcutId),
    /// A chain walk did not reach the anchor.
    ChainUnterminated(ShortcutId),
    /// A tentative garbage mark survived outside a collection batch.
    GarbageNotReclaimed(NodeId),
    /// An `in_tracing` mark survived outside a search.
    TracingMarkLeaked(ShortcutId),
}

impl std::fmt::Display for VerifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerifyError::AnchorMismatch {
                owner,
                referent,
                host_edges,
                recorded,
            } => write!(
                f,
                "anchor mismatch for edge {owner} -> {referent}: host reports {host_edges}, {recorded} recorded"
            ),
            VerifyError::SafeAnchorWithoutAnchors(node) => {
                write!(f, "node {node} has a safe-anchor state but no anchors")
            }
            VerifyError::StaleChainId { node, shortcut } => {
                write!(f, "node {node} references dead shortcut {shortcut}")
            }
            VerifyError::ChainMembershipMismatch { shortcut, node } => {
                write!(f, "shortcut {shortcut} runs through non-member {node}")
            }
            VerifyError::ChainThroughGarbage { shortcut, node } => {
                write!(f, "shortcut {shortcut} runs through dead node {node}")
            }
            VerifyError::ChainAnchorEnrolled(shortcut) => {
                write!(f, "shortcut {shortcut} anchor is enrolled in itself")
            }
            VerifyError::ChainUnterminated(shortcut) => {
                write!(f, "shortcut {shortcut} walk does not reach its anchor")
            }
            VerifyError::GarbageNotReclaimed(node) => {
                write!(f, "node {node} is garbage-marked outside a batch")
            }
            VerifyError::TracingMarkLeaked(shortcut) => {
                write!(f, "shortcut {shortcut} is still marked in-tracing")
            }
        }
    }
}

impl std::error::Error for VerifyError {}

/// Check every structural invariant of `graph` against `host`.
pub(crate) fn verify_graph<G: ObjectGraph + ?Sized>(
    graph: &RefGraph,
    host: &G,
) -> Result<(), VerifyError> {
    verify_anchor_symmetry(graph, host)?;
    verify_node_states(graph)?;
    verify_chains(graph)?;
    Ok(())
}

/// The anchor multiset of every node must equal the host's edge table.
fn verify_anchor_symmetry<G: ObjectGraph + ?Sized>(
    graph: &RefGraph,
    host: &G,
) -> Result<(), VerifyError> {
    let mut host_edges: FxHashMap<(NodeId, NodeId), usize> = FxHashMap::default();
    for (idx, _) in graph.nodes.iter() {
        let owner = NodeId::from_index(idx);
        host.for_each_outgoing(owner, &mut |referent| {
            if referent != owner && graph.nodes.is_live(referent.index()) {
                *host_edges.entry((owner, referent)).or_default() += 1;
            }
        });
    }

    let mut recorded: FxHashMap<(NodeId, NodeId), usize> = FxHashMap::default();
    for (idx, _) in graph.nodes.iter() {
        let referent = NodeId::from_index(idx);
        let mut cursor = graph.anchor_cursor(referent);
        while let Some(owner) = cursor.next(&graph.chunks) {
            *recorded.entry((owner, referent)).or_default() += 1;
        }
    }

    for (&(owner, referent), &count) in &host_edges {
        let have = recorded.get(&(owner, referent)).copied().unwrap_or(0);
        if have != count {
            return Err(VerifyError::AnchorMismatch {
                owner,
                referent,
                host_edges: count,
                recorded: have,
            });
        }
    }
    for (&(owner, referent), &have) in &recorded {
        if !host_edges.contains_key(&(owner, referent)) {
            return Err(VerifyError::AnchorMismatch {
                owner,
                referent,
                host_edges: 0,
                recorded: have,
            });
        }
    }
    Ok(())
}

/// Per-node flag and state consistency.
fn verify_node_states(graph: &RefGraph) -> Result<(), VerifyError> {
    for (idx, node) in graph.nodes.iter() {
        let id = NodeId::from_index(idx);
        if node.is_garbage() {
            return Err(VerifyError::GarbageNotReclaimed(id));
        }
        if node.safe_anchor_state().has_safe_anchor()
            && matches!(node.anchors, AnchorSlot::Empty)
        {
            return Err(VerifyError::SafeAnchorWithoutAnchors(id));
        }
        if let Some(sid) = node.safe_anchor_state().chain() {
            if !graph.shortcuts.is_live(sid.index()) {
                return Err(VerifyError::StaleChainId { node: id, shortcut: sid });
            }
        }
    }
    Ok(())
}

/// Every shortcut must walk tail-to-anchor through enrolled, live members.
fn verify_chains(graph: &RefGraph) -> Result<(), VerifyError> {
    for (idx, record) in graph.shortcuts.iter() {
        let sid = ShortcutId::from_index(idx);
        if record.in_tracing.is_some() {
            return Err(VerifyError::TracingMarkLeaked(sid));
        }
        let Some(anchor) = record.anchor else {
            return Err(VerifyError::ChainUnterminated(sid));
        };
        let mut node = record.tail;
        let mut hops = 0usize;
        while node != anchor {
            let member = graph.node(node);
            if member.is_garbage() || !member.is_trackable() {
                return Err(VerifyError::ChainThroughGarbage { shortcut: sid, node });
            }
            if member.safe_anchor_state().chain() != Some(sid) {
                return Err(VerifyError::ChainMembershipMismatch { shortcut: sid, node });
            }
            match graph.safe_anchor_of(node) {
                Some(next) => node = next,
                None => return Err(VerifyError::ChainUnterminated(sid)),
            }
            hops += 1;
            if hops > graph.nodes.slot_count() {
                return Err(VerifyError::ChainUnterminated(sid));
            }
        }
        if graph.node(anchor).safe_anchor_state().chain() == Some(sid) {
            return Err(VerifyError::ChainAnchorEnrolled(sid));
        }
    }
    Ok(())
}
