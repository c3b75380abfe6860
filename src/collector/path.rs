//! Survival-path search.
//!
//! The search answers one question: does a path of incoming references lead
//! from a suspect node to a root-referenced node? It walks the anchor sets
//! depth-first with an explicit stack of resumable cursors, never recursion,
//! and it exploits shortcuts: reaching a chain member costs one jump to the
//! chain's anchor instead of one hop per member.
//!
//! Nodes are garbage-marked tentatively as they are descended into. A failed
//! search leaves every visited node marked (that is the proof of garbage); a
//! successful search unmarks its suffix of the batch list and compresses the
//! discovered path into shortcut records for the next search.
//!
//! Two tracing subtleties:
//! - a jumped-through chain is marked `in_tracing` so a cycle that re-enters
//!   it is recognized (and, below the entry point, carved off);
//! - when a jump's far side turns out to be dead, the chain is shrunk back to
//!   the entry point and the walk falls back to node-by-node exploration of
//!   the members it skipped.

use std::sync::atomic::Ordering;

use smallvec::SmallVec;

use crate::graph::anchors::AnchorCursor;
use crate::graph::node::NodeId;
use crate::graph::shortcut::ShortcutId;
use crate::graph::RefGraph;

/// One resumable position on the search stack.
#[derive(Debug)]
enum TraceStep {
    /// Iterating the anchors of a garbage-marked node.
    Anchors { node: NodeId, cursor: AnchorCursor },
    /// One-shot jump from chain member `entry` to the chain's anchor.
    Jump {
        shortcut: ShortcutId,
        entry: NodeId,
        consumed: bool,
    },
}

/// One segment of a discovered survival path, bottom (suspect) to top (root).
#[derive(Debug, Clone, Copy)]
enum PathElem {
    /// A single node walked directly.
    Node(NodeId),
    /// An existing chain jumped through, entered at `entry`.
    Chain(ShortcutId, NodeId),
}

/// Reusable survival-path search state.
#[derive(Debug, Default)]
pub(crate) struct PathTracer {
    stack: SmallVec<[TraceStep; 16]>,
    /// Chains marked `in_tracing` by the current search.
    tracked: SmallVec<[ShortcutId; 8]>,
    /// Rooted node that ended a successful search.
    found_root: Option<NodeId>,
}

impl PathTracer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Search for a survival path from `seed`.
    ///
    /// Nodes garbage-marked by the search are appended to `garbage`; on
    /// success the suffix added by this call is unmarked and removed again,
    /// and the found path is compressed into shortcuts. The strong variant
    /// demands a root count above the configured threshold instead of above
    /// zero.
    pub(crate) fn scan(
        &mut self,
        graph: &mut RefGraph,
        seed: NodeId,
        strong: bool,
        garbage: &mut Vec<NodeId>,
    ) -> bool {
        debug_assert!(self.stack.is_empty());
        debug_assert!(!graph.node(seed).is_garbage(), "re-scanning garbage {seed}");
        debug_assert!(graph.node(seed).is_trackable());

        let watermark = garbage.len();
        let survived = self.find(graph, seed, strong, garbage);

        if survived {
            for &n in &garbage[watermark..] {
                graph.node_mut(n).unmark_garbage();
            }
            garbage.truncate(watermark);
        }
        for sid in self.tracked.drain(..) {
            if graph.shortcuts.is_live(sid.index()) {
                graph.clear_shortcut_in_tracing(sid);
            }
        }
        if survived {
            self.construct_shortcut(graph);
        }
        self.stack.clear();
        graph.stats.record_search(survived);
        if graph.config.trace {
            eprintln!(
                "gc scan {seed}: {}",
                if survived { "survived" } else { "garbage" }
            );
        }
        survived
    }

    // =========================================================================
    // The search proper
    // =========================================================================

    fn find(
        &mut self,
        graph: &mut RefGraph,
        seed: NodeId,
        strong: bool,
        garbage: &mut Vec<NodeId>,
    ) -> bool {
        let root_floor = if strong {
            graph.config.strong_root_threshold
        } else {
            0
        };
        self.found_root = None;

        graph.node_mut(seed).mark_garbage();
        garbage.push(seed);
        self.stack.push(TraceStep::Anchors {
            node: seed,
            cursor: graph.anchor_cursor(seed),
        });

        loop {
            let next = match self.stack.last_mut() {
                Some(TraceStep::Anchors { cursor, .. }) => cursor.next(&graph.chunks),
                Some(TraceStep::Jump {
                    shortcut, consumed, ..
                }) => {
                    if *consumed {
                        None
                    } else {
                        *consumed = true;
                        Some(graph.shortcut(*shortcut).anchor())
                    }
                }
                None => unreachable!("trace stack underflow"),
            };

            let Some(r) = next else {
                // Dead end: every incoming path of the top position is dead.
                let popped = self.stack.pop().expect("trace stack underflow");
                if let TraceStep::Jump {
                    shortcut, entry, ..
                } = popped
                {
                    self.fail_jump(graph, shortcut, entry, garbage);
                    continue;
                }
                if self.stack.is_empty() {
                    return false;
                }
                continue;
            };

            graph.stats.record_anchor_visit();
            if graph.node(r).is_garbage() {
                continue;
            }
            // A member of a chain we are currently jumping through closes a
            // cycle; below the entry point the check also carves the chain.
            if let Some(sid) = graph.node(r).safe_anchor.chain() {
                if graph.shortcut(sid).is_valid() && graph.in_contiguous_tracing(sid, r) {
                    continue;
                }
            }
            if graph.node(r).root_ref_count() > root_floor {
                self.found_root = Some(r);
                return true;
            }
            // Membership may have been rewritten by the carve above.
            match graph.node(r).safe_anchor.chain() {
                Some(sid)
                    if graph.shortcut(sid).is_valid()
                        && graph.shortcut(sid).in_tracing.is_none() =>
                {
                    graph.mark_shortcut_in_tracing(sid, r);
                    self.tracked.push(sid);
                    graph.stats.shortcut_jumps.fetch_add(1, Ordering::Relaxed);
                    self.stack.push(TraceStep::Jump {
                        shortcut: sid,
                        entry: r,
                        consumed: false,
                    });
                }
                _ => {
                    graph.node_mut(r).mark_garbage();
                    garbage.push(r);
                    self.stack.push(TraceStep::Anchors {
                        node: r,
                        cursor: graph.anchor_cursor(r),
                    });
                }
            }
        }
    }

    /// A jump's far side proved dead. Shrink the chain back to the entry
    /// point (its old anchor is garbage) and fall back to exploring the entry
    /// node's own anchors, member by member.
    fn fail_jump(
        &mut self,
        graph: &mut RefGraph,
        shortcut: ShortcutId,
        entry: NodeId,
        garbage: &mut Vec<NodeId>,
    ) {
        graph.clear_shortcut_in_tracing(shortcut);
        if let Some(pos) = self.tracked.iter().position(|&s| s == shortcut) {
            self.tracked.swap_remove(pos);
        }
        graph.shrink_shortcut_anchor_to(shortcut, entry);

        graph.node_mut(entry).mark_garbage();
        garbage.push(entry);
        self.stack.push(TraceStep::Anchors {
            node: entry,
            cursor: graph.anchor_cursor(entry),
        });
    }

    // =========================================================================
    // Path compression
    // =========================================================================

    /// Compress the discovered path (still on the stack) into shortcuts.
    ///
    /// Plain runs between jumped-through chains are absorbed into those
    /// chains where the length cap allows, otherwise compressed into fresh
    /// records chunked at the maximum length.
    fn construct_shortcut(&mut self, graph: &mut RefGraph) {
        let root = self
            .found_root
            .take()
            .expect("constructing a path without a root");
        let mut elems: Vec<PathElem> = self
            .stack
            .iter()
            .map(|step| match step {
                TraceStep::Anchors { node, .. } => PathElem::Node(*node),
                TraceStep::Jump {
                    shortcut, entry, ..
                } => PathElem::Chain(*shortcut, *entry),
            })
            .collect();
        elems.push(PathElem::Node(root));

        // Wire safe anchors across every segment boundary.
        for k in 0..elems.len() - 1 {
            let lo_top = match elems[k] {
                PathElem::Node(n) => n,
                PathElem::Chain(sid, _) => graph.shortcut(sid).anchor(),
            };
            let hi_bot = match elems[k + 1] {
                PathElem::Node(n) => n,
                PathElem::Chain(_, entry) => entry,
            };
            if lo_top != hi_bot && !graph.chain_is_valid(graph.node(lo_top).safe_anchor) {
                graph.set_safe_anchor(lo_top, hi_bot);
            }
        }

        // Compress each maximal run of plain nodes.
        let max = graph.config.max_shortcut_length as usize;
        let mut i = 0;
        while i < elems.len() {
            if matches!(elems[i], PathElem::Chain(..)) {
                i += 1;
                continue;
            }
            let mut j = i;
            let mut run: SmallVec<[NodeId; 16]> = SmallVec::new();
            while j < elems.len() {
                match elems[j] {
                    PathElem::Node(n) => run.push(n),
                    PathElem::Chain(..) => break,
                }
                j += 1;
            }
            let above = match elems.get(j) {
                Some(&PathElem::Chain(sid, entry)) => Some((sid, entry)),
                _ => None,
            };
            let below = if i > 0 {
                match elems[i - 1] {
                    PathElem::Chain(sid, _) => Some(sid),
                    _ => None,
                }
            } else {
                None
            };
            Self::compress_run(graph, &run, below, above, max);
            i = j;
        }
    }

    /// Compress one plain run, preferring absorption into a neighbor chain.
    ///
    /// `run` lists the nodes bottom to top; `above` carries the chain jumped
    /// through right above the run and the member it was entered at.
    fn compress_run(
        graph: &mut RefGraph,
        run: &[NodeId],
        below: Option<ShortcutId>,
        above: Option<(ShortcutId, NodeId)>,
        max: usize,
    ) {
        if !graph.config.enable_shortcuts || run.is_empty() {
            return;
        }
        if let Some((sid, entry)) = above {
            // Absorption is linear only when the jump entered the chain at
            // its tail; entering mid-span, the members below the entry still
            // ride this record and the run cannot join it.
            if graph.shortcut(sid).tail == entry && chain_len(graph, sid) + run.len() <= max {
                graph.extend_shortcut_tail(sid, run[0]);
                return;
            }
        }
        if let Some(below) = below {
            if run.len() > 1 && chain_len(graph, below) + run.len() - 1 <= max {
                graph.extend_shortcut_anchor(below, run[run.len() - 1]);
                return;
            }
        }
        // No neighbor absorbs the run: cut records within it, at most `max`
        // members each. A chain entry above the run caps the topmost record,
        // letting the whole run enroll; otherwise the run's own top node
        // serves as that record's exclusive anchor.
        let mut s = 0;
        loop {
            let e = (s + max).min(run.len());
            if e < run.len() {
                graph.create_shortcut(run[e], run[s], (e - s) as u32, false);
                s = e;
                continue;
            }
            match above {
                Some((_, entry)) => {
                    graph.create_shortcut(entry, run[s], (e - s) as u32, false);
                }
                None if e - s >= 2 => {
                    graph.create_shortcut(run[e - 1], run[s], (e - 1 - s) as u32, false);
                }
                None => {}
            }
            break;
        }
    }
}

/// Current member count of a chain.
fn chain_len(graph: &RefGraph, id: ShortcutId) -> usize {
    let anchor = graph.shortcut(id).anchor();
    let mut node = graph.shortcut(id).tail;
    let mut len = 0;
    while node != anchor {
        len += 1;
        node = graph.proven_safe_anchor(node);
    }
    len
}
