//! Garbage detection and reclamation.
//!
//! The processor owns the unstable worklist. A node lands there when a
//! mutation leaves it with neither a root reference nor a proven safe anchor;
//! a collection batch drains the list, runs a survival-path search per
//! suspect, and destroys whatever the searches condemned. Destruction severs
//! the dead node's outgoing edges, which can render further nodes unsafe and
//! refill the worklist, so the batch loops until the list stays empty.

pub(crate) mod path;

use std::collections::VecDeque;

use crate::collector::path::PathTracer;
use crate::graph::node::NodeId;
use crate::graph::RefGraph;
use crate::host::{ObjectGraph, ReclaimSink};
use crate::stats::GcTimer;

/// Worklist-driven garbage detector.
#[derive(Debug, Default)]
pub(crate) struct GarbageProcessor {
    /// Nodes awaiting a survival-path search.
    unstable: VecDeque<NodeId>,
    /// Condemned nodes of the current batch, in mark order.
    garbage: Vec<NodeId>,
    tracer: PathTracer,
}

impl GarbageProcessor {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queue `id` for detection if it is not already queued.
    ///
    /// Untracked and already-condemned nodes are never queued.
    pub(crate) fn enqueue_unstable(&mut self, graph: &mut RefGraph, id: NodeId) {
        let node = graph.node(id);
        if node.is_unstable() || node.is_garbage() || !node.is_trackable() {
            return;
        }
        graph.node_mut(id).unstable = true;
        self.unstable.push_back(id);
    }

    /// Number of nodes currently queued.
    pub(crate) fn pending(&self) -> usize {
        self.unstable.len()
    }

    // =========================================================================
    // Batch collection
    // =========================================================================

    /// Drain the unstable worklist, reclaiming every node whose search fails.
    ///
    /// Returns the number of nodes reclaimed.
    pub(crate) fn collect<G: ObjectGraph + ?Sized, S: ReclaimSink + ?Sized>(
        &mut self,
        graph: &mut RefGraph,
        host: &G,
        sink: &mut S,
    ) -> u64 {
        let timer = GcTimer::start("collect");
        let reclaimed = self.drain(graph, host, sink);
        graph.stats.record_collection(timer.stop(), reclaimed);
        maybe_verify(graph, host);
        reclaimed
    }

    /// Process the worklist until it stays empty.
    fn drain<G: ObjectGraph + ?Sized, S: ReclaimSink + ?Sized>(
        &mut self,
        graph: &mut RefGraph,
        host: &G,
        sink: &mut S,
    ) -> u64 {
        let mut reclaimed = 0u64;
        while let Some(id) = self.unstable.pop_front() {
            if !graph.nodes.is_live(id.index()) {
                continue;
            }
            let node = graph.node(id);
            if !node.is_unstable() {
                continue;
            }
            graph.node_mut(id).unstable = false;

            let node = graph.node(id);
            if node.is_garbage() || !node.is_trackable() {
                continue;
            }
            // The node may have regained a root or a proven anchor since it
            // was queued.
            if !node.is_unsafe() {
                continue;
            }
            self.tracer.scan(graph, id, false, &mut self.garbage);
            reclaimed += self.destroy_condemned(graph, host, sink);
        }
        reclaimed
    }

    /// Run detection for a single suspect immediately.
    ///
    /// Returns whether the node was condemned (and reclaimed, along with
    /// anything else its search condemned).
    pub(crate) fn detect_garbage<G: ObjectGraph + ?Sized, S: ReclaimSink + ?Sized>(
        &mut self,
        graph: &mut RefGraph,
        host: &G,
        sink: &mut S,
        id: NodeId,
    ) -> bool {
        let node = graph.node(id);
        if node.is_garbage() {
            return true;
        }
        if !node.is_trackable() || !node.is_unsafe() {
            return false;
        }
        let survived = self.tracer.scan(graph, id, false, &mut self.garbage);
        if !survived {
            let timer = GcTimer::start("detect");
            let mut reclaimed = self.destroy_condemned(graph, host, sink);
            // Severed edges may have queued follow-up suspects.
            reclaimed += self.drain(graph, host, sink);
            graph.stats.record_collection(timer.stop(), reclaimed);
            maybe_verify(graph, host);
        }
        !survived
    }

    /// Non-destructive reachability probe.
    ///
    /// Runs a survival-path search but rolls back all tentative marks on
    /// failure instead of condemning anything.
    pub(crate) fn has_survival_path(
        &mut self,
        graph: &mut RefGraph,
        id: NodeId,
        strong: bool,
    ) -> bool {
        let floor = if strong {
            graph.config.strong_root_threshold
        } else {
            0
        };
        let node = graph.node(id);
        if node.root_ref_count() > floor {
            return true;
        }
        if node.is_garbage() || !node.is_trackable() {
            return false;
        }
        let watermark = self.garbage.len();
        let survived = self.tracer.scan(graph, id, strong, &mut self.garbage);
        if !survived {
            for &n in &self.garbage[watermark..] {
                graph.node_mut(n).unmark_garbage();
            }
            self.garbage.truncate(watermark);
        }
        survived
    }

    // =========================================================================
    // Destruction
    // =========================================================================

    /// Destroy every node condemned so far in this batch.
    fn destroy_condemned<G: ObjectGraph + ?Sized, S: ReclaimSink + ?Sized>(
        &mut self,
        graph: &mut RefGraph,
        host: &G,
        sink: &mut S,
    ) -> u64 {
        let mut reclaimed = 0u64;
        // Destroying one node never unmarks another, so a plain drain is
        // safe; the trackable check skips nodes a cascade already destroyed.
        for i in 0..self.garbage.len() {
            let id = self.garbage[i];
            if !graph.nodes.is_live(id.index()) {
                continue;
            }
            let node = graph.node(id);
            if node.is_garbage() && node.is_trackable() {
                self.destroy_object(graph, host, sink, id);
                reclaimed += 1;
            }
        }
        self.garbage.clear();
        reclaimed
    }

    /// Detach and reclaim one condemned node.
    ///
    /// Severing the outgoing edges keeps the surviving graph consistent: each
    /// referent loses one anchor, chains anchored on the dead node are split
    /// at the severed edge, and referents left unsafe are queued for their
    /// own detection rather than condemned inline.
    fn destroy_object<G: ObjectGraph + ?Sized, S: ReclaimSink + ?Sized>(
        &mut self,
        graph: &mut RefGraph,
        host: &G,
        sink: &mut S,
        id: NodeId,
    ) {
        debug_assert!(
            graph.node(id).root_ref_count() <= 0,
            "destroying rooted node {}",
            host.describe(id)
        );
        graph.node_mut(id).mark_destroyed();
        if graph.config.trace {
            eprintln!("gc destroy {}", host.describe(id));
        }

        let mut referents: Vec<NodeId> = Vec::new();
        host.for_each_outgoing(id, &mut |referent| referents.push(referent));
        for referent in referents {
            if referent == id || !graph.nodes.is_live(referent.index()) {
                continue;
            }
            let node = graph.node(referent);
            if node.is_destroyed() {
                continue;
            }
            graph.remove_anchor(referent, id, false);
            let node = graph.node(referent);
            if node.is_unsafe() && !node.is_garbage() {
                self.enqueue_unstable(graph, referent);
            }
        }

        graph.clear_anchors(id);
        sink.reclaim(id);
        graph.release(id);
    }
}

/// Run the structural verifier after a batch when the config asks for it.
///
/// Corruption at this point means the batch itself broke an invariant, so the
/// only reasonable response is to stop.
fn maybe_verify<G: ObjectGraph + ?Sized>(graph: &RefGraph, host: &G) {
    if graph.config.verify {
        if let Err(e) = crate::verify::verify_graph(graph, host) {
            panic!("graph corruption after collection: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GcConfig;
    use rustc_hash::FxHashMap;

    /// Host with an explicit edge table.
    #[derive(Default)]
    struct TestHeap {
        edges: FxHashMap<NodeId, Vec<NodeId>>,
    }

    impl TestHeap {
        fn link(&mut self, graph: &mut RefGraph, owner: NodeId, referent: NodeId) {
            self.edges.entry(owner).or_default().push(referent);
            graph.add_anchor(referent, owner);
        }

        fn unlink(&mut self, graph: &mut RefGraph, owner: NodeId, referent: NodeId) {
            let refs = self.edges.get_mut(&owner).expect("unlinking unknown owner");
            let pos = refs
                .iter()
                .position(|&r| r == referent)
                .expect("unlinking absent edge");
            refs.remove(pos);
            graph.remove_anchor(referent, owner, true);
        }
    }

    impl ObjectGraph for TestHeap {
        fn for_each_outgoing(&self, node: NodeId, visit: &mut dyn FnMut(NodeId)) {
            if let Some(refs) = self.edges.get(&node) {
                for &r in refs {
                    visit(r);
                }
            }
        }
    }

    #[derive(Default)]
    struct Reclaimed(Vec<NodeId>);

    impl ReclaimSink for Reclaimed {
        fn reclaim(&mut self, node: NodeId) {
            self.0.push(node);
        }
    }

    fn setup() -> (RefGraph, GarbageProcessor, TestHeap, Reclaimed) {
        (
            RefGraph::new(GcConfig::testing()),
            GarbageProcessor::new(),
            TestHeap::default(),
            Reclaimed::default(),
        )
    }

    #[test]
    fn test_severed_cycle_is_reclaimed() {
        let (mut g, mut proc, mut heap, mut sink) = setup();

        // root -> a -> b -> c -> a
        let root = g.register();
        let a = g.register();
        let b = g.register();
        let c = g.register();
        g.node_mut(root).increment_root_refs();
        heap.link(&mut g, root, a);
        heap.link(&mut g, a, b);
        heap.link(&mut g, b, c);
        heap.link(&mut g, c, a);

        heap.unlink(&mut g, root, a);
        proc.enqueue_unstable(&mut g, a);
        let reclaimed = proc.collect(&mut g, &heap, &mut sink);

        assert_eq!(reclaimed, 3);
        assert_eq!(sink.0.len(), 3);
        assert!(sink.0.contains(&a));
        assert!(sink.0.contains(&b));
        assert!(sink.0.contains(&c));
        assert!(g.nodes.is_live(root.index()));
        assert_eq!(g.nodes.live_count(), 1);
    }

    #[test]
    fn test_anchored_cycle_survives_collection() {
        let (mut g, mut proc, mut heap, mut sink) = setup();

        let root = g.register();
        let a = g.register();
        let b = g.register();
        g.node_mut(root).increment_root_refs();
        heap.link(&mut g, root, a);
        heap.link(&mut g, a, b);
        heap.link(&mut g, b, a);

        proc.enqueue_unstable(&mut g, b);
        let reclaimed = proc.collect(&mut g, &heap, &mut sink);

        assert_eq!(reclaimed, 0);
        assert!(sink.0.is_empty());
        assert_eq!(g.nodes.live_count(), 3);
    }

    #[test]
    fn test_cascade_reclaims_hanging_subgraph() {
        let (mut g, mut proc, mut heap, mut sink) = setup();

        // cycle a <-> b, with b -> d -> e hanging off it
        let a = g.register();
        let b = g.register();
        let d = g.register();
        let e = g.register();
        heap.link(&mut g, a, b);
        heap.link(&mut g, b, a);
        heap.link(&mut g, b, d);
        heap.link(&mut g, d, e);

        proc.enqueue_unstable(&mut g, a);
        let reclaimed = proc.collect(&mut g, &heap, &mut sink);

        assert_eq!(reclaimed, 4);
        assert_eq!(g.nodes.live_count(), 0);
    }

    #[test]
    fn test_requeued_node_that_regained_root_survives() {
        let (mut g, mut proc, mut heap, mut sink) = setup();

        let a = g.register();
        let b = g.register();
        heap.link(&mut g, a, b);
        heap.link(&mut g, b, a);

        proc.enqueue_unstable(&mut g, a);
        // The suspect regains a root before the batch runs.
        g.node_mut(a).increment_root_refs();
        let reclaimed = proc.collect(&mut g, &heap, &mut sink);

        assert_eq!(reclaimed, 0);
        assert_eq!(g.nodes.live_count(), 2);
        assert!(!g.node(a).is_unstable());
    }

    #[test]
    fn test_detect_garbage_single_node() {
        let (mut g, mut proc, mut heap, mut sink) = setup();

        let a = g.register();
        let b = g.register();
        heap.link(&mut g, a, b);
        heap.link(&mut g, b, a);

        assert!(proc.detect_garbage(&mut g, &heap, &mut sink, a));
        assert_eq!(sink.0.len(), 2);
    }

    #[test]
    fn test_detection_is_idempotent() {
        let (mut g, mut proc, mut heap, mut sink) = setup();

        let root = g.register();
        let a = g.register();
        g.node_mut(root).increment_root_refs();
        heap.link(&mut g, root, a);

        proc.enqueue_unstable(&mut g, a);
        proc.enqueue_unstable(&mut g, a);
        assert_eq!(proc.pending(), 1);

        assert_eq!(proc.collect(&mut g, &heap, &mut sink), 0);
        proc.enqueue_unstable(&mut g, a);
        assert_eq!(proc.collect(&mut g, &heap, &mut sink), 0);
        assert_eq!(g.nodes.live_count(), 2);
    }

    #[test]
    fn test_has_survival_path_is_non_destructive() {
        let (mut g, mut proc, mut heap, _sink) = setup();

        let a = g.register();
        let b = g.register();
        heap.link(&mut g, a, b);
        heap.link(&mut g, b, a);

        assert!(!proc.has_survival_path(&mut g, a, false));
        // The probe must leave no marks behind.
        assert!(!g.node(a).is_garbage());
        assert!(!g.node(b).is_garbage());
        assert_eq!(g.nodes.live_count(), 2);
    }

    #[test]
    fn test_strong_survival_needs_threshold() {
        let (mut g, mut proc, mut heap, _sink) = setup();

        let r = g.register();
        let a = g.register();
        heap.link(&mut g, r, a);
        g.node_mut(r).increment_root_refs();

        assert!(proc.has_survival_path(&mut g, a, false));
        assert!(!proc.has_survival_path(&mut g, a, true));
        g.node_mut(r).increment_root_refs();
        assert!(proc.has_survival_path(&mut g, a, true));
    }

    #[test]
    fn test_diamond_with_inner_root_survives_partially() {
        let (mut g, mut proc, mut heap, mut sink) = setup();

        // a -> b, a -> c, b -> d, c -> d; b rooted, a unreferenced.
        let a = g.register();
        let b = g.register();
        let c = g.register();
        let d = g.register();
        heap.link(&mut g, a, b);
        heap.link(&mut g, a, c);
        heap.link(&mut g, b, d);
        heap.link(&mut g, c, d);
        g.node_mut(b).increment_root_refs();

        proc.enqueue_unstable(&mut g, a);
        let reclaimed = proc.collect(&mut g, &heap, &mut sink);

        // a and c die; b and d stay.
        assert_eq!(reclaimed, 2);
        assert!(sink.0.contains(&a));
        assert!(sink.0.contains(&c));
        assert!(g.nodes.is_live(b.index()));
        assert!(g.nodes.is_live(d.index()));
    }
}
