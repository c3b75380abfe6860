//! End-to-end cycle collection through the public API.

use rustc_hash::FxHashMap;

use rcgc::{
    GcConfig, GcRuntime, NodeId, ObjectGraph, RawMutexLock, ReclaimSink, SafeAnchorState,
};

/// Host heap with an explicit edge table, kept in sync with the runtime.
#[derive(Default)]
struct TestHeap {
    edges: FxHashMap<NodeId, Vec<NodeId>>,
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

fn link(heap: &mut TestHeap, rt: &mut GcRuntime, owner: NodeId, referent: NodeId) {
    heap.edges.entry(owner).or_default().push(referent);
    rt.connect(owner, referent);
}

fn unlink(heap: &mut TestHeap, rt: &mut GcRuntime, owner: NodeId, referent: NodeId) {
    let refs = heap.edges.get_mut(&owner).expect("unknown owner");
    let pos = refs.iter().position(|&r| r == referent).expect("absent edge");
    refs.remove(pos);
    rt.disconnect(owner, referent);
}

fn runtime() -> GcRuntime {
    GcRuntime::new(GcConfig::testing()).expect("testing preset validates")
}

#[test]
fn severed_three_cycle_is_reclaimed_exactly_once() {
    let mut rt = runtime();
    let mut heap = TestHeap::default();
    let mut sink = Reclaimed::default();

    // root -> a -> b -> c -> a
    let root = rt.register_node();
    let a = rt.register_node();
    let b = rt.register_node();
    let c = rt.register_node();
    rt.assign_root(root);
    link(&mut heap, &mut rt, root, a);
    link(&mut heap, &mut rt, a, b);
    link(&mut heap, &mut rt, b, c);
    link(&mut heap, &mut rt, c, a);

    assert_eq!(rt.collect_garbage(&heap, &mut sink), 0);
    rt.verify(&heap).expect("consistent before severing");

    unlink(&mut heap, &mut rt, root, a);
    heap.edges.remove(&a);
    heap.edges.remove(&b);
    heap.edges.remove(&c);
    // The heap entries above simulate the host forgetting the dead objects;
    // the collector still severs through its recorded anchors.
    heap.edges.insert(a, vec![b]);
    heap.edges.insert(b, vec![c]);
    heap.edges.insert(c, vec![a]);

    let reclaimed = rt.collect_garbage(&heap, &mut sink);
    assert_eq!(reclaimed, 3);
    let mut got = sink.0.clone();
    got.sort();
    let mut want = vec![a, b, c];
    want.sort();
    assert_eq!(got, want);
    assert!(rt.is_live(root));
    assert_eq!(rt.live_nodes(), 1);

    // Running again reclaims nothing further.
    heap.edges.clear();
    heap.edges.insert(root, Vec::new());
    assert_eq!(rt.collect_garbage(&heap, &mut sink), 0);
    assert_eq!(sink.0.len(), 3);
}

#[test]
fn long_chain_search_leaves_a_shortcut_behind() {
    let mut rt = runtime();
    let mut heap = TestHeap::default();

    // root -> n0 -> n1 -> n2 -> n3 -> n4
    let root = rt.register_node();
    rt.assign_root(root);
    let mut prev = root;
    let mut nodes = Vec::new();
    for _ in 0..5 {
        let n = rt.register_node();
        link(&mut heap, &mut rt, prev, n);
        nodes.push(n);
        prev = n;
    }

    let tail = *nodes.last().unwrap();
    assert!(rt.has_survival_path(tail));
    // The proof was compressed: the tail is a chain member now.
    assert!(matches!(
        rt.safe_anchor_state(tail),
        SafeAnchorState::Chain(_)
    ));
    assert_eq!(rt.stats().live_shortcuts(), 1);
    rt.verify(&heap).expect("chain state consistent");

    // A second suspect re-proves itself through the chain in O(1) visits.
    let suspect = rt.register_node();
    link(&mut heap, &mut rt, tail, suspect);
    let before = rt.stats().anchor_visit_count();
    assert!(rt.has_survival_path(suspect));
    let visits = rt.stats().anchor_visit_count() - before;
    assert!(visits <= 4, "expected a jump, walked {visits} anchors");
}

#[test]
fn branch_hung_off_a_chain_interior_proves_reachable() {
    let mut rt = runtime();
    let mut heap = TestHeap::default();

    // root -> n0 -> ... -> n5, proven once so a record spans it.
    let root = rt.register_node();
    rt.assign_root(root);
    let mut prev = root;
    let mut nodes = Vec::new();
    for _ in 0..6 {
        let n = rt.register_node();
        link(&mut heap, &mut rt, prev, n);
        nodes.push(n);
        prev = n;
    }
    assert!(rt.has_survival_path(prev));
    assert_eq!(rt.stats().live_shortcuts(), 1);

    // New objects hang off the middle of the compressed span; proving them
    // jumps into the chain away from its tail.
    let m1 = rt.register_node();
    let m2 = rt.register_node();
    link(&mut heap, &mut rt, nodes[2], m1);
    link(&mut heap, &mut rt, m1, m2);
    assert!(rt.has_survival_path(m2));

    // The record still spans the whole chain and the graph stays sound.
    assert!(matches!(
        rt.safe_anchor_state(prev),
        SafeAnchorState::Chain(_)
    ));
    rt.verify(&heap).expect("mid-span entry leaves a consistent graph");
}

#[test]
fn collecting_a_compressed_chain_cascades_through_its_record() {
    let mut rt = runtime();
    let mut heap = TestHeap::default();
    let mut sink = Reclaimed::default();

    // root -> n0 -> ... -> n5, proven once so a record spans it.
    let root = rt.register_node();
    rt.assign_root(root);
    let mut prev = root;
    let mut nodes = Vec::new();
    for _ in 0..6 {
        let n = rt.register_node();
        link(&mut heap, &mut rt, prev, n);
        nodes.push(n);
        prev = n;
    }
    assert!(rt.has_survival_path(prev));
    assert_eq!(rt.stats().live_shortcuts(), 1);

    // Erasing the only root condemns the whole chain. Each destroyed node is
    // the record's anchor endpoint at that moment, so reclamation has to
    // split or delete the record on the way down.
    rt.erase_root(root);
    let reclaimed = rt.collect_garbage(&heap, &mut sink);
    assert_eq!(reclaimed, 7);
    assert_eq!(rt.live_nodes(), 0);
    assert_eq!(rt.stats().live_shortcuts(), 0);

    use std::sync::atomic::Ordering;
    assert!(rt.stats().shortcuts_split.load(Ordering::Relaxed) >= 1);
    assert!(rt.stats().shortcuts_deleted.load(Ordering::Relaxed) >= 1);

    // Every node was reclaimed exactly once.
    let mut got = sink.0.clone();
    got.sort();
    let mut want = vec![root];
    want.extend(&nodes);
    want.sort();
    assert_eq!(got, want);

    assert_eq!(rt.collect_garbage(&heap, &mut sink), 0);
    assert_eq!(sink.0.len(), 7);
}

#[test]
fn diamond_with_interior_root_splits_fates() {
    let mut rt = runtime();
    let mut heap = TestHeap::default();
    let mut sink = Reclaimed::default();

    // a -> b, a -> c, b -> d, c -> d; b rooted, a unreferenced.
    let a = rt.register_node();
    let b = rt.register_node();
    let c = rt.register_node();
    let d = rt.register_node();
    link(&mut heap, &mut rt, a, b);
    link(&mut heap, &mut rt, a, c);
    link(&mut heap, &mut rt, b, d);
    link(&mut heap, &mut rt, c, d);
    rt.assign_root(b);

    assert!(rt.detect_garbage(&heap, &mut sink, a));
    heap.edges.remove(&a);
    heap.edges.remove(&c);

    let mut got = sink.0.clone();
    got.sort();
    let mut want = vec![a, c];
    want.sort();
    assert_eq!(got, want);
    assert!(rt.is_live(b));
    assert!(rt.is_live(d));
    rt.verify(&heap).expect("survivors consistent");
}

#[test]
fn detection_is_idempotent() {
    let mut rt = runtime();
    let mut heap = TestHeap::default();
    let mut sink = Reclaimed::default();

    let root = rt.register_node();
    let a = rt.register_node();
    rt.assign_root(root);
    link(&mut heap, &mut rt, root, a);

    assert!(!rt.detect_garbage(&heap, &mut sink, a));
    assert!(!rt.detect_garbage(&heap, &mut sink, a));
    assert!(rt.has_survival_path(a));
    assert!(sink.0.is_empty());
    assert_eq!(rt.live_nodes(), 2);
}

#[test]
fn cycle_rescued_before_collection_survives() {
    let mut rt = runtime();
    let mut heap = TestHeap::default();
    let mut sink = Reclaimed::default();

    let root = rt.register_node();
    let a = rt.register_node();
    let b = rt.register_node();
    rt.assign_root(root);
    link(&mut heap, &mut rt, root, a);
    link(&mut heap, &mut rt, a, b);
    link(&mut heap, &mut rt, b, a);

    // Severing root -> a queues a; relinking before the batch rescues it.
    unlink(&mut heap, &mut rt, root, a);
    assert_eq!(rt.pending_unstable(), 1);
    link(&mut heap, &mut rt, root, a);

    assert_eq!(rt.collect_garbage(&heap, &mut sink), 0);
    assert_eq!(rt.live_nodes(), 3);
    rt.verify(&heap).expect("rescued graph consistent");
}

#[test]
fn completeness_sweep_reclaims_everything() {
    let mut rt = runtime();
    let mut heap = TestHeap::default();
    let mut sink = Reclaimed::default();

    // A braid of interlocking cycles hanging off one root.
    let root = rt.register_node();
    rt.assign_root(root);
    let nodes: Vec<NodeId> = (0..12).map(|_| rt.register_node()).collect();
    link(&mut heap, &mut rt, root, nodes[0]);
    for i in 0..nodes.len() {
        let next = nodes[(i + 1) % nodes.len()];
        link(&mut heap, &mut rt, nodes[i], next);
        let across = nodes[(i + 5) % nodes.len()];
        link(&mut heap, &mut rt, nodes[i], across);
    }
    assert_eq!(rt.collect_garbage(&heap, &mut sink), 0);
    assert_eq!(rt.live_nodes(), 13);

    unlink(&mut heap, &mut rt, root, nodes[0]);
    let reclaimed = rt.collect_garbage(&heap, &mut sink);
    assert_eq!(reclaimed, 12);
    assert_eq!(rt.live_nodes(), 1);
    assert!(rt.is_live(root));
}

#[test]
fn erased_last_root_collects_chain() {
    let mut rt = runtime();
    let mut heap = TestHeap::default();
    let mut sink = Reclaimed::default();

    let a = rt.register_node();
    let b = rt.register_node();
    let c = rt.register_node();
    rt.assign_root(a);
    link(&mut heap, &mut rt, a, b);
    link(&mut heap, &mut rt, b, c);

    rt.erase_root(a);
    let reclaimed = rt.collect_garbage(&heap, &mut sink);
    assert_eq!(reclaimed, 3);
    assert_eq!(rt.live_nodes(), 0);
}

#[test]
fn published_nodes_mutate_under_a_real_lock() {
    let mut rt = GcRuntime::with_lock(GcConfig::testing(), Box::new(RawMutexLock::new()))
        .expect("config validates");
    let mut heap = TestHeap::default();
    let mut sink = Reclaimed::default();

    let root = rt.register_node();
    let shared = rt.register_node();
    rt.mark_published(shared);
    rt.assign_root(root);
    link(&mut heap, &mut rt, root, shared);
    rt.assign_root(shared);
    rt.erase_root(shared);

    assert_eq!(rt.collect_garbage(&heap, &mut sink), 0);
    assert!(rt.is_live(shared));
}

#[test]
fn stats_summarize_a_full_cycle() {
    let mut rt = runtime();
    let mut heap = TestHeap::default();
    let mut sink = Reclaimed::default();

    let root = rt.register_node();
    let a = rt.register_node();
    let b = rt.register_node();
    rt.assign_root(root);
    link(&mut heap, &mut rt, root, a);
    link(&mut heap, &mut rt, a, b);
    link(&mut heap, &mut rt, b, a);
    unlink(&mut heap, &mut rt, root, a);
    heap.edges.remove(&a);
    heap.edges.remove(&b);
    heap.edges.insert(a, vec![b]);
    heap.edges.insert(b, vec![a]);

    rt.collect_garbage(&heap, &mut sink);

    use std::sync::atomic::Ordering;
    let stats = rt.stats();
    assert_eq!(stats.nodes_reclaimed.load(Ordering::Relaxed), 2);
    assert!(stats.collections.load(Ordering::Relaxed) >= 1);
    assert!(stats.searches.load(Ordering::Relaxed) >= 1);
    assert_eq!(stats.edges_connected.load(Ordering::Relaxed), 3);
    assert_eq!(stats.edges_disconnected.load(Ordering::Relaxed), 1);
}
