//! The public reference-tracking runtime.
//!
//! `GcRuntime` is the host's single entry point. It validates configuration,
//! owns the reference graph and the garbage processor, and brackets mutations
//! of published nodes with the host's `MutationLock`. Reference-count and
//! edge bookkeeping happen eagerly inside each mutation call; cycle detection
//! is deferred to the unstable worklist and runs when the host asks for a
//! collection.

use crate::collector::GarbageProcessor;
use crate::config::{ConfigError, GcConfig};
use crate::graph::node::{NodeId, SafeAnchorState};
use crate::graph::RefGraph;
use crate::host::{MutationLock, NullLock, ObjectGraph, ReclaimSink};
use crate::stats::GcStats;
use std::sync::atomic::Ordering;

/// Reference-tracking runtime for one heap.
pub struct GcRuntime {
    graph: RefGraph,
    processor: GarbageProcessor,
    lock: Box<dyn MutationLock>,
}

impl GcRuntime {
    /// Create a runtime for a single-threaded host.
    pub fn new(config: GcConfig) -> Result<Self, ConfigError> {
        Self::with_lock(config, Box::new(NullLock))
    }

    /// Create a runtime whose published-node mutations run under `lock`.
    pub fn with_lock(
        config: GcConfig,
        lock: Box<dyn MutationLock>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            graph: RefGraph::new(config),
            processor: GarbageProcessor::new(),
            lock,
        })
    }

    // =========================================================================
    // Node lifecycle
    // =========================================================================

    /// Register a freshly allocated object and return its tracking handle.
    ///
    /// New nodes start unpublished, with no roots and no anchors.
    pub fn register_node(&mut self) -> NodeId {
        self.graph.register()
    }

    /// Mark `id` as visible to threads other than its allocator. From now on
    /// its mutations run under the runtime's `MutationLock`.
    pub fn mark_published(&mut self, id: NodeId) {
        self.graph.node_mut(id).published = true;
    }

    // =========================================================================
    // Root references
    // =========================================================================

    /// Record one new root (stack, global, or external) reference to `id`.
    pub fn assign_root(&mut self, id: NodeId) {
        let locked = self.lock_for(id);
        debug_assert!(self.graph.node(id).is_trackable(), "rooting untracked {id}");
        debug_assert!(!self.graph.node(id).is_garbage(), "rooting condemned {id}");
        self.graph.node_mut(id).increment_root_refs();
        self.graph.stats.roots_assigned.fetch_add(1, Ordering::Relaxed);
        self.unlock_after(locked);
    }

    /// Drop one root reference to `id`. A node left with no roots and no
    /// proven safe anchor is queued for detection.
    pub fn erase_root(&mut self, id: NodeId) {
        let locked = self.lock_for(id);
        self.graph.node_mut(id).decrement_root_refs();
        self.graph.stats.roots_erased.fetch_add(1, Ordering::Relaxed);
        if self.graph.node(id).is_unsafe() {
            self.processor.enqueue_unstable(&mut self.graph, id);
        }
        self.unlock_after(locked);
    }

    /// Atomically retarget a root reference from `old` to `new`.
    ///
    /// Equivalent to `assign_root(new)` then `erase_root(old)`; the ordering
    /// keeps `new` rooted before `old` can destabilize anything.
    pub fn replace_root(&mut self, old: NodeId, new: NodeId) {
        if old == new {
            return;
        }
        self.assign_root(new);
        self.erase_root(old);
    }

    // =========================================================================
    // Heap edges
    // =========================================================================

    /// Record the new reference `owner -> referent`. Self-references carry no
    /// reachability information and are ignored.
    pub fn connect(&mut self, owner: NodeId, referent: NodeId) {
        if owner == referent {
            return;
        }
        let locked = self.lock_for(referent);
        debug_assert!(self.graph.node(owner).is_trackable());
        debug_assert!(self.graph.node(referent).is_trackable());
        self.graph.add_anchor(referent, owner);
        self.graph
            .stats
            .edges_connected
            .fetch_add(1, Ordering::Relaxed);
        self.unlock_after(locked);
    }

    /// Remove the reference `owner -> referent`, which must exist. If the
    /// referent loses its safe anchor it is queued for detection.
    pub fn disconnect(&mut self, owner: NodeId, referent: NodeId) {
        if owner == referent {
            return;
        }
        let locked = self.lock_for(referent);
        self.graph.remove_anchor(referent, owner, true);
        self.graph
            .stats
            .edges_disconnected
            .fetch_add(1, Ordering::Relaxed);
        if self.graph.node(referent).is_unsafe() {
            self.processor.enqueue_unstable(&mut self.graph, referent);
        }
        self.unlock_after(locked);
    }

    /// Remove the reference `owner -> referent` if it is recorded.
    ///
    /// Returns whether an edge was removed. For hosts whose write barriers
    /// can fire for never-recorded stores.
    pub fn try_disconnect(&mut self, owner: NodeId, referent: NodeId) -> bool {
        if owner == referent {
            return false;
        }
        let locked = self.lock_for(referent);
        let removed = self.graph.remove_anchor(referent, owner, false);
        if removed {
            self.graph
                .stats
                .edges_disconnected
                .fetch_add(1, Ordering::Relaxed);
            if self.graph.node(referent).is_unsafe() {
                self.processor.enqueue_unstable(&mut self.graph, referent);
            }
        }
        self.unlock_after(locked);
        removed
    }

    /// Remove every recorded `owner -> referent` reference at once.
    ///
    /// For hosts that drop an object's fields wholesale (array clears, bulk
    /// field resets). Returns whether any edge was removed.
    pub fn disconnect_all(&mut self, owner: NodeId, referent: NodeId) -> bool {
        if owner == referent {
            return false;
        }
        let locked = self.lock_for(referent);
        let removed = self.graph.remove_matching_anchors(referent, owner);
        if removed {
            self.graph
                .stats
                .edges_disconnected
                .fetch_add(1, Ordering::Relaxed);
            if self.graph.node(referent).is_unsafe() {
                self.processor.enqueue_unstable(&mut self.graph, referent);
            }
        }
        self.unlock_after(locked);
        removed
    }

    /// Retarget a field of `owner` from `old` to `new` in one call.
    pub fn replace_member(&mut self, owner: NodeId, old: NodeId, new: NodeId) {
        if old == new {
            return;
        }
        self.connect(owner, new);
        self.disconnect(owner, old);
    }

    // =========================================================================
    // Detection and collection
    // =========================================================================

    /// Drain the unstable worklist, reclaiming every node proven garbage.
    /// Returns the number of nodes reclaimed.
    pub fn collect_garbage<G: ObjectGraph + ?Sized, S: ReclaimSink + ?Sized>(
        &mut self,
        host: &G,
        sink: &mut S,
    ) -> u64 {
        self.processor.collect(&mut self.graph, host, sink)
    }

    /// Decide `id`'s fate immediately, reclaiming it (and anything condemned
    /// with it) when the search fails. Returns whether it was garbage.
    pub fn detect_garbage<G: ObjectGraph + ?Sized, S: ReclaimSink + ?Sized>(
        &mut self,
        host: &G,
        sink: &mut S,
        id: NodeId,
    ) -> bool {
        self.processor.detect_garbage(&mut self.graph, host, sink, id)
    }

    /// Probe whether `id` can currently reach a rooted node, without
    /// condemning anything.
    pub fn has_survival_path(&mut self, id: NodeId) -> bool {
        self.processor.has_survival_path(&mut self.graph, id, false)
    }

    /// Like [`has_survival_path`](Self::has_survival_path), but the proof
    /// must end at a node whose root count exceeds the configured strong
    /// threshold.
    pub fn has_strong_survival_path(&mut self, id: NodeId) -> bool {
        self.processor.has_survival_path(&mut self.graph, id, true)
    }

    /// Number of nodes queued for detection.
    pub fn pending_unstable(&self) -> usize {
        self.processor.pending()
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Current root-reference count of `id`.
    pub fn root_ref_count(&self, id: NodeId) -> i32 {
        self.graph.node(id).root_ref_count()
    }

    /// Number of recorded incoming references of `id`.
    pub fn anchor_count(&self, id: NodeId) -> usize {
        self.graph.anchor_count(id)
    }

    /// Whether the reference `owner -> referent` is recorded.
    pub fn has_edge(&self, owner: NodeId, referent: NodeId) -> bool {
        self.graph.has_anchor(referent, owner)
    }

    /// Whether `id` holds any root reference or incoming edge at all.
    pub fn is_anchored(&self, id: NodeId) -> bool {
        self.graph.node(id).is_anchored()
    }

    /// Safe-anchor state of `id`.
    pub fn safe_anchor_state(&self, id: NodeId) -> SafeAnchorState {
        self.graph.node(id).safe_anchor_state()
    }

    /// Whether `id` names a live (not reclaimed) node.
    pub fn is_live(&self, id: NodeId) -> bool {
        self.graph.nodes.is_live(id.index()) && self.graph.node(id).is_trackable()
    }

    /// Number of live tracked nodes.
    pub fn live_nodes(&self) -> usize {
        self.graph.nodes.live_count()
    }

    /// Collector statistics.
    pub fn stats(&self) -> &GcStats {
        &self.graph.stats
    }

    /// Active configuration.
    pub fn config(&self) -> &GcConfig {
        &self.graph.config
    }

    /// Check every structural invariant against the host's edge table.
    ///
    /// Intended for tests and debug builds; cost is linear in the heap.
    pub fn verify<G: ObjectGraph + ?Sized>(&self, host: &G) -> Result<(), crate::verify::VerifyError> {
        crate::verify::verify_graph(&self.graph, host)
    }

    // =========================================================================
    // Lock bracketing
    // =========================================================================

    fn lock_for(&self, id: NodeId) -> bool {
        let published = self.graph.node(id).is_published();
        if published {
            self.lock.lock();
        }
        published
    }

    fn unlock_after(&self, locked: bool) {
        if locked {
            self.lock.unlock();
        }
    }
}

impl std::fmt::Debug for GcRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcRuntime")
            .field("live_nodes", &self.graph.nodes.live_count())
            .field("pending_unstable", &self.processor.pending())
            .finish_non_exhaustive()
    }
}
