//! Host-facing service traits.
//!
//! The core has no file format or wire protocol; its entire boundary is the
//! three small contracts here. The host owns object layout, reclamation, and
//! the decision of when structural mutation needs a lock.

use crate::graph::node::NodeId;

/// Enumeration of an object's outgoing strong references.
///
/// Reclamation walks a destroyed object's fields through this trait to sever
/// the reverse (anchor) bookkeeping. Implementations must report every live
/// reference stored in the object's fields, in any order; self-references may
/// be reported or skipped (the core ignores them either way).
pub trait ObjectGraph {
    /// Invoke `visit` once per outgoing reference of `node`.
    fn for_each_outgoing(&self, node: NodeId, visit: &mut dyn FnMut(NodeId));

    /// Describe a node for diagnostics.
    ///
    /// Used only in assertion messages and trace output, never for control
    /// flow.
    fn describe(&self, node: NodeId) -> String {
        format!("node#{}", node.index())
    }
}

/// Sink receiving confirmed-garbage nodes.
///
/// Called exactly once per reclaimed node, after its anchor bookkeeping has
/// been cleared and never for a node that is still reachable. The host
/// returns the object's backing storage to general allocation here.
pub trait ReclaimSink {
    /// Take ownership of a destroyed node's storage.
    fn reclaim(&mut self, node: NodeId);
}

/// Host-provided mutual exclusion for structural mutation.
///
/// The core never owns a lock: *when* locking is required (typically only for
/// nodes published to other threads) is host policy. The runtime brackets
/// root and edge mutations of published nodes with these hooks.
pub trait MutationLock {
    /// Acquire the mutation lock.
    fn lock(&self);

    /// Release the mutation lock.
    fn unlock(&self);
}

/// Lock implementation for single-threaded hosts: does nothing.
#[derive(Debug, Default)]
pub struct NullLock;

impl MutationLock for NullLock {
    #[inline]
    fn lock(&self) {}

    #[inline]
    fn unlock(&self) {}
}

/// Lock implementation backed by a `parking_lot` raw mutex.
///
/// Suits hosts that serialize all published-object mutation behind one global
/// lock rather than a safepoint protocol.
pub struct RawMutexLock {
    raw: parking_lot::RawMutex,
}

impl RawMutexLock {
    /// Create an unlocked mutex.
    pub const fn new() -> Self {
        use parking_lot::lock_api::RawMutex as _;
        Self {
            raw: parking_lot::RawMutex::INIT,
        }
    }
}

impl Default for RawMutexLock {
    fn default() -> Self {
        Self::new()
    }
}

impl MutationLock for RawMutexLock {
    #[inline]
    fn lock(&self) {
        use parking_lot::lock_api::RawMutex as _;
        self.raw.lock();
    }

    #[inline]
    fn unlock(&self) {
        use parking_lot::lock_api::RawMutex as _;
        // The runtime pairs every unlock with a prior lock on the same hook.
        unsafe { self.raw.unlock() };
    }
}

impl std::fmt::Debug for RawMutexLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawMutexLock").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_mutex_lock_roundtrip() {
        let lock = RawMutexLock::new();
        lock.lock();
        lock.unlock();
        lock.lock();
        lock.unlock();
    }

    #[test]
    fn test_default_describe() {
        struct NoEdges;
        impl ObjectGraph for NoEdges {
            fn for_each_outgoing(&self, _node: NodeId, _visit: &mut dyn FnMut(NodeId)) {}
        }
        let host = NoEdges;
        assert_eq!(host.describe(NodeId::from_index(7)), "node#7");
    }
}
