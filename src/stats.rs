//! Collector statistics and metrics.
//!
//! Tracks mutation rates, search effort, shortcut churn, and reclamation
//! counts. The `anchor_visits` counter is the canonical way to observe how
//! much walking a survival-path search actually did (and therefore whether a
//! shortcut is paying off).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Statistics about reference-tracking and collection activity.
#[derive(Debug)]
pub struct GcStats {
    // =========================================================================
    // Mutation Statistics
    // =========================================================================
    /// Root references assigned.
    pub roots_assigned: AtomicU64,
    /// Root references erased.
    pub roots_erased: AtomicU64,
    /// Heap edges connected.
    pub edges_connected: AtomicU64,
    /// Heap edges disconnected.
    pub edges_disconnected: AtomicU64,

    // =========================================================================
    // Search Statistics
    // =========================================================================
    /// Survival-path searches started.
    pub searches: AtomicU64,
    /// Searches that found a path to a root.
    pub searches_survived: AtomicU64,
    /// Anchors visited across all searches.
    ///
    /// A search that jumps through a shortcut visits one anchor per jump
    /// instead of one per chain node.
    pub anchor_visits: AtomicU64,
    /// Shortcut jumps taken during searches.
    pub shortcut_jumps: AtomicU64,

    // =========================================================================
    // Shortcut Statistics
    // =========================================================================
    /// Shortcut records created.
    pub shortcuts_created: AtomicU64,
    /// Shortcut extensions (either end).
    pub shortcuts_extended: AtomicU64,
    /// Shortcut splits caused by edge removal.
    pub shortcuts_split: AtomicU64,
    /// Shortcut records deleted.
    pub shortcuts_deleted: AtomicU64,

    // =========================================================================
    // Collection Statistics
    // =========================================================================
    /// Collection batches completed.
    pub collections: AtomicU64,
    /// Nodes confirmed garbage and handed to the reclamation sink.
    pub nodes_reclaimed: AtomicU64,
    /// Total time spent in collection batches (nanoseconds).
    pub collect_time_ns: AtomicU64,
}

impl GcStats {
    /// Create new empty statistics.
    pub const fn new() -> Self {
        Self {
            roots_assigned: AtomicU64::new(0),
            roots_erased: AtomicU64::new(0),
            edges_connected: AtomicU64::new(0),
            edges_disconnected: AtomicU64::new(0),
            searches: AtomicU64::new(0),
            searches_survived: AtomicU64::new(0),
            anchor_visits: AtomicU64::new(0),
            shortcut_jumps: AtomicU64::new(0),
            shortcuts_created: AtomicU64::new(0),
            shortcuts_extended: AtomicU64::new(0),
            shortcuts_split: AtomicU64::new(0),
            shortcuts_deleted: AtomicU64::new(0),
            collections: AtomicU64::new(0),
            nodes_reclaimed: AtomicU64::new(0),
            collect_time_ns: AtomicU64::new(0),
        }
    }

    /// Record one anchor visit during a search.
    #[inline]
    pub fn record_anchor_visit(&self) {
        self.anchor_visits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a finished search.
    #[inline]
    pub fn record_search(&self, survived: bool) {
        self.searches.fetch_add(1, Ordering::Relaxed);
        if survived {
            self.searches_survived.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a completed collection batch.
    pub fn record_collection(&self, duration: Duration, reclaimed: u64) {
        self.collections.fetch_add(1, Ordering::Relaxed);
        self.nodes_reclaimed.fetch_add(reclaimed, Ordering::Relaxed);
        self.collect_time_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
    }

    /// Anchor visits so far (instrumentation for search-cost assertions).
    #[inline]
    pub fn anchor_visit_count(&self) -> u64 {
        self.anchor_visits.load(Ordering::Relaxed)
    }

    /// Live shortcut count approximation: created minus deleted.
    pub fn live_shortcuts(&self) -> i64 {
        self.shortcuts_created.load(Ordering::Relaxed) as i64
            - self.shortcuts_deleted.load(Ordering::Relaxed) as i64
    }

    /// Average time per collection batch.
    pub fn avg_collect_time(&self) -> Duration {
        let count = self.collections.load(Ordering::Relaxed);
        if count == 0 {
            return Duration::ZERO;
        }
        let total_ns = self.collect_time_ns.load(Ordering::Relaxed);
        Duration::from_nanos(total_ns / count)
    }

    /// Reset all statistics.
    pub fn reset(&self) {
        self.roots_assigned.store(0, Ordering::Relaxed);
        self.roots_erased.store(0, Ordering::Relaxed);
        self.edges_connected.store(0, Ordering::Relaxed);
        self.edges_disconnected.store(0, Ordering::Relaxed);
        self.searches.store(0, Ordering::Relaxed);
        self.searches_survived.store(0, Ordering::Relaxed);
        self.anchor_visits.store(0, Ordering::Relaxed);
        self.shortcut_jumps.store(0, Ordering::Relaxed);
        self.shortcuts_created.store(0, Ordering::Relaxed);
        self.shortcuts_extended.store(0, Ordering::Relaxed);
        self.shortcuts_split.store(0, Ordering::Relaxed);
        self.shortcuts_deleted.store(0, Ordering::Relaxed);
        self.collections.store(0, Ordering::Relaxed);
        self.nodes_reclaimed.store(0, Ordering::Relaxed);
        self.collect_time_ns.store(0, Ordering::Relaxed);
    }

    /// Print a summary of collector statistics.
    pub fn print_summary(&self) {
        eprintln!("=== RC/GC Statistics ===");
        eprintln!(
            "Roots: {} assigned, {} erased",
            self.roots_assigned.load(Ordering::Relaxed),
            self.roots_erased.load(Ordering::Relaxed)
        );
        eprintln!(
            "Edges: {} connected, {} disconnected",
            self.edges_connected.load(Ordering::Relaxed),
            self.edges_disconnected.load(Ordering::Relaxed)
        );
        eprintln!(
            "Searches: {} run, {} survived, {} anchor visits, {} jumps",
            self.searches.load(Ordering::Relaxed),
            self.searches_survived.load(Ordering::Relaxed),
            self.anchor_visits.load(Ordering::Relaxed),
            self.shortcut_jumps.load(Ordering::Relaxed)
        );
        eprintln!(
            "Shortcuts: {} created, {} extended, {} split, {} deleted",
            self.shortcuts_created.load(Ordering::Relaxed),
            self.shortcuts_extended.load(Ordering::Relaxed),
            self.shortcuts_split.load(Ordering::Relaxed),
            self.shortcuts_deleted.load(Ordering::Relaxed)
        );
        eprintln!(
            "Collections: {} batches, {} reclaimed, {:?} avg",
            self.collections.load(Ordering::Relaxed),
            self.nodes_reclaimed.load(Ordering::Relaxed),
            self.avg_collect_time()
        );
    }
}

impl Default for GcStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Timer for measuring collection batches.
pub struct GcTimer {
    start: Instant,
    #[cfg_attr(not(feature = "trace"), allow(dead_code))]
    label: &'static str,
}

impl GcTimer {
    /// Start a new timer with the given label.
    pub fn start(label: &'static str) -> Self {
        Self {
            start: Instant::now(),
            label,
        }
    }

    /// Stop the timer and return the elapsed duration.
    pub fn stop(self) -> Duration {
        let elapsed = self.start.elapsed();
        #[cfg(feature = "trace")]
        eprintln!("gc {}: {:?}", self.label, elapsed);
        elapsed
    }
}
