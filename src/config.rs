//! Collector configuration parameters.
//!
//! All thresholds are tunable. Defaults match the reference behavior the
//! algorithm was measured with; tests mostly use [`GcConfig::testing`] to make
//! shortcut formation observable on tiny graphs.

/// Configuration for the reachability-tracking core.
///
/// # Example
///
/// ```
/// use rcgc::GcConfig;
///
/// // Aggressive path compression for long-chain workloads
/// let config = GcConfig {
///     min_shortcut_length: 2,
///     max_shortcut_length: 1024,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct GcConfig {
    // =========================================================================
    // Shortcuts (path compression)
    // =========================================================================
    /// Minimum chain length that earns a shortcut record.
    ///
    /// A proven survival chain must span *more* than this many nodes before a
    /// shortcut is allocated for it; below the threshold a direct anchor walk
    /// is cheaper than maintaining the record.
    ///
    /// Default: 3
    pub min_shortcut_length: u32,

    /// Maximum nodes covered by a single shortcut.
    ///
    /// Longer proven runs are chunked into several shortcuts so that a split
    /// in the middle of a huge chain does not invalidate the whole span.
    ///
    /// Default: 256
    pub max_shortcut_length: u32,

    /// Master switch for shortcut creation.
    ///
    /// When false, survival searches still wire safe anchors but never
    /// allocate shortcut records. Useful for differential testing.
    ///
    /// Default: true
    pub enable_shortcuts: bool,

    // =========================================================================
    // Reachability policy
    // =========================================================================
    /// Root-count threshold for the strong survival search.
    ///
    /// The strong probe accepts a node as a survivor only if its root count
    /// exceeds this value; the normal search accepts any positive count. The
    /// exact meaning of "strong" is host policy, so the threshold is a knob
    /// rather than a constant.
    ///
    /// Default: 1
    pub strong_root_threshold: i32,

    // =========================================================================
    // Pool pre-sizing
    // =========================================================================
    /// Initial capacity of the node arena, in slots.
    ///
    /// Default: 1024
    pub initial_node_capacity: usize,

    /// Initial capacity of the anchor-chunk pool, in chunks.
    ///
    /// Default: 256
    pub initial_chunk_capacity: usize,

    /// Initial capacity of the shortcut pool, in records.
    ///
    /// Default: 64
    pub initial_shortcut_capacity: usize,

    // =========================================================================
    // Debugging
    // =========================================================================
    /// Print per-batch collection summaries to stderr.
    ///
    /// Default: false
    pub trace: bool,

    /// Verify graph invariants after each collection batch.
    ///
    /// Expensive (walks every node, chunk, and shortcut) but catches anchor
    /// asymmetry and broken chains immediately.
    ///
    /// Default: false (enabled in debug builds)
    pub verify: bool,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            min_shortcut_length: 3,
            max_shortcut_length: 256,
            enable_shortcuts: true,
            strong_root_threshold: 1,
            initial_node_capacity: 1024,
            initial_chunk_capacity: 256,
            initial_shortcut_capacity: 64,
            trace: false,
            verify: cfg!(debug_assertions),
        }
    }
}

impl GcConfig {
    /// Configuration that minimizes shortcut metadata.
    ///
    /// Only very long chains get compressed; suits heaps dominated by wide,
    /// shallow object graphs.
    pub fn low_overhead() -> Self {
        Self {
            min_shortcut_length: 16,
            ..Default::default()
        }
    }

    /// Configuration that compresses eagerly.
    ///
    /// Suits heaps with deep linked structures where repeat searches dominate.
    pub fn aggressive() -> Self {
        Self {
            min_shortcut_length: 2,
            max_shortcut_length: 1024,
            ..Default::default()
        }
    }

    /// Configuration for tests: tiny pools, eager shortcuts, verification on.
    pub fn testing() -> Self {
        Self {
            min_shortcut_length: 2,
            initial_node_capacity: 16,
            initial_chunk_capacity: 8,
            initial_shortcut_capacity: 8,
            verify: true,
            ..Default::default()
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_shortcut_length < 1 {
            return Err(ConfigError::ShortcutLengthTooSmall);
        }
        if self.max_shortcut_length <= self.min_shortcut_length {
            return Err(ConfigError::ShortcutLengthInverted);
        }
        if self.strong_root_threshold < 0 {
            return Err(ConfigError::NegativeStrongThreshold);
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Minimum shortcut length must be at least 1.
    ShortcutLengthTooSmall,
    /// Maximum shortcut length must exceed the minimum.
    ShortcutLengthInverted,
    /// The strong-root threshold cannot be negative.
    NegativeStrongThreshold,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ShortcutLengthTooSmall => {
                write!(f, "minimum shortcut length must be at least 1")
            }
            ConfigError::ShortcutLengthInverted => {
                write!(f, "maximum shortcut length must exceed the minimum")
            }
            ConfigError::NegativeStrongThreshold => {
                write!(f, "strong-root threshold cannot be negative")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
