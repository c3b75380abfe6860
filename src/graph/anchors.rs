//! Anchor-set storage: the incoming-edge ("referrer") sets of tracked nodes.
//!
//! Representation switches by cardinality to keep the common cases free of
//! pool traffic: an empty set and a single anchor live inline in the node;
//! two or more anchors spill into pool-backed chunks of seven entries linked
//! by index. The *front* entry (slot 0 of the head chunk, or the inline
//! single) is the designated safe anchor.
//!
//! Removal uses swap-with-last within the chunk list, so removing any entry
//! is O(chunks). Removing the front entry is reported to the caller, which
//! must then invalidate or split the node's safe-anchor state: the swapped-in
//! front is an arbitrary anchor, not a proven-safe one.

use crate::graph::node::{AnchorSlot, NodeId};
use crate::pool::SlotPool;

/// Entries per pool chunk.
pub(crate) const CHUNK_CAPACITY: usize = 7;

/// One pool-backed block of anchor entries.
#[derive(Debug)]
pub(crate) struct AnchorChunk {
    items: [NodeId; CHUNK_CAPACITY],
    len: u8,
    next: Option<u32>,
}

impl AnchorChunk {
    fn new(first: NodeId) -> Self {
        Self {
            items: [first; CHUNK_CAPACITY],
            len: 1,
            next: None,
        }
    }
}

/// Pool of anchor chunks, shared by every node's multi-anchor set.
pub(crate) type ChunkPool = SlotPool<AnchorChunk>;

// =============================================================================
// Mutation
// =============================================================================

/// Add `anchor` to the set. Duplicates are kept (multiset semantics).
pub(crate) fn add(slot: &mut AnchorSlot, pool: &mut ChunkPool, anchor: NodeId) {
    match *slot {
        AnchorSlot::Empty => *slot = AnchorSlot::Single(anchor),
        AnchorSlot::Single(first) => {
            let mut chunk = AnchorChunk::new(first);
            chunk.items[1] = anchor;
            chunk.len = 2;
            *slot = AnchorSlot::Multi(pool.allocate(chunk));
        }
        AnchorSlot::Multi(head) => {
            // Append into the last chunk, growing the list if it is full.
            let mut cur = head;
            loop {
                let chunk = pool.get(cur);
                match chunk.next {
                    Some(next) => cur = next,
                    None => break,
                }
            }
            if (pool.get(cur).len as usize) < CHUNK_CAPACITY {
                let chunk = pool.get_mut(cur);
                let len = chunk.len as usize;
                chunk.items[len] = anchor;
                chunk.len += 1;
            } else {
                let idx = pool.allocate(AnchorChunk::new(anchor));
                pool.get_mut(cur).next = Some(idx);
            }
        }
    }
}

/// Remove one occurrence of `anchor`, reporting the logical index it held.
///
/// Returns `None` if the anchor is absent. Index 0 means the safe-anchor
/// position was emptied. When `must_exist` is set, absence is an invariant
/// violation and panics.
pub(crate) fn remove(
    slot: &mut AnchorSlot,
    pool: &mut ChunkPool,
    anchor: NodeId,
    must_exist: bool,
) -> Option<usize> {
    match *slot {
        AnchorSlot::Empty => {
            assert!(!must_exist, "removing anchor {anchor} from an empty set");
            None
        }
        AnchorSlot::Single(item) => {
            if item == anchor {
                *slot = AnchorSlot::Empty;
                Some(0)
            } else {
                assert!(
                    !must_exist,
                    "removing absent anchor {anchor} (set holds {item})"
                );
                None
            }
        }
        AnchorSlot::Multi(head) => {
            let found = find(pool, head, anchor);
            let Some((chunk_idx, entry_idx, logical)) = found else {
                assert!(!must_exist, "removing absent anchor {anchor}");
                return None;
            };
            remove_at(slot, pool, head, chunk_idx, entry_idx);
            Some(logical)
        }
    }
}

/// Remove every occurrence of `anchor`. Returns whether any was removed.
pub(crate) fn remove_all_matching(
    slot: &mut AnchorSlot,
    pool: &mut ChunkPool,
    anchor: NodeId,
) -> bool {
    let mut removed = false;
    loop {
        match *slot {
            AnchorSlot::Empty => return removed,
            AnchorSlot::Single(item) => {
                if item == anchor {
                    *slot = AnchorSlot::Empty;
                    removed = true;
                }
                return removed;
            }
            AnchorSlot::Multi(head) => match find(pool, head, anchor) {
                Some((chunk_idx, entry_idx, _)) => {
                    remove_at(slot, pool, head, chunk_idx, entry_idx);
                    removed = true;
                }
                None => return removed,
            },
        }
    }
}

/// Move `anchor` to the front (safe-anchor) position.
///
/// # Panics
///
/// Panics if `anchor` is not in the set.
pub(crate) fn promote_to_front(slot: &mut AnchorSlot, pool: &mut ChunkPool, anchor: NodeId) {
    match *slot {
        AnchorSlot::Empty => panic!("promoting anchor {anchor} in an empty set"),
        AnchorSlot::Single(item) => {
            assert!(item == anchor, "promoting absent anchor {anchor}");
        }
        AnchorSlot::Multi(head) => {
            let (chunk_idx, entry_idx, _) =
                find(pool, head, anchor).unwrap_or_else(|| panic!("promoting absent anchor {anchor}"));
            if chunk_idx == head && entry_idx == 0 {
                return;
            }
            let old_front = pool.get(head).items[0];
            pool.get_mut(chunk_idx).items[entry_idx as usize] = old_front;
            pool.get_mut(head).items[0] = anchor;
        }
    }
}

/// Release all pool storage and empty the set.
pub(crate) fn clear(slot: &mut AnchorSlot, pool: &mut ChunkPool) {
    if let AnchorSlot::Multi(head) = *slot {
        let mut cur = Some(head);
        while let Some(idx) = cur {
            cur = pool.get(idx).next;
            pool.free(idx);
        }
    }
    *slot = AnchorSlot::Empty;
}

// =============================================================================
// Queries
// =============================================================================

/// Whether `anchor` occurs in the set.
pub(crate) fn contains(slot: AnchorSlot, pool: &ChunkPool, anchor: NodeId) -> bool {
    match slot {
        AnchorSlot::Empty => false,
        AnchorSlot::Single(item) => item == anchor,
        AnchorSlot::Multi(head) => find(pool, head, anchor).is_some(),
    }
}

/// The front (safe-anchor) entry, if any.
pub(crate) fn front(slot: AnchorSlot, pool: &ChunkPool) -> Option<NodeId> {
    match slot {
        AnchorSlot::Empty => None,
        AnchorSlot::Single(item) => Some(item),
        AnchorSlot::Multi(head) => Some(pool.get(head).items[0]),
    }
}

/// Total entries in the set.
pub(crate) fn count(slot: AnchorSlot, pool: &ChunkPool) -> usize {
    match slot {
        AnchorSlot::Empty => 0,
        AnchorSlot::Single(_) => 1,
        AnchorSlot::Multi(head) => {
            let mut n = 0;
            let mut cur = Some(head);
            while let Some(idx) = cur {
                let chunk = pool.get(idx);
                n += chunk.len as usize;
                cur = chunk.next;
            }
            n
        }
    }
}

// =============================================================================
// Cursor
// =============================================================================

/// Resumable position in one node's anchor set.
///
/// The survival-path search keeps a stack of these instead of recursing.
/// Positions stay valid because the search never mutates anchor sets.
#[derive(Debug, Clone, Copy)]
pub(crate) enum AnchorCursor {
    /// Exhausted.
    Done,
    /// Inline single entry, not yet yielded.
    Single(NodeId),
    /// Chunked set, positioned at `chunk.items[idx]`.
    Chunk { chunk: u32, idx: u8 },
}

impl AnchorCursor {
    /// Cursor over the whole set.
    pub(crate) fn start(slot: AnchorSlot) -> Self {
        match slot {
            AnchorSlot::Empty => AnchorCursor::Done,
            AnchorSlot::Single(item) => AnchorCursor::Single(item),
            AnchorSlot::Multi(head) => AnchorCursor::Chunk {
                chunk: head,
                idx: 0,
            },
        }
    }

    /// Yield the next anchor, if any.
    pub(crate) fn next(&mut self, pool: &ChunkPool) -> Option<NodeId> {
        match *self {
            AnchorCursor::Done => None,
            AnchorCursor::Single(item) => {
                *self = AnchorCursor::Done;
                Some(item)
            }
            AnchorCursor::Chunk { chunk, idx } => {
                let c = pool.get(chunk);
                debug_assert!(idx < c.len, "cursor past end of chunk");
                let item = c.items[idx as usize];
                if (idx + 1) < c.len {
                    *self = AnchorCursor::Chunk {
                        chunk,
                        idx: idx + 1,
                    };
                } else {
                    *self = match c.next {
                        Some(next) => AnchorCursor::Chunk {
                            chunk: next,
                            idx: 0,
                        },
                        None => AnchorCursor::Done,
                    };
                }
                Some(item)
            }
        }
    }
}

// =============================================================================
// Internals
// =============================================================================

/// Locate `anchor`: (chunk index, entry index, logical position).
fn find(pool: &ChunkPool, head: u32, anchor: NodeId) -> Option<(u32, u8, usize)> {
    let mut logical = 0;
    let mut cur = Some(head);
    while let Some(idx) = cur {
        let chunk = pool.get(idx);
        for i in 0..chunk.len as usize {
            if chunk.items[i] == anchor {
                return Some((idx, i as u8, logical + i));
            }
        }
        logical += chunk.len as usize;
        cur = chunk.next;
    }
    None
}

/// Remove the entry at (`chunk_idx`, `entry_idx`) by swapping in the last
/// entry of the list, then collapse the representation if needed.
fn remove_at(
    slot: &mut AnchorSlot,
    pool: &mut ChunkPool,
    head: u32,
    chunk_idx: u32,
    entry_idx: u8,
) {
    // Find the last chunk and its predecessor.
    let mut prev: Option<u32> = None;
    let mut last = head;
    while let Some(next) = pool.get(last).next {
        prev = Some(last);
        last = next;
    }

    let last_chunk = pool.get_mut(last);
    last_chunk.len -= 1;
    let moved = last_chunk.items[last_chunk.len as usize];
    let last_emptied = last_chunk.len == 0;

    if !(chunk_idx == last && entry_idx == pool.get(last).len) {
        // The removed entry was not the popped one; fill the hole.
        pool.get_mut(chunk_idx).items[entry_idx as usize] = moved;
    }

    if last_emptied && last != head {
        pool.free(last);
        pool.get_mut(prev.expect("non-head chunk has a predecessor")).next = None;
    }

    // Collapse to the inline representation when one entry remains.
    if count(AnchorSlot::Multi(head), pool) == 1 {
        let remaining = pool.get(head).items[0];
        pool.free(head);
        *slot = AnchorSlot::Single(remaining);
    } else if count(AnchorSlot::Multi(head), pool) == 0 {
        pool.free(head);
        *slot = AnchorSlot::Empty;
    }
}
