//! Slot pool: a flat arena handing out fixed-size slots by index.
//!
//! All three collector-side stores (nodes, anchor chunks, shortcut records)
//! sit on this pool so that cycles in the reference graph are ordinary index
//! data rather than ownership cycles. Freeing pushes the slot onto an
//! intrusive free list; allocation pops it. Every operation is O(1).
//!
//! Slot exhaustion grows the backing vector. Hosts that need a hard ceiling
//! pre-size via `with_capacity` and treat growth as their own policy failure;
//! the pool itself never fails an allocation.

/// A pool slot: either live data or a link in the free list.
#[derive(Debug)]
enum Slot<T> {
    Free { next: Option<u32> },
    Used(T),
}

/// Index-addressed arena with an O(1) free list.
///
/// Handles are plain `u32` indices. A freed slot's index may be reused by a
/// later allocation; callers that outlive their handles must clear them
/// eagerly (the collector does: garbage processing severs every reference to
/// a record before its slot is freed).
#[derive(Debug)]
pub struct SlotPool<T> {
    slots: Vec<Slot<T>>,
    free_head: Option<u32>,
    live: usize,
}

impl<T> SlotPool<T> {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_head: None,
            live: 0,
        }
    }

    /// Create an empty pool with pre-reserved capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free_head: None,
            live: 0,
        }
    }

    /// Allocate a slot holding `value` and return its index.
    pub fn allocate(&mut self, value: T) -> u32 {
        self.live += 1;
        match self.free_head {
            Some(idx) => {
                let slot = &mut self.slots[idx as usize];
                match *slot {
                    Slot::Free { next } => self.free_head = next,
                    Slot::Used(_) => unreachable!("free list points at a live slot"),
                }
                *slot = Slot::Used(value);
                idx
            }
            None => {
                let idx = self.slots.len() as u32;
                self.slots.push(Slot::Used(value));
                idx
            }
        }
    }

    /// Free the slot at `idx`, returning its value.
    ///
    /// # Panics
    ///
    /// Panics if the slot is already free: double-free of a collector record
    /// means the anchor graph is corrupt.
    pub fn free(&mut self, idx: u32) -> T {
        let slot = std::mem::replace(
            &mut self.slots[idx as usize],
            Slot::Free {
                next: self.free_head,
            },
        );
        match slot {
            Slot::Used(value) => {
                self.free_head = Some(idx);
                self.live -= 1;
                value
            }
            Slot::Free { .. } => panic!("double free of pool slot {idx}"),
        }
    }

    /// Borrow the value at `idx`.
    ///
    /// # Panics
    ///
    /// Panics if the slot is free.
    #[inline]
    pub fn get(&self, idx: u32) -> &T {
        match &self.slots[idx as usize] {
            Slot::Used(value) => value,
            Slot::Free { .. } => panic!("access to freed pool slot {idx}"),
        }
    }

    /// Mutably borrow the value at `idx`.
    ///
    /// # Panics
    ///
    /// Panics if the slot is free.
    #[inline]
    pub fn get_mut(&mut self, idx: u32) -> &mut T {
        match &mut self.slots[idx as usize] {
            Slot::Used(value) => value,
            Slot::Free { .. } => panic!("access to freed pool slot {idx}"),
        }
    }

    /// Whether `idx` names a live slot.
    #[inline]
    pub fn is_live(&self, idx: u32) -> bool {
        matches!(
            self.slots.get(idx as usize),
            Some(Slot::Used(_))
        )
    }

    /// Number of live slots.
    #[inline]
    pub fn live_count(&self) -> usize {
        self.live
    }

    /// Total slots ever allocated (live + free-listed).
    #[inline]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Iterate over `(index, value)` for every live slot.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &T)> {
        self.slots.iter().enumerate().filter_map(|(i, s)| match s {
            Slot::Used(value) => Some((i as u32, value)),
            Slot::Free { .. } => None,
        })
    }
}

impl<T> Default for SlotPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_and_get() {
        let mut pool = SlotPool::new();
        let a = pool.allocate("a");
        let b = pool.allocate("b");
        assert_eq!(*pool.get(a), "a");
        assert_eq!(*pool.get(b), "b");
        assert_eq!(pool.live_count(), 2);
    }

    #[test]
    fn test_free_list_reuse() {
        let mut pool = SlotPool::new();
        let a = pool.allocate(1);
        let b = pool.allocate(2);
        let c = pool.allocate(3);

        assert_eq!(pool.free(b), 2);
        assert_eq!(pool.live_count(), 2);

        // Most recently freed slot is reused first
        let d = pool.allocate(4);
        assert_eq!(d, b);
        assert_eq!(*pool.get(d), 4);
        assert_eq!(pool.slot_count(), 3);

        let _ = (a, c);
    }

    #[test]
    fn test_lifo_free_order() {
        let mut pool = SlotPool::new();
        let a = pool.allocate(1);
        let b = pool.allocate(2);
        pool.free(a);
        pool.free(b);
        assert_eq!(pool.allocate(10), b);
        assert_eq!(pool.allocate(11), a);
    }

    #[test]
    #[should_panic(expected = "double free")]
    fn test_double_free_panics() {
        let mut pool = SlotPool::new();
        let a = pool.allocate(1);
        pool.free(a);
        pool.free(a);
    }

    #[test]
    #[should_panic(expected = "freed pool slot")]
    fn test_use_after_free_panics() {
        let mut pool = SlotPool::new();
        let a = pool.allocate(1);
        pool.free(a);
        pool.get(a);
    }

    #[test]
    fn test_iter_skips_free_slots() {
        let mut pool = SlotPool::new();
        let a = pool.allocate("a");
        let b = pool.allocate("b");
        let c = pool.allocate("c");
        pool.free(b);

        let live: Vec<_> = pool.iter().collect();
        assert_eq!(live, vec![(a, &"a"), (c, &"c")]);
    }
}
