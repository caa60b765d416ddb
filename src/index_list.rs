use std::sync::atomic::{AtomicU32, Ordering};

/// CPU-side model of a GPU counted index buffer: a fixed slot array paired
/// with an atomic append/consume counter. Mirrors the shader-side protocol
/// exactly, including the wrap-around guard on over-consume, so the
/// simulation logic can be exercised without a GPU.
///
/// Push reserves a slot with an atomic increment; pop reserves with an
/// atomic decrement and restores the counter when the list was already
/// empty (the decrement of an unsigned zero wraps, which the guard detects
/// by the reservation exceeding capacity).
pub struct CountedIndexList {
    slots: Vec<AtomicU32>,
    count: AtomicU32,
    capacity: u32,
}

impl CountedIndexList {
    /// An empty list with room for `capacity` indices.
    pub fn with_capacity(capacity: u32) -> Self {
        let slots = (0..capacity).map(|_| AtomicU32::new(0)).collect();
        CountedIndexList {
            slots,
            count: AtomicU32::new(0),
            capacity,
        }
    }

    /// A full free list holding every index in `0..capacity`, the initial
    /// state of the dead list.
    pub fn full(capacity: u32) -> Self {
        let slots = (0..capacity).map(AtomicU32::new).collect();
        CountedIndexList {
            slots,
            count: AtomicU32::new(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn len(&self) -> u32 {
        self.count.load(Ordering::SeqCst).min(self.capacity)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends an index. Returns false (leaving the counter intact) when
    /// the list is full.
    pub fn try_push(&self, index: u32) -> bool {
        let reserved = self.count.fetch_add(1, Ordering::SeqCst);
        if reserved >= self.capacity {
            self.count.fetch_sub(1, Ordering::SeqCst);
            return false;
        }
        self.slots[reserved as usize].store(index, Ordering::SeqCst);
        true
    }

    /// Consumes the most recently appended index. Returns None (restoring
    /// the counter) when the list is empty, even under concurrent
    /// over-consume.
    pub fn try_pop(&self) -> Option<u32> {
        let before = self.count.fetch_sub(1, Ordering::SeqCst);
        if before == 0 || before > self.capacity {
            // Wrapped below zero, or raced with another over-consume.
            self.count.fetch_add(1, Ordering::SeqCst);
            return None;
        }
        Some(self.slots[(before - 1) as usize].load(Ordering::SeqCst))
    }

    /// Counter reset, the CPU mirror of the zero-copy into a GPU counter.
    pub fn reset(&self) {
        self.count.store(0, Ordering::SeqCst);
    }

    /// Overwrites this list's contents and counter from another, the CPU
    /// mirror of the ping-pong list copy.
    pub fn copy_from(&self, other: &Self) {
        assert_eq!(self.capacity, other.capacity);
        let len = other.len();
        for i in 0..len as usize {
            self.slots[i].store(other.slots[i].load(Ordering::SeqCst), Ordering::SeqCst);
        }
        self.count.store(len, Ordering::SeqCst);
    }

    /// Snapshot of the live entries.
    pub fn indices(&self) -> Vec<u32> {
        (0..self.len() as usize)
            .map(|i| self.slots[i].load(Ordering::SeqCst))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn push_pop_round_trip() {
        let list = CountedIndexList::with_capacity(4);
        assert!(list.try_push(7));
        assert!(list.try_push(9));
        assert_eq!(list.len(), 2);
        assert_eq!(list.try_pop(), Some(9));
        assert_eq!(list.try_pop(), Some(7));
        assert_eq!(list.try_pop(), None);
    }

    #[test]
    fn pop_on_empty_does_not_corrupt_counter() {
        let list = CountedIndexList::with_capacity(8);
        for _ in 0..5 {
            assert_eq!(list.try_pop(), None);
        }
        assert_eq!(list.len(), 0);
        assert!(list.try_push(3));
        assert_eq!(list.len(), 1);
        assert_eq!(list.try_pop(), Some(3));
    }

    #[test]
    fn push_on_full_is_rejected() {
        let list = CountedIndexList::full(3);
        assert!(!list.try_push(99));
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn full_list_pops_every_index_once() {
        let list = CountedIndexList::full(16);
        let mut seen = HashSet::new();
        while let Some(i) = list.try_pop() {
            assert!(seen.insert(i), "index {} popped twice", i);
        }
        assert_eq!(seen.len(), 16);
    }

    #[test]
    fn copy_and_reset_mirror_ping_pong() {
        let a = CountedIndexList::with_capacity(4);
        let b = CountedIndexList::with_capacity(4);
        b.try_push(2);
        b.try_push(0);
        a.copy_from(&b);
        b.reset();
        assert_eq!(a.indices(), vec![2, 0]);
        assert_eq!(b.len(), 0);
    }

    #[test]
    fn concurrent_over_consume_is_safe() {
        // More poppers than entries; every index must come out exactly once
        // and the counter must settle at zero.
        let list = Arc::new(CountedIndexList::full(64));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let list = Arc::clone(&list);
            handles.push(std::thread::spawn(move || {
                let mut got = Vec::new();
                for _ in 0..32 {
                    if let Some(i) = list.try_pop() {
                        got.push(i);
                    }
                }
                got
            }));
        }
        let mut seen = HashSet::new();
        for h in handles {
            for i in h.join().unwrap() {
                assert!(seen.insert(i), "index {} popped twice", i);
            }
        }
        assert_eq!(seen.len(), 64);
        assert_eq!(list.len(), 0);
    }

    #[test]
    fn concurrent_push_keeps_entries_distinct() {
        let list = Arc::new(CountedIndexList::with_capacity(256));
        let mut handles = Vec::new();
        for t in 0..4u32 {
            let list = Arc::clone(&list);
            handles.push(std::thread::spawn(move || {
                for i in 0..64 {
                    assert!(list.try_push(t * 64 + i));
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        let entries: HashSet<u32> = list.indices().into_iter().collect();
        assert_eq!(entries.len(), 256);
    }
}
