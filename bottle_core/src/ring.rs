//! Fixed-capacity circular log with wraparound-corrected read-out.

/// Circular buffer that silently overwrites its oldest entry once full.
///
/// Invariants: `write_index < capacity`, `count <= capacity`. The oldest entry
/// is slot 0 until the buffer first fills, then the slot at `write_index`.
#[derive(Debug, Clone, PartialEq)]
pub struct RingLog<T> {
    slots: Vec<T>,
    write_index: usize,
    count: usize,
}

impl<T: Clone + Default> RingLog<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![T::default(); capacity.max(1)],
            write_index: 0,
            count: 0,
        }
    }

    /// Rebuild from decoded parts; `None` if the bookkeeping is inconsistent.
    pub fn from_parts(slots: Vec<T>, write_index: usize, count: usize) -> Option<Self> {
        let cap = slots.len();
        if cap == 0 || write_index >= cap || count > cap {
            return None;
        }
        // an unfilled buffer has always written contiguously from slot 0
        if count < cap && write_index != count {
            return None;
        }
        Some(Self {
            slots,
            write_index,
            count,
        })
    }
}

impl<T> RingLog<T> {
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn write_index(&self) -> usize {
        self.write_index
    }

    /// Raw slots in storage order, for encoding.
    pub fn slots(&self) -> &[T] {
        &self.slots
    }

    pub fn push(&mut self, item: T) {
        let cap = self.slots.len();
        self.slots[self.write_index] = item;
        self.write_index = (self.write_index + 1) % cap;
        self.count = (self.count + 1).min(cap);
    }

    fn oldest(&self) -> usize {
        if self.count < self.slots.len() {
            0
        } else {
            self.write_index
        }
    }

    /// Entry `i` in chronological order (0 = oldest).
    pub fn get(&self, i: usize) -> Option<&T> {
        if i >= self.count {
            return None;
        }
        self.slots.get((self.oldest() + i) % self.slots.len())
    }

    pub fn chronological(&self) -> impl Iterator<Item = &T> + '_ {
        (0..self.count).filter_map(move |i| self.get(i))
    }

    pub fn latest(&self) -> Option<&T> {
        self.count.checked_sub(1).and_then(|i| self.get(i))
    }
}

impl<T: Clone> RingLog<T> {
    /// Up to `limit` entries starting `offset` entries after the oldest.
    pub fn page(&self, offset: usize, limit: usize) -> Vec<T> {
        self.chronological().skip(offset).take(limit).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn filled(cap: usize, n: u32) -> RingLog<u32> {
        let mut r = RingLog::new(cap);
        for v in 1..=n {
            r.push(v);
        }
        r
    }

    #[rstest]
    #[case(5, 0, vec![])]
    #[case(5, 3, vec![1, 2, 3])]
    #[case(5, 5, vec![1, 2, 3, 4, 5])]
    #[case(5, 7, vec![3, 4, 5, 6, 7])]
    #[case(5, 12, vec![8, 9, 10, 11, 12])]
    fn chronological_order(#[case] cap: usize, #[case] n: u32, #[case] want: Vec<u32>) {
        let r = filled(cap, n);
        assert_eq!(r.chronological().copied().collect::<Vec<_>>(), want);
        assert!(r.write_index() < r.capacity());
        assert!(r.len() <= r.capacity());
    }

    #[test]
    fn paging_and_latest() {
        let r = filled(4, 6);
        assert_eq!(r.page(0, 2), vec![3, 4]);
        assert_eq!(r.page(2, 10), vec![5, 6]);
        assert!(r.page(4, 1).is_empty());
        assert_eq!(r.latest(), Some(&6));
        assert_eq!(RingLog::<u32>::new(3).latest(), None);
    }

    #[test]
    fn from_parts_rejects_inconsistent_bookkeeping() {
        assert!(RingLog::from_parts(vec![0u32; 4], 4, 0).is_none());
        assert!(RingLog::from_parts(vec![0u32; 4], 0, 5).is_none());
        assert!(RingLog::from_parts(vec![0u32; 4], 1, 3).is_none());
        let r = RingLog::from_parts(vec![7u32, 8, 9, 6], 3, 4).unwrap();
        assert_eq!(r.chronological().copied().collect::<Vec<_>>(), vec![6, 7, 8, 9]);
    }
}
