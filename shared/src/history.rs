//! Fixed-size circular history of recently seen message ids
//!
//! Used by the Store to recognise a Confirmed/Ordered datagram it already
//! delivered, and by the client to recognise a resent delta it already
//! applied. Memory is bounded: once full, the oldest id is evicted.

/// Circular buffer of the last `capacity` distinct ids
#[derive(Debug, Clone)]
pub struct IdHistory<T> {
    entries: Vec<T>,
    capacity: usize,
    next: usize,
}

impl<T: Copy + PartialEq> IdHistory<T> {
    /// Creates an empty history remembering at most `capacity` ids
    ///
    /// A capacity of zero is bumped to one so that an immediate repeat is
    /// always caught.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
            next: 0,
        }
    }

    pub fn contains(&self, id: T) -> bool {
        self.entries.contains(&id)
    }

    /// Records `id`, evicting the oldest entry when full. Returns false if the
    /// id was already present (nothing is recorded in that case).
    pub fn insert(&mut self, id: T) -> bool {
        if self.contains(id) {
            return false;
        }
        if self.entries.len() < self.capacity {
            self.entries.push(id);
        } else {
            self.entries[self.next] = id;
        }
        self.next = (self.next + 1) % self.capacity;
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.next = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeat_is_detected() {
        let mut history = IdHistory::new(4);
        assert!(history.insert(3u16));
        assert!(!history.insert(3u16));
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_oldest_is_evicted_when_full() {
        let mut history = IdHistory::new(3);
        for id in 1u16..=3 {
            history.insert(id);
        }
        assert!(history.contains(1));

        history.insert(4);
        assert_eq!(history.len(), 3);
        assert!(!history.contains(1));
        assert!(history.contains(2));
        assert!(history.contains(4));

        // An evicted id is accepted as new again.
        assert!(history.insert(1));
        assert!(!history.contains(2));
    }

    #[test]
    fn test_zero_capacity_still_remembers_last() {
        let mut history = IdHistory::new(0);
        assert_eq!(history.capacity(), 1);
        assert!(history.insert(9u8));
        assert!(!history.insert(9u8));
        assert!(history.insert(10u8));
        assert!(!history.contains(9u8));
    }
}
