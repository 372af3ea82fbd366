//! Outbound queue
//!
//! Holds messages produced while the socket is not open. When full, the
//! newest message is the one that is dropped.

use std::collections::VecDeque;

/// Bounded FIFO with drop-newest overflow
#[derive(Debug, Clone)]
pub struct OutboundQueue<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> OutboundQueue<T> {
    /// Empty queue holding at most `capacity` items
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an item; returns `false` (and drops it) when the queue is full
    pub fn enqueue(&mut self, item: T) -> bool {
        if self.items.len() >= self.capacity {
            return false;
        }
        self.items.push_back(item);
        true
    }

    /// Take every item in insertion order, leaving the queue empty
    pub fn drain(&mut self) -> Vec<T> {
        self.items.drain(..).collect()
    }

    /// Discard everything
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Items waiting
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// No items waiting
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Maximum number of items
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drops_newest_when_full() {
        let mut queue = OutboundQueue::new(10);
        for i in 1..=11 {
            let accepted = queue.enqueue(i);
            assert_eq!(accepted, i <= 10);
        }
        assert_eq!(queue.len(), 10);
        assert_eq!(queue.drain(), (1..=10).collect::<Vec<_>>());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_zero_capacity_drops_everything() {
        let mut queue = OutboundQueue::new(0);
        assert!(!queue.enqueue("a"));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_clear() {
        let mut queue = OutboundQueue::new(2);
        queue.enqueue('x');
        queue.clear();
        assert_eq!(queue.len(), 0);
        assert_eq!(queue.capacity(), 2);
    }
}
