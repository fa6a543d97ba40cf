//! Pending queue ordering
//!
//! Tasks are dispatched in priority order, with FIFO ordering within a
//! priority band. The queue only stores ids; task records live in the
//! scheduler.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::task::{TaskId, TaskPriority};

/// A queued task reference
///
/// Ordered by priority (higher first), then by sequence number (earlier
/// first).
#[derive(Debug, Clone, Copy)]
pub struct QueueEntry {
    pub id: TaskId,
    pub priority: TaskPriority,
    /// Queue order; a resumed or retried task gets a new one
    pub sequence: u64,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.priority.cmp(&other.priority) {
            // BinaryHeap is a max heap: the earlier sequence must compare greater
            Ordering::Equal => other.sequence.cmp(&self.sequence),
            ordering => ordering,
        }
    }
}

/// Priority queue of pending tasks
///
/// Not synchronized: it lives inside the scheduler state and is only touched
/// under the scheduler lock.
#[derive(Debug, Default)]
pub struct PendingQueue {
    heap: BinaryHeap<QueueEntry>,
    next_sequence: u64,
}

impl PendingQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a task behind everything already queued at its priority
    pub fn push(&mut self, id: TaskId, priority: TaskPriority) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(QueueEntry {
            id,
            priority,
            sequence,
        });
    }

    /// Pop the next task to dispatch
    pub fn pop(&mut self) -> Option<QueueEntry> {
        self.heap.pop()
    }

    /// Next task to dispatch, without removing it
    #[cfg(test)]
    pub fn peek(&self) -> Option<&QueueEntry> {
        self.heap.peek()
    }

    /// Remove a task; returns whether it was queued
    pub fn remove(&mut self, id: TaskId) -> bool {
        let before = self.heap.len();
        self.heap.retain(|entry| entry.id != id);
        self.heap.len() != before
    }

    /// Remove every task matching a predicate, returning the removed entries
    pub fn remove_if<F>(&mut self, predicate: F) -> Vec<QueueEntry>
    where
        F: Fn(&QueueEntry) -> bool,
    {
        let mut removed = Vec::new();
        self.heap.retain(|entry| {
            if predicate(entry) {
                removed.push(*entry);
                false
            } else {
                true
            }
        });
        removed.sort_by(|a, b| b.cmp(a));
        removed
    }

    /// Queued entries in dispatch order
    pub fn ordered(&self) -> Vec<QueueEntry> {
        let mut entries: Vec<QueueEntry> = self.heap.iter().copied().collect();
        entries.sort_by(|a, b| b.cmp(a));
        entries
    }

    /// Number of queued tasks
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Check if no task is queued
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(TaskPriority::Urgent > TaskPriority::High);
        assert!(TaskPriority::High > TaskPriority::Normal);
        assert!(TaskPriority::Normal > TaskPriority::Low);
    }

    #[test]
    fn test_higher_priority_first() {
        let mut queue = PendingQueue::new();
        queue.push(1, TaskPriority::Low);
        queue.push(2, TaskPriority::Urgent);
        queue.push(3, TaskPriority::Normal);
        queue.push(4, TaskPriority::High);

        let order: Vec<TaskId> = std::iter::from_fn(|| queue.pop()).map(|e| e.id).collect();
        assert_eq!(order, vec![2, 4, 3, 1]);
    }

    #[test]
    fn test_fifo_within_priority() {
        let mut queue = PendingQueue::new();
        queue.push(1, TaskPriority::Normal);
        queue.push(2, TaskPriority::Normal);
        queue.push(3, TaskPriority::High);
        queue.push(4, TaskPriority::Normal);

        let order: Vec<TaskId> = std::iter::from_fn(|| queue.pop()).map(|e| e.id).collect();
        assert_eq!(order, vec![3, 1, 2, 4]);
    }

    #[test]
    fn test_requeue_goes_to_back_of_band() {
        let mut queue = PendingQueue::new();
        queue.push(1, TaskPriority::Normal);
        queue.push(2, TaskPriority::Normal);
        assert!(queue.remove(1));
        queue.push(1, TaskPriority::Normal);

        assert_eq!(queue.pop().map(|e| e.id), Some(2));
        assert_eq!(queue.pop().map(|e| e.id), Some(1));
    }

    #[test]
    fn test_remove() {
        let mut queue = PendingQueue::new();
        queue.push(1, TaskPriority::Normal);
        queue.push(2, TaskPriority::Low);

        assert!(queue.remove(2));
        assert!(!queue.remove(2));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.peek().map(|e| e.id), Some(1));
    }

    #[test]
    fn test_remove_if_returns_dispatch_order() {
        let mut queue = PendingQueue::new();
        queue.push(1, TaskPriority::Low);
        queue.push(2, TaskPriority::High);
        queue.push(3, TaskPriority::Low);
        queue.push(4, TaskPriority::Normal);

        let removed = queue.remove_if(|e| e.priority <= TaskPriority::Normal);
        let ids: Vec<TaskId> = removed.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![4, 1, 3]);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_ordered_snapshot() {
        let mut queue = PendingQueue::new();
        queue.push(1, TaskPriority::Low);
        queue.push(2, TaskPriority::Urgent);
        queue.push(3, TaskPriority::Low);

        let ids: Vec<TaskId> = queue.ordered().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![2, 1, 3]);
        assert_eq!(queue.len(), 3);
        assert!(!queue.is_empty());
    }
}
