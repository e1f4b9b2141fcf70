use std::{cmp::Ordering, collections::BinaryHeap};

use crate::dispatch::job::JobPriority;

struct PendingEntry<T> {
    priority: JobPriority,
    sequence: u64,
    item: T,
}

impl<T> PartialEq for PendingEntry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl<T> Eq for PendingEntry<T> {}

impl<T> PartialOrd for PendingEntry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for PendingEntry<T> {
    // BinaryHeap is a max-heap: the lowest priority value, then the oldest
    // sequence number, must compare as the greatest.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// Jobs waiting for a free buffer, ordered by priority and then by arrival.
pub struct PendingJobs<T> {
    heap: BinaryHeap<PendingEntry<T>>,
    next_sequence: u64,
}

impl<T> Default for PendingJobs<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PendingJobs<T> {
    pub fn new() -> Self {
        PendingJobs {
            heap: BinaryHeap::new(),
            next_sequence: 0,
        }
    }

    pub fn offer(&mut self, priority: JobPriority, item: T) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(PendingEntry {
            priority,
            sequence,
            item,
        });
    }

    pub fn poll(&mut self) -> Option<T> {
        self.heap.pop().map(|entry| entry.item)
    }

    pub fn peek_priority(&self) -> Option<JobPriority> {
        self.heap.peek().map(|entry| entry.priority)
    }

    /// Removes every pending job, in the order they would have run.
    pub fn drain(&mut self) -> Vec<T> {
        let mut drained = Vec::with_capacity(self.heap.len());
        while let Some(item) = self.poll() {
            drained.push(item);
        }
        drained
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
