//! Dead-letter path for records that fail conversion.
//!
//! Encode-failed records must not be silently discarded; they are queued
//! here for the caller to take. The queue is bounded with an explicit
//! full-queue policy: the oldest entry is dropped, loudly.

use crate::convert::WriteResult;
use parking_lot::Mutex;
use std::collections::VecDeque;
use tracing::warn;

/// Default capacity of the dead-letter queue.
pub const DEFAULT_DEAD_LETTER_CAPACITY: usize = 1024;

/// Bounded queue of failed write results.
pub struct DeadLetterQueue {
    entries: Mutex<VecDeque<WriteResult>>,
    capacity: usize,
}

impl DeadLetterQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    /// Enqueue a failed result. When full, the oldest entry is dropped and
    /// the drop is logged with the entry's key.
    pub fn push(&self, result: WriteResult) {
        let mut entries = self.entries.lock();
        if entries.len() >= self.capacity {
            if let Some(dropped) = entries.pop_front() {
                warn!(
                    key = %dropped.key,
                    capacity = self.capacity,
                    "Dead-letter queue full, dropping oldest entry"
                );
            }
        }
        entries.push_back(result);
    }

    /// Take every queued entry, leaving the queue empty.
    pub fn take_all(&self) -> Vec<WriteResult> {
        self.entries.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for DeadLetterQueue {
    fn default() -> Self {
        Self::new(DEFAULT_DEAD_LETTER_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConvertError;

    fn entry(key: &str) -> WriteResult {
        WriteResult::batch_failure(key, ConvertError::Finalize("x".into()).into())
    }

    #[test]
    fn test_push_and_take() {
        let queue = DeadLetterQueue::new(8);
        queue.push(entry("a"));
        queue.push(entry("b"));
        assert_eq!(queue.len(), 2);

        let taken = queue.take_all();
        assert_eq!(taken.len(), 2);
        assert_eq!(taken[0].key, "a");
        assert!(queue.is_empty());
    }

    #[test]
    fn test_full_queue_drops_oldest() {
        let queue = DeadLetterQueue::new(2);
        queue.push(entry("a"));
        queue.push(entry("b"));
        queue.push(entry("c"));

        let taken = queue.take_all();
        assert_eq!(taken.len(), 2);
        assert_eq!(taken[0].key, "b");
        assert_eq!(taken[1].key, "c");
    }
}
