//! Work queue contract between the orchestrator and batch workers.
//!
//! The core only depends on the `JobQueue` trait; `MemoryQueue` is the
//! in-process default. Priorities order interactive single-photo
//! regeneration ahead of on-demand misses, which in turn run ahead of
//! bulk batch work.

use std::collections::BinaryHeap;
use std::sync::{Condvar, Mutex};

/// Priority for bulk batch generation.
pub const PRIORITY_BATCH: u8 = 0;
/// Priority for on-demand cache-miss regeneration.
pub const PRIORITY_ON_DEMAND: u8 = 5;
/// Priority for user-triggered rotation regeneration.
pub const PRIORITY_INTERACTIVE: u8 = 9;

/// A unit of work handed to the worker pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    /// One batch of a fanned-out generation job.
    GenerateBatch {
        job_id: i64,
        photo_ids: Vec<i64>,
        batch_index: usize,
        /// Photo count across all batches of the parent job.
        total_photos: usize,
    },
    /// Single-photo regeneration, queued by rotation edits and
    /// on-demand misses.
    RegeneratePhoto { photo_id: i64 },
}

/// Queue contract. The pipeline never assumes a specific broker; any
/// implementation with enqueue/dequeue semantics can back it.
pub trait JobQueue: Send + Sync {
    fn enqueue(&self, task: Task, priority: u8);

    /// Block until a task is available or the queue is closed.
    fn dequeue(&self) -> Option<Task>;

    /// Non-blocking variant used by drain loops.
    fn try_dequeue(&self) -> Option<Task>;

    /// Wake all blocked consumers; subsequent dequeues on an empty
    /// queue return None.
    fn close(&self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct Entry {
    priority: u8,
    /// Monotonic sequence for FIFO order within a priority class.
    seq: u64,
    task: Task,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Max-heap: higher priority first, then older entries first.
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Default)]
struct QueueState {
    heap: BinaryHeap<Entry>,
    next_seq: u64,
    closed: bool,
}

/// In-memory priority queue: Mutex-guarded heap plus a condvar for
/// blocking consumers.
#[derive(Default)]
pub struct MemoryQueue {
    state: Mutex<QueueState>,
    available: Condvar,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobQueue for MemoryQueue {
    fn enqueue(&self, task: Task, priority: u8) {
        let mut state = self.state.lock().expect("queue mutex poisoned");
        let seq = state.next_seq;
        state.next_seq += 1;
        state.heap.push(Entry {
            priority,
            seq,
            task,
        });
        self.available.notify_one();
    }

    fn dequeue(&self) -> Option<Task> {
        let mut state = self.state.lock().expect("queue mutex poisoned");
        loop {
            if let Some(entry) = state.heap.pop() {
                return Some(entry.task);
            }
            if state.closed {
                return None;
            }
            state = self
                .available
                .wait(state)
                .expect("queue mutex poisoned");
        }
    }

    fn try_dequeue(&self) -> Option<Task> {
        let mut state = self.state.lock().expect("queue mutex poisoned");
        state.heap.pop().map(|entry| entry.task)
    }

    fn close(&self) {
        let mut state = self.state.lock().expect("queue mutex poisoned");
        state.closed = true;
        self.available.notify_all();
    }

    fn len(&self) -> usize {
        self.state.lock().expect("queue mutex poisoned").heap.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn batch(job_id: i64) -> Task {
        Task::GenerateBatch {
            job_id,
            photo_ids: vec![1],
            batch_index: 0,
            total_photos: 1,
        }
    }

    #[test]
    fn higher_priority_dequeues_first() {
        let queue = MemoryQueue::new();
        queue.enqueue(batch(1), PRIORITY_BATCH);
        queue.enqueue(Task::RegeneratePhoto { photo_id: 7 }, PRIORITY_INTERACTIVE);
        queue.enqueue(batch(2), PRIORITY_BATCH);

        assert_eq!(
            queue.try_dequeue(),
            Some(Task::RegeneratePhoto { photo_id: 7 })
        );
        assert_eq!(queue.try_dequeue(), Some(batch(1)));
        assert_eq!(queue.try_dequeue(), Some(batch(2)));
        assert_eq!(queue.try_dequeue(), None);
    }

    #[test]
    fn fifo_within_a_priority_class() {
        let queue = MemoryQueue::new();
        for job_id in 0..5 {
            queue.enqueue(batch(job_id), PRIORITY_BATCH);
        }
        for job_id in 0..5 {
            assert_eq!(queue.try_dequeue(), Some(batch(job_id)));
        }
    }

    #[test]
    fn close_releases_blocked_consumers() {
        let queue = Arc::new(MemoryQueue::new());
        let consumer = {
            let queue = Arc::clone(&queue);
            std::thread::spawn(move || queue.dequeue())
        };
        // Give the consumer a moment to block, then close.
        std::thread::sleep(std::time::Duration::from_millis(20));
        queue.close();
        assert_eq!(consumer.join().unwrap(), None);
    }

    #[test]
    fn dequeue_drains_before_reporting_closed() {
        let queue = MemoryQueue::new();
        queue.enqueue(batch(1), PRIORITY_BATCH);
        queue.close();
        assert_eq!(queue.dequeue(), Some(batch(1)));
        assert_eq!(queue.dequeue(), None);
    }
}
