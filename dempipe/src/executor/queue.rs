//! FIFO task queue shared by the supervisor, the ledger actor and the
//! workers.
//!
//! Producers push from any thread. Workers block in
//! [`TaskQueue::pop_timeout`] until a task arrives, the wait times out, or
//! the queue is closed for shutdown.
//!
//! # Example
//!
//! ```ignore
//! use dempipe::executor::{Task, TaskQueue};
//!
//! let queue = TaskQueue::new();
//! queue.push(Task::Split { tile: TileId::new("37EN1") });
//!
//! match queue.pop_timeout(Duration::from_secs(60)) {
//!     Some(queued) => route(queued.task),
//!     None => debug!("Idle"),
//! }
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::task::Task;

// =============================================================================
// Queued Task
// =============================================================================

/// A task waiting to be executed.
#[derive(Debug)]
pub struct QueuedTask {
    pub task: Task,

    /// Monotonic enqueue number.
    pub sequence: u64,

    /// When the task was enqueued (for wait time telemetry).
    pub enqueued_at: Instant,
}

impl QueuedTask {
    /// Returns how long this task has been waiting in the queue.
    pub fn wait_time(&self) -> Duration {
        self.enqueued_at.elapsed()
    }
}

// =============================================================================
// Task Queue
// =============================================================================

/// Concurrent FIFO of pending tasks.
#[derive(Debug, Default)]
pub struct TaskQueue {
    items: Mutex<VecDeque<QueuedTask>>,
    available: Condvar,
    sequence: AtomicU64,
    /// Pushed tasks not yet reported done.
    outstanding: AtomicUsize,
    closed: AtomicBool,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a task and wakes one waiting worker.
    pub fn push(&self, task: Task) {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        let queued = QueuedTask {
            task,
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
            enqueued_at: Instant::now(),
        };
        self.items.lock().push_back(queued);
        self.available.notify_one();
    }

    /// Appends tasks in order.
    pub fn push_all(&self, tasks: impl IntoIterator<Item = Task>) {
        for task in tasks {
            self.push(task);
        }
    }

    /// Removes the oldest task without waiting.
    pub fn try_pop(&self) -> Option<QueuedTask> {
        self.items.lock().pop_front()
    }

    /// Removes the oldest task, waiting up to `timeout` for one.
    ///
    /// Returns `None` on timeout or once the queue is closed.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<QueuedTask> {
        let deadline = Instant::now() + timeout;
        let mut items = self.items.lock();
        loop {
            if self.is_closed() {
                return None;
            }
            if let Some(queued) = items.pop_front() {
                return Some(queued);
            }
            if self.available.wait_until(&mut items, deadline).timed_out() {
                return items.pop_front().filter(|_| !self.is_closed());
            }
        }
    }

    /// Counts one unit of work that is not a queued task, such as a
    /// completion notice on its way to the ledger. Balanced by
    /// [`TaskQueue::task_done`].
    pub fn hold(&self) {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
    }

    /// Marks one popped task (or held unit) as finished, after its
    /// follow-ons were pushed.
    pub fn task_done(&self) {
        let _ = self
            .outstanding
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    /// Work pushed or held and not yet finished.
    ///
    /// Reaches zero only when nothing is queued, running or in flight to
    /// the ledger.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Wakes every waiter and makes further pops return `None`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        // Take the lock so no waiter misses the flag between check and wait.
        let _items = self.items.lock();
        self.available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::TileId;
    use std::sync::Arc;
    use std::thread;

    fn split(name: &str) -> Task {
        Task::Split {
            tile: TileId::new(name),
        }
    }

    #[test]
    fn test_fifo_order() {
        let queue = TaskQueue::new();
        queue.push_all([split("A"), split("B"), split("C")]);
        assert_eq!(queue.len(), 3);

        let order: Vec<String> = std::iter::from_fn(|| queue.try_pop())
            .map(|q| q.task.tile().to_string())
            .collect();
        assert_eq!(order, ["A", "B", "C"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_sequence_increases() {
        let queue = TaskQueue::new();
        queue.push(split("A"));
        queue.push(split("B"));
        let a = queue.try_pop().unwrap();
        let b = queue.try_pop().unwrap();
        assert!(a.sequence < b.sequence);
    }

    #[test]
    fn test_outstanding_counts_until_done() {
        let queue = TaskQueue::new();
        queue.push(split("A"));
        let _popped = queue.try_pop().unwrap();
        assert!(queue.is_empty());
        assert_eq!(queue.outstanding(), 1);

        queue.push(split("B"));
        assert_eq!(queue.outstanding(), 2);
        queue.task_done();
        assert_eq!(queue.outstanding(), 1);
        assert!(!queue.is_empty());

        let _popped = queue.try_pop().unwrap();
        assert!(queue.is_empty());
        assert_eq!(queue.outstanding(), 1);
        queue.task_done();
        assert_eq!(queue.outstanding(), 0);

        // extra completions never underflow
        queue.task_done();
        assert_eq!(queue.outstanding(), 0);

        queue.hold();
        assert!(queue.is_empty());
        assert_eq!(queue.outstanding(), 1);
        queue.task_done();
        assert_eq!(queue.outstanding(), 0);
    }

    #[test]
    fn test_pop_timeout_on_empty_queue() {
        let queue = TaskQueue::new();
        let started = Instant::now();
        assert!(queue.pop_timeout(Duration::from_millis(20)).is_none());
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_pop_wakes_on_push() {
        let queue = Arc::new(TaskQueue::new());
        let producer = Arc::clone(&queue);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            producer.push(split("A"));
        });

        let popped = queue.pop_timeout(Duration::from_secs(5));
        handle.join().unwrap();
        assert_eq!(popped.unwrap().task.tile().as_str(), "A");
    }

    #[test]
    fn test_close_releases_waiters() {
        let queue = Arc::new(TaskQueue::new());
        let waiter = Arc::clone(&queue);
        let handle = thread::spawn(move || waiter.pop_timeout(Duration::from_secs(30)));

        thread::sleep(Duration::from_millis(20));
        let started = Instant::now();
        queue.close();
        assert!(handle.join().unwrap().is_none());
        assert!(started.elapsed() < Duration::from_secs(5));

        queue.push(split("late"));
        assert!(queue.pop_timeout(Duration::from_millis(1)).is_none());
    }
}
