//! Thread-safe FIFO message queues.
//!
//! Each queue owns its storage exclusively; cross-thread access happens only
//! through the synchronized operations here, never by exposing the deque.
//! Consumers block on a condition variable rather than busy-polling, and a
//! closed flag lets shutdown wake any blocked consumer immediately.
//!
//! Queues are unbounded by policy: producers are expected to outrun the
//! network, and a silent drop under pressure would violate the delivery
//! guarantee. Closing a queue refuses new items but keeps already-queued
//! items drainable, so messages received before a shutdown are never lost.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

struct Inner<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Unbounded FIFO queue with blocking and non-blocking consumers.
pub struct MessageQueue<T> {
    inner: Mutex<Inner<T>>,
    available: Condvar,
}

impl<T> Default for MessageQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> MessageQueue<T> {
    /// Create an empty, open queue
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner { items: VecDeque::new(), closed: false }),
            available: Condvar::new(),
        }
    }

    // A poisoned lock means a panic in another holder; the deque itself is
    // still structurally sound, so keep going rather than propagate poison.
    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue an item, waking one blocked consumer.
    ///
    /// Returns `false` (and drops the item) if the queue is closed.
    pub fn push(&self, item: T) -> bool {
        let mut inner = self.lock();
        if inner.closed {
            return false;
        }
        inner.items.push_back(item);
        self.available.notify_one();
        true
    }

    /// Dequeue the oldest item without blocking
    pub fn try_pop(&self) -> Option<T> {
        self.lock().items.pop_front()
    }

    /// Dequeue the oldest item, blocking until one arrives or the queue is
    /// closed.
    ///
    /// Returns `None` only when the queue is closed and fully drained.
    pub fn pop_wait(&self) -> Option<T> {
        let mut inner = self.lock();
        loop {
            if let Some(item) = inner.items.pop_front() {
                return Some(item);
            }
            if inner.closed {
                return None;
            }
            inner = self
                .available
                .wait(inner)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Close the queue: refuse new items and wake every blocked consumer.
    ///
    /// Already-queued items remain drainable via [`try_pop`](Self::try_pop)
    /// and [`pop_wait`](Self::pop_wait).
    pub fn close(&self) {
        self.lock().closed = true;
        self.available.notify_all();
    }

    /// Whether the queue has been closed
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Discard all items and reopen the queue for a fresh session
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.items.clear();
        inner.closed = false;
    }

    /// Number of queued items
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    /// Whether no items are queued
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }
}
