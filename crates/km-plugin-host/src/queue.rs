//! A bounded, drop-oldest-on-full queue.
//!
//! `tokio::sync::mpsc` rejects on a full channel rather than evicting, so
//! fan-out dispatch (a pure producer, per §4.5) uses this instead: a
//! shared deque behind a mutex, with a `Notify` to wake the one consuming
//! delivery task.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};

/// The producer half: `enqueue` never blocks and never fails.
#[derive(Clone)]
pub struct QueueSender<T> {
    inner: Arc<Inner<T>>,
}

/// The consumer half: `recv` waits for an item or the queue being closed.
pub struct QueueReceiver<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    capacity: usize,
    items: Mutex<VecDeque<T>>,
    notify: Notify,
    dropped: AtomicU64,
    closed: std::sync::atomic::AtomicBool,
}

/// Create a bounded drop-oldest queue with the given capacity.
pub fn channel<T>(capacity: usize) -> (QueueSender<T>, QueueReceiver<T>) {
    let inner = Arc::new(Inner {
        capacity,
        items: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
        notify: Notify::new(),
        dropped: AtomicU64::new(0),
        closed: std::sync::atomic::AtomicBool::new(false),
    });
    (
        QueueSender {
            inner: inner.clone(),
        },
        QueueReceiver { inner },
    )
}

impl<T: Send + 'static> QueueSender<T> {
    /// Push an item, evicting the oldest queued item if at capacity.
    /// Never blocks.
    pub fn enqueue(&self, item: T) {
        // A synchronous lock attempt suffices: contention is brief (push
        // or pop-front, no awaiting) and this must never suspend the
        // caller's task, which may be a framer pipeline.
        let Ok(mut items) = self.inner.items.try_lock() else {
            // Under contention, spin via blocking_lock is not an option on
            // an async runtime thread; fall back to a lossy drop rather
            // than risk stalling the fan-out path.
            self.inner.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        };

        if items.len() >= self.inner.capacity {
            items.pop_front();
            self.inner.dropped.fetch_add(1, Ordering::Relaxed);
        }
        items.push_back(item);
        drop(items);
        self.inner.notify.notify_one();
    }

    /// How many items have been dropped for capacity overflow so far.
    #[must_use]
    pub fn dropped_count(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    /// Mark the queue closed; the receiver's next `recv` (after draining
    /// remaining items) returns `None`.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Relaxed);
        self.inner.notify.notify_one();
    }
}

impl<T> QueueReceiver<T> {
    /// Wait for the next item, or `None` once closed and drained.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            {
                let mut items = self.inner.items.lock().await;
                if let Some(item) = items.pop_front() {
                    return Some(item);
                }
                if self.inner.closed.load(Ordering::Relaxed) {
                    return None;
                }
            }
            self.inner.notify.notified().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_in_fifo_order() {
        let (tx, mut rx) = channel(4);
        tx.enqueue(1);
        tx.enqueue(2);
        tx.enqueue(3);
        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(rx.recv().await, Some(2));
        assert_eq!(rx.recv().await, Some(3));
    }

    #[tokio::test]
    async fn drops_oldest_when_full() {
        let (tx, mut rx) = channel(2);
        tx.enqueue(1);
        tx.enqueue(2);
        tx.enqueue(3); // evicts 1
        assert_eq!(tx.dropped_count(), 1);
        assert_eq!(rx.recv().await, Some(2));
        assert_eq!(rx.recv().await, Some(3));
    }

    #[tokio::test]
    async fn closed_and_drained_yields_none() {
        let (tx, mut rx) = channel::<i32>(2);
        tx.enqueue(1);
        tx.close();
        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(rx.recv().await, None);
    }
}
