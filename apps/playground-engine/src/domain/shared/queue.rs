//! Bounded multi-producer, single-consumer event queue.
//!
//! Enqueue never blocks: a full queue returns [`QueueError::Full`]. Dequeue
//! never blocks either and returns `None` when the queue is empty.

use std::fmt;

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};

/// Errors raised when enqueueing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    /// The queue is at capacity.
    #[error("{name} queue is full (capacity {capacity})")]
    Full {
        /// Queue name.
        name: &'static str,
        /// Configured capacity.
        capacity: usize,
    },
    /// The consumer side was dropped.
    #[error("{name} queue is closed")]
    Closed {
        /// Queue name.
        name: &'static str,
    },
}

/// A named FIFO backed by a bounded tokio channel.
pub struct EventQueue<T> {
    name: &'static str,
    capacity: usize,
    tx: mpsc::Sender<T>,
    rx: Mutex<mpsc::Receiver<T>>,
}

impl<T> EventQueue<T> {
    /// Create a queue holding at most `capacity` items (minimum 1).
    #[must_use]
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            name,
            capacity,
            tx,
            rx: Mutex::new(rx),
        }
    }

    /// Push an item at the back of the queue.
    pub fn enqueue(&self, item: T) -> Result<(), QueueError> {
        self.tx.try_send(item).map_err(|e| match e {
            TrySendError::Full(_) => QueueError::Full {
                name: self.name,
                capacity: self.capacity,
            },
            TrySendError::Closed(_) => QueueError::Closed { name: self.name },
        })
    }

    /// Pop the front item, if any.
    pub fn dequeue(&self) -> Option<T> {
        match self.rx.lock().try_recv() {
            Ok(item) => Some(item),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Pop every queued item in FIFO order.
    pub fn drain(&self) -> Vec<T> {
        let mut rx = self.rx.lock();
        let mut items = Vec::new();
        while let Ok(item) = rx.try_recv() {
            items.push(item);
        }
        items
    }

    /// Number of queued items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.capacity - self.tx.capacity()
    }

    /// Returns true if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of queued items.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Queue name used in errors and logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> fmt::Debug for EventQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventQueue")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order_is_preserved() {
        let queue = EventQueue::new("test", 4);
        queue.enqueue(1).unwrap();
        queue.enqueue(2).unwrap();
        queue.enqueue(3).unwrap();

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.dequeue(), Some(1));
        assert_eq!(queue.drain(), vec![2, 3]);
        assert!(queue.is_empty());
    }

    #[test]
    fn dequeue_on_empty_returns_none() {
        let queue: EventQueue<u8> = EventQueue::new("empty", 1);
        assert_eq!(queue.dequeue(), None);
    }

    #[test]
    fn enqueue_past_capacity_fails() {
        let queue = EventQueue::new("small", 1);
        queue.enqueue("a").unwrap();

        let err = queue.enqueue("b").unwrap_err();
        assert_eq!(
            err,
            QueueError::Full {
                name: "small",
                capacity: 1
            }
        );

        assert_eq!(queue.dequeue(), Some("a"));
        queue.enqueue("c").unwrap();
    }
}
