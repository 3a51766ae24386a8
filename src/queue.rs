//! Cross-thread FIFOs backing the new-channel, write, and pending-close
//! queues of a selector.
//!
//! Unlike a user-space readiness source, these queues do not carry their
//! own waker: a selector owns exactly one [`Waker`](crate::waker::Waker),
//! and producers call it explicitly after a successful push. That keeps the
//! wake-up coordination centralized at the selector rather than duplicated
//! per queue.

pub use concurrent_queue::{ConcurrentQueue, PopError, PushError};

/// An unbounded multi-producer / single-consumer FIFO. The selector thread
/// is the sole consumer; any thread may produce.
pub struct Fifo<T> {
    inner: ConcurrentQueue<T>,
}

impl<T> Fifo<T> {
    pub fn unbounded() -> Fifo<T> {
        Fifo { inner: ConcurrentQueue::unbounded() }
    }

    pub fn push(&self, value: T) -> Result<(), PushError<T>> {
        self.inner.push(value)
    }

    pub fn pop(&self) -> Result<T, PopError> {
        self.inner.pop()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Closes the queue so that later pushes fail; returns the items still
    /// queued at the moment of closing via repeated `pop()`. Used during
    /// cleanup to hand every leftover entry back to the selector.
    pub fn close(&self) -> bool {
        self.inner.close()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

#[cfg(test)]
mod test {
    use super::Fifo;

    #[test]
    fn push_pop_preserves_order() {
        let fifo = Fifo::unbounded();
        fifo.push(1).unwrap();
        fifo.push(2).unwrap();

        assert_eq!(fifo.pop().unwrap(), 1);
        assert_eq!(fifo.pop().unwrap(), 2);
        assert!(fifo.pop().is_err());
    }

    #[test]
    fn closed_queue_rejects_push() {
        let fifo: Fifo<i32> = Fifo::unbounded();
        fifo.close();
        assert!(fifo.push(1).is_err());
    }
}
