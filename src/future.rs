//! A one-shot completion primitive: settled atomically at most once, with
//! listeners fired exactly once, either synchronously at registration time
//! (if already settled) or by whichever thread settles it.
//!
//! Backs the connect-future, close-future, and running-future described in
//! the data model: small, synchronous completions, not an async
//! `std::future::Future` — nothing here is polled by an executor.

use std::fmt;
use std::sync::{Condvar, Mutex};

enum Slot<T> {
    Pending(Vec<Box<dyn FnOnce(&T) + Send>>),
    Ready(T),
}

struct Inner<T> {
    slot: Mutex<Slot<T>>,
    condvar: Condvar,
}

/// A value that starts pending and is settled exactly once.
pub struct OneShot<T> {
    inner: std::sync::Arc<Inner<T>>,
}

impl<T> Clone for OneShot<T> {
    fn clone(&self) -> Self {
        OneShot { inner: self.inner.clone() }
    }
}

impl<T> fmt::Debug for OneShot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let settled = matches!(*self.inner.slot.lock().unwrap(), Slot::Ready(_));
        f.debug_struct("OneShot").field("settled", &settled).finish()
    }
}

impl<T: Clone> OneShot<T> {
    pub fn new() -> OneShot<T> {
        OneShot {
            inner: std::sync::Arc::new(Inner {
                slot: Mutex::new(Slot::Pending(Vec::new())),
                condvar: Condvar::new(),
            }),
        }
    }

    /// Settles the value. Returns `true` if this call won the race and
    /// actually settled it; `false` if it was already settled (terminal
    /// states are sticky, so the supplied value is dropped unused).
    pub fn complete(&self, value: T) -> bool {
        let listeners = {
            let mut slot = self.inner.slot.lock().unwrap();
            match &*slot {
                Slot::Ready(_) => return false,
                Slot::Pending(_) => {
                    let old = std::mem::replace(&mut *slot, Slot::Ready(value.clone()));
                    match old {
                        Slot::Pending(listeners) => listeners,
                        Slot::Ready(_) => unreachable!(),
                    }
                }
            }
        };
        self.inner.condvar.notify_all();
        for listener in listeners {
            listener(&value);
        }
        true
    }

    /// Returns the settled value without blocking, or `None` if still
    /// pending.
    pub fn get(&self) -> Option<T> {
        match &*self.inner.slot.lock().unwrap() {
            Slot::Ready(value) => Some(value.clone()),
            Slot::Pending(_) => None,
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(&*self.inner.slot.lock().unwrap(), Slot::Ready(_))
    }

    /// Blocks the calling thread until settled. Used by `close()` to wait
    /// for the run-lock's loop-exit signal and by tests driving the
    /// running-future.
    pub fn wait(&self) -> T {
        let mut slot = self.inner.slot.lock().unwrap();
        loop {
            match &*slot {
                Slot::Ready(value) => return value.clone(),
                Slot::Pending(_) => slot = self.inner.condvar.wait(slot).unwrap(),
            }
        }
    }

    /// Registers a listener, firing it immediately (on the calling thread)
    /// if already settled, or queuing it to fire on whichever thread calls
    /// [`complete`] otherwise. Fires at most once either way.
    pub fn on_complete<F>(&self, listener: F)
    where
        F: FnOnce(&T) + Send + 'static,
    {
        let mut slot = self.inner.slot.lock().unwrap();
        match &mut *slot {
            Slot::Ready(value) => {
                let value = value.clone();
                drop(slot);
                listener(&value);
            }
            Slot::Pending(listeners) => listeners.push(Box::new(listener)),
        }
    }
}

impl<T: Clone> Default for OneShot<T> {
    fn default() -> Self {
        OneShot::new()
    }
}

#[cfg(test)]
mod test {
    use super::OneShot;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn fires_listener_registered_before_completion() {
        let fut: OneShot<i32> = OneShot::new();
        let seen = Arc::new(AtomicBool::new(false));
        let seen2 = seen.clone();

        fut.on_complete(move |v| {
            assert_eq!(*v, 7);
            seen2.store(true, Ordering::SeqCst);
        });

        assert!(fut.complete(7));
        assert!(seen.load(Ordering::SeqCst));
    }

    #[test]
    fn fires_listener_registered_after_completion() {
        let fut: OneShot<i32> = OneShot::new();
        assert!(fut.complete(9));

        let seen = Arc::new(AtomicBool::new(false));
        let seen2 = seen.clone();
        fut.on_complete(move |v| {
            assert_eq!(*v, 9);
            seen2.store(true, Ordering::SeqCst);
        });

        assert!(seen.load(Ordering::SeqCst));
    }

    #[test]
    fn second_complete_is_ignored() {
        let fut = OneShot::new();
        assert!(fut.complete(1));
        assert!(!fut.complete(2));
        assert_eq!(fut.get(), Some(1));
    }

    #[test]
    fn wait_blocks_until_settled() {
        let fut: OneShot<i32> = OneShot::new();
        let waiter = fut.clone();
        let handle = std::thread::spawn(move || waiter.wait());

        std::thread::sleep(std::time::Duration::from_millis(20));
        fut.complete(42);

        assert_eq!(handle.join().unwrap(), 42);
    }
}
