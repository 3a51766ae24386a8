//! The event-loop skeleton shared by [`acceptor`](super::selector::acceptor)
//! and [`worker`](super::selector::worker) selectors: readiness polling,
//! the pending-close drain, and the close-safety handshake.

pub mod acceptor;
pub mod worker;

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};
use std::time::Duration;

use concurrent_queue::PushError;
use slab::Slab;

use crate::channel::{Channel, ChannelId};
use crate::epoll::{Epoll, EpollOpt, Events, Ready, Token};
use crate::error::SelectorError;
use crate::future::OneShot;
use crate::queue::Fifo;
use crate::waker::Waker;

pub use acceptor::AcceptorSelector;
pub use worker::WorkerSelector;

/// The token the cross-thread waker is registered under. Channel tokens are
/// slab indices, which never reach `usize::MAX` in practice.
pub(crate) const WAKER_TOKEN: Token = Token(usize::MAX);

/// The recommended default `doSelect` timeout: not behaviourally
/// significant beyond bounding shutdown latency.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(300);

/// Outcome of the §4.4 close-safety handshake for one enqueue attempt.
pub enum Enqueued<T> {
    /// The value entered the queue. `already_closing` is `true` if the
    /// selector's closed flag was observed set immediately afterward —
    /// the racing cleanup drain will see and settle this value, so the
    /// caller does nothing further besides skip waking a dead selector.
    Accepted { already_closing: bool },
    /// The queue had already been closed, so the value never entered it.
    /// The caller must surface a closed-selector failure itself.
    Rejected(T),
}

/// State and operations shared by both selector kinds: the readiness
/// primitive, the registered-channel table, the pending-close queue, and
/// the run/close lifecycle.
pub struct SelectorCore<C: Channel> {
    epoll: Epoll,
    waker: Waker,
    registered: Mutex<Slab<Arc<C>>>,
    pending_close: Fifo<Arc<C>>,
    closed: AtomicBool,
    owner: Mutex<Option<ThreadId>>,
    run_lock: Mutex<()>,
    running: OneShot<()>,
    /// Channels removed from `registered` during the turn in progress,
    /// kept around just long enough for a stale ready key in the same
    /// batch to still resolve to the channel it named (see
    /// `take_recently_removed`). Cleared at the top of every turn.
    recently_removed: Mutex<Vec<(ChannelId, Arc<C>)>>,
}

impl<C: Channel> SelectorCore<C> {
    pub fn new() -> io::Result<SelectorCore<C>> {
        let epoll = Epoll::new()?;
        let waker = Waker::new()?;
        epoll.add(&waker, WAKER_TOKEN, Ready::readable(), EpollOpt::edge())?;

        Ok(SelectorCore {
            epoll,
            waker,
            registered: Mutex::new(Slab::new()),
            pending_close: Fifo::unbounded(),
            closed: AtomicBool::new(false),
            owner: Mutex::new(None),
            run_lock: Mutex::new(()),
            running: OneShot::new(),
            recently_removed: Mutex::new(Vec::new()),
        })
    }

    pub fn epoll(&self) -> &Epoll {
        &self.epoll
    }

    pub fn waker(&self) -> &Waker {
        &self.waker
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn is_on_selector_thread(&self) -> bool {
        self.owner.lock().unwrap().map_or(false, |id| id == thread::current().id())
    }

    pub fn running(&self) -> &OneShot<()> {
        &self.running
    }

    pub fn registered_channels(&self) -> Vec<Arc<C>> {
        self.registered.lock().unwrap().iter().map(|(_, c)| c.clone()).collect()
    }

    pub fn insert(&self, channel: Arc<C>) -> ChannelId {
        let mut reg = self.registered.lock().unwrap();
        let id = reg.insert(channel.clone());
        channel.core().set_id(id);
        id
    }

    pub fn remove(&self, id: ChannelId) -> Option<Arc<C>> {
        let mut reg = self.registered.lock().unwrap();
        if reg.contains(id) {
            let channel = reg.remove(id);
            self.recently_removed.lock().unwrap().push((id, channel.clone()));
            Some(channel)
        } else {
            None
        }
    }

    pub fn get(&self, id: ChannelId) -> Option<Arc<C>> {
        self.registered.lock().unwrap().get(id).cloned()
    }

    /// Looks up a channel removed earlier in the turn in progress. Used by
    /// a ready-key loop when `get(id)` misses, so a cancelled key can still
    /// be reported against the channel it named instead of being silently
    /// dropped.
    pub fn take_recently_removed(&self, id: ChannelId) -> Option<Arc<C>> {
        let removed = self.recently_removed.lock().unwrap();
        removed.iter().rev().find(|(rid, _)| *rid == id).map(|(_, c)| c.clone())
    }

    /// Enqueues onto `fifo` and applies the close-safety handshake: see
    /// [`Enqueued`].
    pub fn enqueue<T>(&self, fifo: &Fifo<T>, value: T) -> Enqueued<T> {
        match fifo.push(value) {
            Ok(()) => Enqueued::Accepted { already_closing: self.is_closed() },
            Err(PushError::Closed(value)) => Enqueued::Rejected(value),
            Err(PushError::Full(_)) => unreachable!("fifo is unbounded"),
        }
    }

    pub fn wake(&self) -> io::Result<()> {
        self.waker.wake()
    }

    /// `queueChannelClose`: enqueue the channel for the next cleanup drain
    /// and wake the loop. Reentrant calls (from the selector thread itself,
    /// e.g. during its own cleanup) are allowed — the queue only closes
    /// after the loop's own cleanup pass has finished draining it.
    pub fn queue_channel_close(&self, channel: Arc<C>) {
        match self.pending_close.push(channel) {
            Ok(()) => {
                let _ = self.wake();
            }
            Err(PushError::Closed(channel)) => {
                // The selector thread has already run its final drain and
                // closed the queue; nothing left to do but settle the
                // channel directly, matching what that drain would have
                // done for it.
                channel.core().mark_closing();
                channel.core().mark_closed();
            }
            Err(PushError::Full(_)) => unreachable!("fifo is unbounded"),
        }
    }

    /// Step 1 of a loop turn: drain the pending-close queue, invoking
    /// `on_close` for each entry and removing it from the registered set.
    fn drain_pending_close(&self, mut on_close: impl FnMut(&Arc<C>)) {
        while let Ok(channel) = self.pending_close.pop() {
            if let Some(id) = channel.core().id() {
                self.remove(id);
            }
            on_close(&channel);
        }
    }

    /// Runs the shared loop skeleton (§4.1). `turn` performs one
    /// subclass-specific `doSelect` (new-channel/write drains, poll, ready-
    /// key handling); `close_channel` is the channel close hook (§4.5);
    /// `cleanup` runs once after the loop exits; `dispatch_error` delivers a
    /// `turn` failure to the appropriate event hook (`selectException` for a
    /// general I/O error, `uncaughtException` otherwise) before the loop
    /// continues or, for the one fatal case, before it exits.
    pub fn run(
        &self,
        mut turn: impl FnMut(&SelectorCore<C>, &mut Events, Duration) -> Result<(), SelectorError>,
        mut close_channel: impl FnMut(&Arc<C>),
        mut cleanup: impl FnMut(&SelectorCore<C>),
        mut dispatch_error: impl FnMut(&SelectorError),
    ) -> Result<(), SelectorError> {
        {
            let mut owner = self.owner.lock().unwrap();
            if owner.is_some() {
                return Err(SelectorError::Internal("selector already running".into()));
            }
            *owner = Some(thread::current().id());
        }

        let _run_guard = self.run_lock.lock().unwrap();
        self.running.complete(());
        log::debug!("selector thread started");

        let mut events = Events::with_capacity(1024);
        let mut result: Result<(), SelectorError> = Ok(());
        loop {
            self.recently_removed.lock().unwrap().clear();
            self.drain_pending_close(|ch| close_channel(ch));

            // The closed flag is the loop's exit signal; a `ClosedSelector`
            // raised by `turn` while we're *not* marked closed would mean
            // the readiness primitive died on its own, which is a bug, not
            // a normal shutdown — surfaced as an internal error instead of
            // silently exiting.
            if self.is_closed() {
                break;
            }

            match turn(self, &mut events, DEFAULT_TIMEOUT) {
                Ok(()) => {}
                Err(SelectorError::ClosedSelector { .. }) if self.is_closed() => break,
                Err(err @ SelectorError::ClosedSelector { .. }) => {
                    log::error!("readiness primitive closed while selector still marked open");
                    dispatch_error(&err);
                    result = Err(SelectorError::Internal(
                        "readiness primitive closed unexpectedly".into(),
                    ));
                    break;
                }
                Err(err) => {
                    log::error!("unexpected error in selector loop: {}", err);
                    dispatch_error(&err);
                }
            }
        }

        cleanup(self);
        self.drain_pending_close(|ch| close_channel(ch));
        // Only now, after cleanup's own enqueues have been drained through
        // the real close_channel path, do later enqueues get rejected —
        // closing this any earlier would route cleanup's own channels
        // through the queue's "already closed" fallback instead, which
        // settles the channel's state but skips `handle_close`.
        self.pending_close.close();
        log::debug!("selector thread exiting");

        result
    }

    /// `close(interrupt)`: idempotent. Flips the closed flag, then either
    /// wakes the loop (it will notice the closed flag at its next turn
    /// boundary) or, if `interrupt`, also force-closes the readiness
    /// primitive to fail a blocked `wait` outright. Either way blocks the
    /// caller until the loop has exited.
    pub fn close(&self, interrupt: bool) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            let _ = self.wake();
        }
        if interrupt {
            self.epoll.force_close();
        }
        // Acquiring the run-lock blocks until `run`'s guard is dropped,
        // i.e. until the loop has fully exited.
        let _guard = self.run_lock.lock().unwrap();
    }
}
