//! The readiness primitive: a thin, direct wrapper around Linux `epoll`.
//!
//! Everything above this module — selectors, channels, write queues — treats
//! [`Epoll`] as the "OS-level multiplexed readiness facility" and knows
//! nothing about `epoll_ctl`/`epoll_wait` directly.

use std::fmt;
use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::sys;

pub use event::{Event, Events, IntoIter, Iter};
pub use opt::EpollOpt;
pub use ready::Ready;
pub use source::Source;
pub use token::Token;

mod event;
mod opt;
mod ready;
mod source;
mod token;

/// A registered set of readiness-interested file descriptors.
///
/// `Epoll` is `Send + Sync`: one selector thread owns it and calls [`wait`],
/// while producer threads call [`add`]/[`modify`]/[`delete`] (through a
/// [`Source`] such as the cross-thread [`Waker`](crate::waker::Waker)) or
/// trigger a wake-up from elsewhere.
///
/// [`wait`]: Epoll::wait
/// [`add`]: Epoll::add
/// [`modify`]: Epoll::modify
/// [`delete`]: Epoll::delete
pub struct Epoll(pub(crate) sys::Epoll);

impl Epoll {
    pub fn new() -> io::Result<Epoll> {
        is_send::<Epoll>();
        is_sync::<Epoll>();

        Ok(Epoll(sys::Epoll::new()?))
    }

    pub fn wait(&self, events: &mut Events, timeout: Option<Duration>) -> io::Result<usize> {
        self.0.wait(&mut events.inner, timeout)?;
        Ok(events.len())
    }

    pub fn add<S>(&self, source: &S, token: Token, interest: Ready, opts: EpollOpt) -> io::Result<()>
    where
        S: Source + ?Sized,
    {
        validate_args(token, interest)?;

        source.add(self, token, interest, opts)?;
        log::trace!("registered {:?} with token {:?}", interest, token);

        Ok(())
    }

    pub fn modify<S>(&self, source: &S, token: Token, interest: Ready, opts: EpollOpt) -> io::Result<()>
    where
        S: Source + ?Sized,
    {
        validate_args(token, interest)?;

        source.modify(self, token, interest, opts)?;
        log::trace!("modified interest for token {:?} to {:?}", token, interest);

        Ok(())
    }

    pub fn delete<S>(&self, source: &S) -> io::Result<()>
    where
        S: Source + ?Sized,
    {
        source.delete(self)?;
        log::trace!("deregistered source from poller");

        Ok(())
    }

    /// Closes the underlying fd immediately so any thread currently blocked
    /// in [`wait`](Epoll::wait) on it fails with an I/O error.
    pub fn force_close(&self) {
        self.0.force_close()
    }
}

impl AsRawFd for Epoll {
    fn as_raw_fd(&self) -> RawFd {
        self.0.as_raw_fd()
    }
}

impl fmt::Debug for Epoll {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "Epoll")
    }
}

fn validate_args(_token: Token, interest: Ready) -> io::Result<()> {
    if !interest.is_readable() && !interest.is_writable() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "interest must include readable or writable",
        ));
    }

    Ok(())
}

fn is_send<T: Send>() {}
fn is_sync<T: Sync>() {}

/// Guards a socket against being registered with more than one `Epoll` at a
/// time (the "a channel appears in at most one selector's registered set"
/// invariant, enforced at the readiness-primitive boundary rather than only
/// at the channel layer).
#[derive(Debug, Default)]
pub struct SelectorId {
    id: AtomicUsize,
}

impl SelectorId {
    pub fn new() -> SelectorId {
        SelectorId { id: AtomicUsize::new(0) }
    }

    pub fn associate_selector(&self, epoll: &Epoll) -> io::Result<()> {
        let selector_id = self.id.load(Ordering::SeqCst);

        if selector_id != 0 && selector_id != epoll.0.id() {
            Err(io::Error::new(
                io::ErrorKind::Other,
                "socket already registered with a different selector",
            ))
        } else {
            self.id.store(epoll.0.id(), Ordering::SeqCst);
            Ok(())
        }
    }
}

impl Clone for SelectorId {
    fn clone(&self) -> SelectorId {
        SelectorId {
            id: AtomicUsize::new(self.id.load(Ordering::SeqCst)),
        }
    }
}
