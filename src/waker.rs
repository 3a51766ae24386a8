//! Cross-thread wake-up for a blocked [`Epoll::wait`](crate::epoll::Epoll::wait).
//!
//! A selector registers one `Waker` at a reserved token before entering its
//! loop. Producer threads call [`Waker::wake`] after enqueueing work so the
//! selector's next `wait` returns immediately instead of sitting out its
//! full timeout.

use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::Arc;

use crate::epoll::{Epoll, EpollOpt, Ready, Source, Token};
use crate::sys::EventFd;

#[derive(Debug, Clone)]
pub struct Waker {
    inner: Arc<EventFd>,
}

impl Waker {
    pub fn new() -> io::Result<Waker> {
        Ok(Waker { inner: Arc::new(EventFd::new()?) })
    }

    /// Interrupts a blocked `wait`. Safe to call from any thread, including
    /// repeatedly — the underlying counter coalesces concurrent wakes into a
    /// single readable event.
    pub fn wake(&self) -> io::Result<()> {
        match self.inner.write(1) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Resets the counter to zero after the selector has observed the wake.
    pub fn reset(&self) -> io::Result<()> {
        match self.inner.read() {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl AsRawFd for Waker {
    fn as_raw_fd(&self) -> RawFd {
        self.inner.as_raw_fd()
    }
}

impl Source for Waker {
    fn add(&self, epoll: &Epoll, token: Token, interest: Ready, opts: EpollOpt) -> io::Result<()> {
        self.inner.add(epoll, token, interest, opts)
    }

    fn modify(&self, epoll: &Epoll, token: Token, interest: Ready, opts: EpollOpt) -> io::Result<()> {
        self.inner.modify(epoll, token, interest, opts)
    }

    fn delete(&self, epoll: &Epoll) -> io::Result<()> {
        self.inner.delete(epoll)
    }
}

#[cfg(test)]
mod test {
    use super::Waker;
    use crate::epoll::{Epoll, EpollOpt, Events, Ready, Token};
    use std::time::Duration;

    #[test]
    fn wake_unblocks_wait() {
        let epoll = Epoll::new().unwrap();
        let mut events = Events::with_capacity(8);
        let waker = Waker::new().unwrap();

        epoll.add(&waker, Token(0), Ready::readable(), EpollOpt::edge()).unwrap();

        waker.wake().unwrap();

        let n = epoll.wait(&mut events, Some(Duration::from_secs(2))).unwrap();
        assert_eq!(n, 1);
        assert_eq!(events.get(0).unwrap().token(), Token(0));

        waker.reset().unwrap();
    }
}
