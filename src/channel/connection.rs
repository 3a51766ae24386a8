use std::io;
use std::net::SocketAddr;
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::{Arc, Mutex};

use crate::channel::{Channel, ChannelCore, ChannelState};
use crate::epoll::{Epoll, EpollOpt, Ready, Source, Token};
use crate::error::SelectorError;
use crate::future::OneShot;
use crate::net::TcpStream;
use crate::write::WriteContext;

/// Per-channel bookkeeping for `handle_read`. The core does not interpret
/// payload bytes; this only exists so read state is torn down alongside the
/// write context on close.
#[derive(Default)]
pub struct ReadContext;

pub type ConnectResult = Result<(), Arc<SelectorError>>;

/// A connected (or connecting) TCP socket owned by a worker selector.
pub struct ConnectionChannel {
    core: ChannelCore,
    stream: TcpStream,
    peer_addr: SocketAddr,
    connect_future: OneShot<ConnectResult>,
    write_context: Mutex<Option<WriteContext>>,
    read_context: Mutex<Option<ReadContext>>,
}

impl ConnectionChannel {
    pub fn new(stream: TcpStream, peer_addr: SocketAddr) -> ConnectionChannel {
        ConnectionChannel {
            core: ChannelCore::new(),
            stream,
            peer_addr,
            connect_future: OneShot::new(),
            write_context: Mutex::new(None),
            read_context: Mutex::new(None),
        }
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn stream(&self) -> &TcpStream {
        &self.stream
    }

    pub fn connect_future(&self) -> &OneShot<ConnectResult> {
        &self.connect_future
    }

    pub fn is_connect_complete(&self) -> bool {
        matches!(self.connect_future.get(), Some(Ok(())))
    }

    /// `isWritable`/`isReadable`: the channel must be registered and its
    /// connect must have already completed successfully.
    pub fn is_writable(&self) -> bool {
        self.core.state() == ChannelState::Registered && self.is_connect_complete()
    }

    pub fn is_readable(&self) -> bool {
        self.is_writable()
    }

    /// Installed by `handleRegistration`, once, when the channel is first
    /// set up on the worker selector thread.
    pub fn install_contexts(&self) {
        *self.write_context.lock().unwrap() = Some(WriteContext::new());
        *self.read_context.lock().unwrap() = Some(ReadContext::default());
    }

    pub fn with_write_context<R>(&self, f: impl FnOnce(&mut WriteContext) -> R) -> Option<R> {
        self.write_context.lock().unwrap().as_mut().map(f)
    }

    /// Drops both contexts, failing any pending writes with `cause` first —
    /// the caller picks `cancelled_key` for a single channel going down on
    /// its own, or `closed_selector` when the whole selector is shutting
    /// down and every channel is closing together.
    pub fn teardown_contexts(&self, cause: SelectorError) {
        if let Some(ctx) = self.write_context.lock().unwrap().take() {
            ctx.fail_all(cause);
        }
        self.read_context.lock().unwrap().take();
    }

    /// Idempotent probe used by `finishConnect`: returns `Ok(())` once the
    /// underlying socket reports no pending error, `Err` if it does.
    pub fn poll_connect_completion(&self) -> io::Result<()> {
        match self.stream.take_error()? {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }
}

impl Channel for ConnectionChannel {
    fn core(&self) -> &ChannelCore {
        &self.core
    }
}

impl Source for ConnectionChannel {
    fn add(&self, epoll: &Epoll, token: Token, interest: Ready, opts: EpollOpt) -> io::Result<()> {
        self.stream.add(epoll, token, interest, opts)
    }

    fn modify(&self, epoll: &Epoll, token: Token, interest: Ready, opts: EpollOpt) -> io::Result<()> {
        self.stream.modify(epoll, token, interest, opts)
    }

    fn delete(&self, epoll: &Epoll) -> io::Result<()> {
        self.stream.delete(epoll)
    }
}

impl AsRawFd for ConnectionChannel {
    fn as_raw_fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }
}
