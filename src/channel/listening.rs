use std::io;
use std::net::SocketAddr;
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::Arc;

use crate::channel::{Channel, ChannelCore, ConnectionChannel};
use crate::epoll::{Epoll, EpollOpt, Ready, Source, Token};
use crate::net::TcpStream;

/// Produces a connection channel from a freshly accepted socket. Injected
/// by the collaborator that owns the transport above this crate.
pub type ChannelFactory =
    Arc<dyn Fn(TcpStream, SocketAddr) -> ConnectionChannel + Send + Sync>;

/// A listening socket registered with an acceptor selector. Holds the
/// factory that turns each accepted OS socket into a [`ConnectionChannel`].
pub struct ListeningChannel {
    core: ChannelCore,
    listener: crate::net::TcpListener,
    factory: ChannelFactory,
}

impl ListeningChannel {
    pub fn new(listener: crate::net::TcpListener, factory: ChannelFactory) -> ListeningChannel {
        ListeningChannel { core: ChannelCore::new(), listener, factory }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts one pending connection and hands it to the factory. Called
    /// only from the owning acceptor selector thread.
    pub fn accept(&self) -> io::Result<ConnectionChannel> {
        let (stream, addr) = self.listener.accept()?;
        Ok((self.factory)(stream, addr))
    }
}

impl Channel for ListeningChannel {
    fn core(&self) -> &ChannelCore {
        &self.core
    }
}

impl Source for ListeningChannel {
    fn add(&self, epoll: &Epoll, token: Token, interest: Ready, opts: EpollOpt) -> io::Result<()> {
        self.listener.add(epoll, token, interest, opts)
    }

    fn modify(&self, epoll: &Epoll, token: Token, interest: Ready, opts: EpollOpt) -> io::Result<()> {
        self.listener.modify(epoll, token, interest, opts)
    }

    fn delete(&self, epoll: &Epoll) -> io::Result<()> {
        self.listener.delete(epoll)
    }
}

impl AsRawFd for ListeningChannel {
    fn as_raw_fd(&self) -> RawFd {
        self.listener.as_raw_fd()
    }
}
