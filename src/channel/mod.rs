//! The channel lifecycle state machine shared by listening and connection
//! channels: UNREGISTERED → REGISTERED → CLOSING → CLOSED.

mod connection;
mod listening;

pub use connection::{ConnectResult, ConnectionChannel};
pub use listening::{ChannelFactory, ListeningChannel};

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use crate::epoll::{Epoll, EpollOpt, Ready, Source, Token};
use crate::future::OneShot;

/// Identifies a channel within the slab of a single selector. Not unique
/// across selectors.
pub type ChannelId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChannelState {
    Unregistered = 0,
    Registered = 1,
    Closing = 2,
    Closed = 3,
}

impl ChannelState {
    fn from_u8(v: u8) -> ChannelState {
        match v {
            0 => ChannelState::Unregistered,
            1 => ChannelState::Registered,
            2 => ChannelState::Closing,
            3 => ChannelState::Closed,
            _ => unreachable!("invalid channel state byte"),
        }
    }
}

/// Monotonically non-decreasing state plus a registration token, shared by
/// both channel variants. Holds no reference back to the selector itself —
/// per the identifier-indexed design, the channel is looked up by id rather
/// than owning a strong reference to what owns it.
#[derive(Debug)]
pub struct ChannelCore {
    id: AtomicUsize,
    state: AtomicU8,
    // Token(usize) + 1, with 0 meaning "no token yet".
    token: AtomicUsize,
    close_future: OneShot<()>,
}

const NO_ID: usize = usize::MAX;

impl ChannelCore {
    pub fn new() -> ChannelCore {
        ChannelCore {
            id: AtomicUsize::new(NO_ID),
            state: AtomicU8::new(ChannelState::Unregistered as u8),
            token: AtomicUsize::new(0),
            close_future: OneShot::new(),
        }
    }

    pub fn id(&self) -> Option<ChannelId> {
        match self.id.load(Ordering::Acquire) {
            NO_ID => None,
            id => Some(id),
        }
    }

    /// Set once, when the channel is inserted into its selector's table.
    pub fn set_id(&self, id: ChannelId) {
        self.id.store(id, Ordering::Release);
    }

    pub fn state(&self) -> ChannelState {
        ChannelState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn token(&self) -> Option<Token> {
        match self.token.load(Ordering::Acquire) {
            0 => None,
            raw => Some(Token(raw - 1)),
        }
    }

    pub fn set_token(&self, token: Token) {
        self.token.store(token.0 + 1, Ordering::Release);
        self.state.store(ChannelState::Registered as u8, Ordering::Release);
    }

    pub fn mark_closing(&self) {
        // Never regress CLOSED -> CLOSING; state is monotone.
        let _ = self.state.compare_exchange(
            ChannelState::Registered as u8,
            ChannelState::Closing as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        let _ = self.state.compare_exchange(
            ChannelState::Unregistered as u8,
            ChannelState::Closing as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Fires the close-future and advances to CLOSED. Idempotent: only the
    /// first caller observes `true`.
    pub fn mark_closed(&self) -> bool {
        self.state.store(ChannelState::Closed as u8, Ordering::Release);
        self.token.store(0, Ordering::Release);
        self.close_future.complete(())
    }

    pub fn on_closed<F>(&self, listener: F)
    where
        F: FnOnce(&()) + Send + 'static,
    {
        self.close_future.on_complete(listener)
    }

    pub fn is_writable(&self) -> bool {
        self.state() == ChannelState::Registered
    }
}

impl Default for ChannelCore {
    fn default() -> Self {
        ChannelCore::new()
    }
}

/// Common operations the selector loop needs on any registered channel,
/// independent of whether it is a listening or connection channel.
pub trait Channel: Source {
    fn core(&self) -> &ChannelCore;

    fn id(&self) -> Option<ChannelId> {
        self.core().id()
    }

    fn state(&self) -> ChannelState {
        self.core().state()
    }

    fn token(&self) -> Option<Token> {
        self.core().token()
    }

    /// Registers with the readiness primitive and records the resulting
    /// token. Called only from the owning selector thread.
    fn register(
        &self,
        epoll: &Epoll,
        token: Token,
        interest: Ready,
        opts: EpollOpt,
    ) -> std::io::Result<()> {
        Source::add(self, epoll, token, interest, opts)?;
        self.core().set_token(token);
        Ok(())
    }

    fn rearm(&self, epoll: &Epoll, interest: Ready, opts: EpollOpt) -> std::io::Result<()> {
        let token = self.core().token().expect("rearm on unregistered channel");
        Source::modify(self, epoll, token, interest, opts)
    }
}
