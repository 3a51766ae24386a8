//! §4.2: the selector that owns listening sockets and hands accepted
//! connections off to worker selectors.

use std::io;
use std::sync::Arc;

use crate::channel::{Channel, ChannelFactory, ListeningChannel};
use crate::epoll::{EpollOpt, Events, Ready, Token};
use crate::error::SelectorError;
use crate::handler::{AcceptorHandler, SelectorHandler};
use crate::net::TcpListener;
use crate::queue::Fifo;

use super::worker::WorkerSelector;
use super::{Enqueued, SelectorCore};

/// Chooses which worker selector receives the next accepted connection.
pub type WorkerSupplier = Arc<dyn Fn() -> Arc<WorkerSelector> + Send + Sync>;

pub struct AcceptorSelector {
    core: SelectorCore<ListeningChannel>,
    new_listening: Fifo<Arc<ListeningChannel>>,
    handler: Arc<dyn AcceptorHandler>,
    supplier: WorkerSupplier,
}

impl AcceptorSelector {
    pub fn new(handler: Arc<dyn AcceptorHandler>, supplier: WorkerSupplier) -> io::Result<AcceptorSelector> {
        Ok(AcceptorSelector {
            core: SelectorCore::new()?,
            new_listening: Fifo::unbounded(),
            handler,
            supplier,
        })
    }

    /// `registerServerChannel`: safe to call from any thread.
    pub fn register_server_channel(&self, listener: TcpListener, factory: ChannelFactory) -> Result<(), SelectorError> {
        let channel = Arc::new(ListeningChannel::new(listener, factory));
        match self.core.enqueue(&self.new_listening, channel) {
            Enqueued::Accepted { already_closing } => {
                if !already_closing {
                    let _ = self.core.wake();
                }
                Ok(())
            }
            Enqueued::Rejected(_) => Err(SelectorError::closed_selector("register_server_channel")),
        }
    }

    pub fn queue_channel_close(&self, channel: Arc<ListeningChannel>) {
        self.core.queue_channel_close(channel);
    }

    pub fn registered_channels(&self) -> Vec<Arc<ListeningChannel>> {
        self.core.registered_channels()
    }

    pub fn is_closed(&self) -> bool {
        self.core.is_closed()
    }

    pub fn running(&self) -> &crate::future::OneShot<()> {
        self.core.running()
    }

    pub fn run(&self) -> Result<(), SelectorError> {
        self.core.run(
            |core, events, timeout| self.do_select(core, events, timeout),
            |channel| self.close_channel(channel),
            |core| self.cleanup(core),
            |err| self.dispatch_error(err),
        )
    }

    /// §4.1 steps 4-5: routes a `turn` failure to the matching handler hook.
    fn dispatch_error(&self, err: &SelectorError) {
        match err {
            SelectorError::Poll { .. } => self.handler.select_exception(err),
            _ => self.handler.uncaught_exception(err),
        }
    }

    pub fn close(&self, interrupt: bool) {
        self.new_listening.close();
        self.core.close(interrupt);
    }

    fn do_select(
        &self,
        core: &SelectorCore<ListeningChannel>,
        events: &mut Events,
        timeout: std::time::Duration,
    ) -> Result<(), SelectorError> {
        // Step 1: set up newly registered listening channels.
        while let Ok(channel) = self.new_listening.pop() {
            let id = core.insert(channel.clone());
            let token = Token(id);
            if let Err(e) = channel.register(core.epoll(), token, Ready::readable(), EpollOpt::edge()) {
                core.remove(id);
                let err = SelectorError::registration_failed(e);
                log::warn!("listening channel registration failed: {}", err);
                self.handler.accept_exception(&channel, &err);
                continue;
            }
            self.handler.server_channel_registered(&channel);
        }

        // Step 2: poll.
        let n = core.epoll().wait(events, Some(timeout)).map_err(SelectorError::poll)?;

        // Step 3: handle ready keys.
        for i in 0..n {
            let event = events.get(i).expect("index within wait() count");
            if event.token() == super::WAKER_TOKEN {
                let _ = core.waker().reset();
                continue;
            }
            let id = event.token().0;
            let channel = match core.get(id) {
                Some(c) => c,
                None => {
                    log::warn!("cancelled key for listening channel token {:?}", event.token());
                    if let Some(channel) = core.take_recently_removed(id) {
                        self.handler
                            .generic_server_channel_exception(&channel, &SelectorError::cancelled_key("ready key"));
                    }
                    continue;
                }
            };

            if event.readiness().is_readable() {
                self.accept_channel(&channel);
            }
        }

        Ok(())
    }

    /// `acceptChannel`: obtain a connection from the factory and hand it to
    /// a worker.
    fn accept_channel(&self, channel: &Arc<ListeningChannel>) {
        loop {
            match channel.accept() {
                Ok(connection) => {
                    let connection = Arc::new(connection);
                    self.handler.accept_channel(&connection);
                    let worker = (self.supplier)();
                    let _ = worker.register_socket_channel(connection);
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    let err = SelectorError::io("accept", e);
                    log::warn!("accept failed: {}", err);
                    self.handler.accept_exception(channel, &err);
                    break;
                }
            }
        }
    }

    fn close_channel(&self, channel: &Arc<ListeningChannel>) {
        channel.core().mark_closing();
        let _ = self.core.epoll().delete(channel.as_ref());
        channel.core().mark_closed();
    }

    fn cleanup(&self, core: &SelectorCore<ListeningChannel>) {
        while let Ok(channel) = self.new_listening.pop() {
            core.queue_channel_close(channel);
        }
        for channel in core.registered_channels() {
            core.queue_channel_close(channel);
        }
    }
}
