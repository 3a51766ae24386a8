//! §4.3: the selector that owns connection sockets, drives CONNECT/READ/
//! WRITE readiness, and drains the write queue.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use crate::channel::{Channel, ConnectionChannel};
use crate::epoll::{EpollOpt, Events, Ready, Token};
use crate::error::SelectorError;
use crate::handler::{SelectorHandler, WorkerHandler};
use crate::queue::Fifo;
use crate::write::WriteOperation;

use super::{Enqueued, SelectorCore};

pub struct WorkerSelector {
    core: SelectorCore<ConnectionChannel>,
    new_channel: Fifo<Arc<ConnectionChannel>>,
    write: Fifo<WriteOperation>,
    handler: Arc<dyn WorkerHandler>,
}

impl WorkerSelector {
    pub fn new(handler: Arc<dyn WorkerHandler>) -> io::Result<WorkerSelector> {
        Ok(WorkerSelector {
            core: SelectorCore::new()?,
            new_channel: Fifo::unbounded(),
            write: Fifo::unbounded(),
            handler,
        })
    }

    /// `registerSocketChannel`: safe to call from any thread, including the
    /// acceptor that just accepted this connection.
    pub fn register_socket_channel(&self, channel: Arc<ConnectionChannel>) -> Result<(), SelectorError> {
        match self.core.enqueue(&self.new_channel, channel) {
            Enqueued::Accepted { already_closing } => {
                if !already_closing {
                    let _ = self.core.wake();
                }
                Ok(())
            }
            Enqueued::Rejected(_) => Err(SelectorError::closed_selector("register_socket_channel")),
        }
    }

    /// §4.3.2: queue a write from any thread.
    pub fn queue_write(&self, op: WriteOperation) {
        match self.core.enqueue(&self.write, op) {
            Enqueued::Accepted { already_closing } => {
                if !already_closing {
                    let _ = self.core.wake();
                }
                // If already_closing, cleanup (running concurrently or
                // about to run) will fail this op with a closed-selector
                // cause when it drains the write FIFO.
            }
            Enqueued::Rejected(op) => op.fail(SelectorError::closed_selector("queue_write")),
        }
    }

    pub fn queue_channel_close(&self, channel: Arc<ConnectionChannel>) {
        self.core.queue_channel_close(channel);
    }

    pub fn registered_channels(&self) -> Vec<Arc<ConnectionChannel>> {
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
        self.new_channel.close();
        self.write.close();
        self.core.close(interrupt);
    }

    fn do_select(
        &self,
        core: &SelectorCore<ConnectionChannel>,
        events: &mut Events,
        timeout: Duration,
    ) -> Result<(), SelectorError> {
        // Step 1: set up new channels. Both channels freshly accepted
        // (already connected) and channels mid-`connect()` register for
        // both interests: Linux signals connect completion as WRITE
        // readiness on the socket, which is indistinguishable at the
        // epoll layer from "ready to send" — `finish_connect` is what
        // tells them apart via `take_error`.
        while let Ok(channel) = self.new_channel.pop() {
            let id = core.insert(channel.clone());
            let token = Token(id);
            match channel.register(core.epoll(), token, Ready::readable() | Ready::writable(), EpollOpt::edge()) {
                Ok(()) => {
                    channel.install_contexts();
                    self.handler.handle_registration(&channel);
                    self.finish_connect(&channel);
                }
                Err(e) => {
                    core.remove(id);
                    let err = SelectorError::registration_failed(e);
                    log::warn!("connection channel registration failed: {}", err);
                    self.handler.registration_exception(&channel, &err);
                }
            }
        }

        // Step 2: drain queued writes.
        while let Ok(op) = self.write.pop() {
            let channel = op.channel().clone();
            if channel.is_writable() {
                self.queue_write_into_buffer(core, &channel, op);
            } else {
                op.fail(SelectorError::cancelled_key("queue_write"));
            }
        }

        // Step 3: poll.
        let n = core.epoll().wait(events, Some(timeout)).map_err(SelectorError::poll)?;

        // Step 4: handle ready keys.
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
                    log::warn!("cancelled key for connection channel token {:?}", event.token());
                    if let Some(channel) = core.take_recently_removed(id) {
                        self.handler
                            .generic_channel_exception(&channel, &SelectorError::cancelled_key("ready key"));
                    }
                    continue;
                }
            };

            self.dispatch_ready(core, &channel, event.readiness());
        }

        Ok(())
    }

    /// Dispatches a single ready key once its channel has been looked up.
    /// Split out of `do_select` so the connect-completion gate — read/write
    /// readiness arriving before the connect finishes must be ignored — is
    /// directly testable without needing real epoll timing.
    fn dispatch_ready(&self, core: &SelectorCore<ConnectionChannel>, channel: &Arc<ConnectionChannel>, readiness: Ready) {
        // Linux signals a completed non-blocking connect via writable
        // readiness on the connecting socket.
        if !channel.is_connect_complete() && readiness.is_writable() {
            self.finish_connect(channel);
        }

        if !channel.is_connect_complete() {
            return;
        }

        if readiness.is_writable() {
            self.handle_write(core, channel);
        }
        if readiness.is_readable() {
            self.handler.handle_read(channel);
        }
    }

    /// §4.3.1: move a write op into the channel's buffer. Must run on the
    /// selector thread (called only from `do_select`).
    fn queue_write_into_buffer(
        &self,
        core: &SelectorCore<ConnectionChannel>,
        channel: &Arc<ConnectionChannel>,
        op: WriteOperation,
    ) {
        debug_assert!(core.is_on_selector_thread());

        if let Err(e) = channel.rearm(core.epoll(), Ready::readable() | Ready::writable(), EpollOpt::edge()) {
            op.fail(SelectorError::cancelled_key("queue_write"));
            let _ = e;
            return;
        }

        channel.with_write_context(|ctx| ctx.push(op));
    }

    /// §4.3.3: idempotent probe for non-blocking connect completion.
    fn finish_connect(&self, channel: &Arc<ConnectionChannel>) {
        if channel.connect_future().is_settled() {
            return;
        }

        match channel.poll_connect_completion() {
            Ok(()) => {
                if channel.connect_future().complete(Ok(())) {
                    self.handler.handle_connect(channel);
                }
            }
            Err(e) => {
                let err = Arc::new(SelectorError::io("connect", e));
                if channel.connect_future().complete(Err(err.clone())) {
                    log::warn!("connect failed: {}", err);
                    self.handler.connect_exception(channel, &err);
                }
            }
        }
    }

    fn handle_write(&self, core: &SelectorCore<ConnectionChannel>, channel: &Arc<ConnectionChannel>) {
        let flushed = channel.with_write_context(|ctx| {
            let stream = channel.stream();
            let mut sink = stream;
            ctx.flush(&mut sink)
        });

        match flushed {
            Some(Ok(())) => {
                self.handler.handle_write(channel);
                let empty = channel.with_write_context(|ctx| ctx.is_empty()).unwrap_or(true);
                if empty {
                    let _ = channel.rearm(core.epoll(), Ready::readable(), EpollOpt::edge());
                }
            }
            Some(Err(e)) => {
                let err = SelectorError::io("handle_write", e);
                log::warn!("write failed: {}", err);
                self.handler.write_exception(channel, &err);
                core.queue_channel_close(channel.clone());
            }
            None => {}
        }
    }

    fn close_channel(&self, channel: &Arc<ConnectionChannel>) {
        channel.core().mark_closing();
        // Distinguishes a lone channel being closed mid-run (its own
        // operation failed) from every channel going down together because
        // the whole selector is shutting down — the two need different
        // failure causes on any writes still queued.
        let cause = if self.core.is_closed() {
            SelectorError::closed_selector("write")
        } else {
            SelectorError::cancelled_key("write")
        };
        channel.teardown_contexts(cause);
        let _ = self.core.epoll().delete(channel.as_ref());
        channel.core().mark_closed();
        self.handler.handle_close(channel);
    }

    /// §4.3 cleanup: fail every still-queued write, then close every new and
    /// registered channel.
    fn cleanup(&self, core: &SelectorCore<ConnectionChannel>) {
        while let Ok(op) = self.write.pop() {
            op.fail(SelectorError::closed_selector("queue_write"));
        }

        while let Ok(channel) = self.new_channel.pop() {
            core.queue_channel_close(channel);
        }

        for channel in core.registered_channels() {
            core.queue_channel_close(channel);
        }
    }
}

#[cfg(test)]
mod test {
    use std::net::TcpListener as StdTcpListener;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use crate::channel::ConnectionChannel;
    use crate::epoll::Ready;
    use crate::handler::{SelectorHandler, WorkerHandler};
    use crate::net::TcpStream;

    use super::WorkerSelector;

    #[derive(Default)]
    struct RecordingHandler {
        reads: AtomicUsize,
        writes: AtomicUsize,
    }

    impl SelectorHandler for RecordingHandler {}

    impl WorkerHandler for RecordingHandler {
        fn handle_read(&self, _channel: &Arc<ConnectionChannel>) {
            self.reads.fetch_add(1, Ordering::SeqCst);
        }

        fn handle_write(&self, _channel: &Arc<ConnectionChannel>) {
            self.writes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn connected_pair() -> (ConnectionChannel, std::net::TcpStream) {
        let listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (ConnectionChannel::new(client, addr), server)
    }

    #[test]
    fn dispatch_ready_ignores_read_and_write_before_connect_completes() {
        let handler = Arc::new(RecordingHandler::default());
        let selector = WorkerSelector::new(handler.clone()).unwrap();
        let (channel, _server) = connected_pair();
        let channel = Arc::new(channel);

        // `connect_future` was never settled, so the channel is treated as
        // still connecting even though the underlying socket is usable.
        // Readable-only readiness doesn't trigger the connect-completion
        // probe (that only fires on writable readiness), so this exercises
        // the gate in isolation.
        assert!(!channel.is_connect_complete());

        selector.dispatch_ready(&selector.core, &channel, Ready::readable());

        assert_eq!(handler.reads.load(Ordering::SeqCst), 0);
        assert_eq!(handler.writes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn dispatch_ready_delivers_read_once_connect_has_completed() {
        let handler = Arc::new(RecordingHandler::default());
        let selector = WorkerSelector::new(handler.clone()).unwrap();
        let (channel, _server) = connected_pair();
        let channel = Arc::new(channel);

        assert!(channel.connect_future().complete(Ok(())));
        assert!(channel.is_connect_complete());

        selector.dispatch_ready(&selector.core, &channel, Ready::readable());

        assert_eq!(handler.reads.load(Ordering::SeqCst), 1);
        assert_eq!(handler.writes.load(Ordering::SeqCst), 0);
    }
}
