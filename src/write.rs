//! The write pipeline: producer-enqueued [`WriteOperation`]s, drained by the
//! owning worker selector into a per-channel [`WriteContext`].

use std::cell::Cell;
use std::collections::VecDeque;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::channel::ConnectionChannel;
use crate::error::SelectorError;

pub type WriteResult = Result<(), Arc<SelectorError>>;
type Listener = Box<dyn FnOnce(WriteResult) + Send>;

/// One write request: a target channel, the buffers to send, and a
/// completion listener fired exactly once.
pub struct WriteOperation {
    channel: Arc<ConnectionChannel>,
    buffers: Vec<Vec<u8>>,
    cursor: Cell<(usize, usize)>,
    listener: Mutex<Option<Listener>>,
    signalled: AtomicBool,
}

impl WriteOperation {
    pub fn new<F>(channel: Arc<ConnectionChannel>, buffers: Vec<Vec<u8>>, listener: F) -> WriteOperation
    where
        F: FnOnce(WriteResult) + Send + 'static,
    {
        WriteOperation {
            channel,
            buffers,
            cursor: Cell::new((0, 0)),
            listener: Mutex::new(Some(Box::new(listener))),
            signalled: AtomicBool::new(false),
        }
    }

    pub fn channel(&self) -> &Arc<ConnectionChannel> {
        &self.channel
    }

    fn signal(&self, result: WriteResult) {
        if self.signalled.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(listener) = self.listener.lock().unwrap().take() {
            listener(result);
        }
    }

    pub fn fail(&self, err: SelectorError) {
        self.signal(Err(Arc::new(err)));
    }

    /// Writes as much of the remaining buffers as the socket accepts right
    /// now. Returns `true` once every byte has been written and the op has
    /// been signalled success; `false` if the socket would block and more
    /// WRITE readiness is still needed.
    fn drive(&self, sink: &mut dyn Write) -> io::Result<bool> {
        loop {
            let (buf_idx, offset) = self.cursor.get();
            if buf_idx >= self.buffers.len() {
                self.signal(Ok(()));
                return Ok(true);
            }

            let buf = &self.buffers[buf_idx][offset..];
            if buf.is_empty() {
                self.cursor.set((buf_idx + 1, 0));
                continue;
            }

            match sink.write(buf) {
                Ok(0) => {
                    return Err(io::Error::new(io::ErrorKind::WriteZero, "write returned 0"));
                }
                Ok(n) => self.cursor.set((buf_idx, offset + n)),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(e) => return Err(e),
            }
        }
    }
}

/// Selector-thread-only queue of writes pending on one connection channel.
pub struct WriteContext {
    pending: VecDeque<WriteOperation>,
}

impl WriteContext {
    pub fn new() -> WriteContext {
        WriteContext { pending: VecDeque::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn push(&mut self, op: WriteOperation) {
        self.pending.push_back(op);
    }

    /// Drains as much of the front of the queue as the socket will currently
    /// accept. Stops at the first op that would block, leaving it at the
    /// front for the next WRITE readiness event.
    pub fn flush(&mut self, sink: &mut dyn Write) -> io::Result<()> {
        while let Some(op) = self.pending.front() {
            if op.drive(sink)? {
                self.pending.pop_front();
            } else {
                break;
            }
        }
        Ok(())
    }

    /// Fails every still-queued op with the given cause. Used on channel
    /// close.
    pub fn fail_all(self, cause: SelectorError) {
        for op in self.pending {
            op.fail(cause.duplicate());
        }
    }
}

impl Default for WriteContext {
    fn default() -> Self {
        WriteContext::new()
    }
}

#[cfg(test)]
mod test {
    use super::WriteContext;
    use std::io::{self, Write};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingSink {
        accept: usize,
        written: Vec<u8>,
    }

    impl Write for CountingSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.accept == 0 {
                return Err(io::Error::new(io::ErrorKind::WouldBlock, "full"));
            }
            let n = buf.len().min(self.accept);
            self.written.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn noop_channel() -> Arc<crate::channel::ConnectionChannel> {
        let listener = crate::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let stream = crate::net::TcpStream::connect(addr).unwrap();
        Arc::new(crate::channel::ConnectionChannel::new(stream, addr))
    }

    #[test]
    fn flush_stops_at_first_blocking_op_and_resumes() {
        let mut ctx = WriteContext::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let c1 = calls.clone();
        ctx.push(super::WriteOperation::new(noop_channel(), vec![b"ab".to_vec()], move |r| {
            assert!(r.is_ok());
            c1.fetch_add(1, Ordering::SeqCst);
        }));
        let c2 = calls.clone();
        ctx.push(super::WriteOperation::new(noop_channel(), vec![b"cd".to_vec()], move |r| {
            assert!(r.is_ok());
            c2.fetch_add(1, Ordering::SeqCst);
        }));

        let mut sink = CountingSink { accept: 2, written: Vec::new() };
        ctx.flush(&mut sink).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!ctx.is_empty());

        let mut sink = CountingSink { accept: 2, written: Vec::new() };
        ctx.flush(&mut sink).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(ctx.is_empty());
    }

    #[test]
    fn fail_all_signals_every_pending_op_once() {
        let mut ctx = WriteContext::new();
        let failed = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let f = failed.clone();
            ctx.push(super::WriteOperation::new(noop_channel(), vec![b"x".to_vec()], move |r| {
                assert!(r.is_err());
                f.fetch_add(1, Ordering::SeqCst);
            }));
        }

        ctx.fail_all(crate::error::SelectorError::closed_selector("write"));
        assert_eq!(failed.load(Ordering::SeqCst), 3);
    }
}
