//! Shared test harness: an event-recording handler and small assertion
//! helpers, used across the integration tests in this directory.
#![allow(dead_code)]

use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Once};
use std::time::Duration;

use switchyard::channel::ConnectionChannel;
use switchyard::error::SelectorError;
use switchyard::handler::{SelectorHandler, WorkerHandler};

static INIT: Once = Once::new();

/// Initializes logging once per test binary. Safe to call from every test.
pub fn init() {
    INIT.call_once(|| {
        let _ = env_logger::try_init();
    });
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Event {
    Registration,
    RegistrationException,
    Connect,
    ConnectException,
    Read,
    Write,
    WriteException,
    Close,
}

/// A `WorkerHandler` that reports every hook invocation over a channel, so
/// tests can block on the exact event they expect instead of polling state.
pub struct RecordingHandler {
    tx: Sender<Event>,
}

impl RecordingHandler {
    pub fn new() -> (Arc<RecordingHandler>, Receiver<Event>) {
        let (tx, rx) = channel();
        (Arc::new(RecordingHandler { tx }), rx)
    }
}

impl SelectorHandler for RecordingHandler {}

impl WorkerHandler for RecordingHandler {
    fn handle_registration(&self, _channel: &Arc<ConnectionChannel>) {
        let _ = self.tx.send(Event::Registration);
    }

    fn registration_exception(&self, _channel: &Arc<ConnectionChannel>, _err: &SelectorError) {
        let _ = self.tx.send(Event::RegistrationException);
    }

    fn handle_connect(&self, _channel: &Arc<ConnectionChannel>) {
        let _ = self.tx.send(Event::Connect);
    }

    fn connect_exception(&self, _channel: &Arc<ConnectionChannel>, _err: &SelectorError) {
        let _ = self.tx.send(Event::ConnectException);
    }

    fn handle_read(&self, _channel: &Arc<ConnectionChannel>) {
        let _ = self.tx.send(Event::Read);
    }

    fn handle_write(&self, _channel: &Arc<ConnectionChannel>) {
        let _ = self.tx.send(Event::Write);
    }

    fn write_exception(&self, _channel: &Arc<ConnectionChannel>, _err: &SelectorError) {
        let _ = self.tx.send(Event::WriteException);
    }

    fn handle_close(&self, _channel: &Arc<ConnectionChannel>) {
        let _ = self.tx.send(Event::Close);
    }
}

const WAIT: Duration = Duration::from_secs(5);

pub fn expect_event(rx: &Receiver<Event>, want: Event) {
    match rx.recv_timeout(WAIT) {
        Ok(got) => assert_eq!(got, want, "expected {:?}, got {:?}", want, got),
        Err(e) => panic!("timed out waiting for {:?}: {}", want, e),
    }
}

pub fn expect_no_event_within(rx: &Receiver<Event>, within: Duration) {
    match rx.recv_timeout(within) {
        Ok(got) => panic!("expected no event within {:?}, got {:?}", within, got),
        Err(RecvTimeoutError::Timeout) => {}
        Err(RecvTimeoutError::Disconnected) => {}
    }
}

/// Like `expect_event`, but tolerant of unrelated events arriving first —
/// for assertions that race against a selector shutdown and can't pin down
/// exact event ordering.
pub fn expect_eventually(rx: &Receiver<Event>, want: Event) {
    let start = std::time::Instant::now();
    loop {
        if start.elapsed() > WAIT {
            panic!("timed out waiting for {:?}", want);
        }
        match rx.recv_timeout(Duration::from_millis(200)) {
            Ok(got) if got == want => return,
            Ok(_) => continue,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                panic!("channel disconnected waiting for {:?}", want)
            }
        }
    }
}
