//! A non-blocking connect discovered asynchronously to have failed must
//! report through `connect_exception`, never `handle_connect`, and must
//! never let a later readiness event reach the read/write handlers.

mod common;

use std::net::TcpListener as StdTcpListener;
use std::sync::Arc;
use std::thread;

use switchyard::channel::ConnectionChannel;
use switchyard::net::TcpStream;
use switchyard::selector::WorkerSelector;

use common::{expect_event, Event, RecordingHandler};

#[test]
fn connect_failure_is_reported_asynchronously_and_gates_read_write() {
    common::init();

    let listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    // Nobody is listening on `addr` anymore, so the handshake is refused.
    drop(listener);

    let (handler, events) = RecordingHandler::new();
    let worker = Arc::new(WorkerSelector::new(handler).unwrap());
    let worker_thread = {
        let worker = worker.clone();
        thread::spawn(move || worker.run())
    };
    worker.running().wait();

    let stream = TcpStream::connect(addr).unwrap();
    let channel = Arc::new(ConnectionChannel::new(stream, addr));
    worker.register_socket_channel(channel.clone()).unwrap();

    expect_event(&events, Event::Registration);
    expect_event(&events, Event::ConnectException);

    assert!(!channel.is_connect_complete());
    assert!(!channel.is_readable());
    assert!(!channel.is_writable());

    worker.close(false);
    worker_thread.join().unwrap().unwrap();
}
