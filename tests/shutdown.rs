//! Closing a selector while channels and writes are still in flight must
//! settle every one of them: queued writes fail, and every channel that was
//! ever registered (or on its way to being registered) receives
//! `handle_close` exactly once.

mod common;

use std::net::TcpListener as StdTcpListener;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use switchyard::channel::ConnectionChannel;
use switchyard::net::TcpStream;
use switchyard::selector::WorkerSelector;
use switchyard::write::WriteOperation;

use common::{expect_eventually, Event, RecordingHandler};

#[test]
fn close_settles_every_outstanding_channel_and_write() {
    common::init();

    let listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let (handler, events) = RecordingHandler::new();
    let worker = Arc::new(WorkerSelector::new(handler).unwrap());
    let worker_thread = {
        let worker = worker.clone();
        thread::spawn(move || worker.run())
    };
    worker.running().wait();

    let pending_stream = TcpStream::connect(addr).unwrap();
    let pending_channel = Arc::new(ConnectionChannel::new(pending_stream, addr));
    worker.register_socket_channel(pending_channel.clone()).unwrap();

    let mut write_results = Vec::new();
    for _ in 0..2 {
        let stream = TcpStream::connect(addr).unwrap();
        let channel = Arc::new(ConnectionChannel::new(stream, addr));
        let (tx, rx) = mpsc::channel();
        worker.queue_write(WriteOperation::new(channel, vec![b"x".to_vec()], move |r| {
            let _ = tx.send(r);
        }));
        write_results.push(rx);
    }

    // Whether each of these lands via normal processing or via the
    // pending-close drain at shutdown depends on scheduling, but either way
    // every listener must be settled with a failure and the channel must be
    // closed exactly once.
    worker.close(false);
    worker_thread.join().unwrap().unwrap();

    for rx in write_results {
        let result = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(result.is_err());
    }

    expect_eventually(&events, Event::Close);
}
