//! End-to-end: register a connection channel, observe connect completion,
//! push a write through the pipeline, observe the echoed read, then close.

mod common;

use std::io::{Read, Write};
use std::net::TcpListener as StdTcpListener;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use switchyard::channel::ConnectionChannel;
use switchyard::net::TcpStream;
use switchyard::selector::WorkerSelector;
use switchyard::write::WriteOperation;

use common::{expect_event, Event, RecordingHandler};

#[test]
fn register_connect_write_read_close() {
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

    let stream = TcpStream::connect(addr).unwrap();
    let channel = Arc::new(ConnectionChannel::new(stream, addr));
    worker.register_socket_channel(channel.clone()).unwrap();

    expect_event(&events, Event::Registration);
    expect_event(&events, Event::Connect);

    let (mut server, _) = listener.accept().unwrap();

    let (done_tx, done_rx) = mpsc::channel();
    let op = WriteOperation::new(channel.clone(), vec![b"x".to_vec()], move |r| {
        let _ = done_tx.send(r);
    });
    worker.queue_write(op);

    expect_event(&events, Event::Write);
    let result = done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(result.is_ok());

    let mut buf = [0u8; 1];
    server.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"x");

    server.write_all(b"y").unwrap();
    expect_event(&events, Event::Read);

    worker.close(false);
    expect_event(&events, Event::Close);
    worker_thread.join().unwrap().unwrap();
}
