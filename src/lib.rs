//! A non-blocking socket I/O reactor: `epoll`-backed selectors driving a
//! channel lifecycle state machine and a cross-thread write pipeline.
//!
//! Two selector kinds cooperate: an [`selector::AcceptorSelector`] owns
//! listening sockets and hands accepted connections to a
//! [`selector::WorkerSelector`], which owns connection sockets and drives
//! their read/write readiness. Producer threads register channels and
//! enqueue writes through thread-safe APIs; the owning selector thread is
//! the only thread that ever touches a channel's kernel state or buffers.
//!
//! ```no_run
//! use std::sync::Arc;
//! use switchyard::channel::ConnectionChannel;
//! use switchyard::handler::{SelectorHandler, WorkerHandler};
//! use switchyard::net::TcpStream;
//! use switchyard::selector::WorkerSelector;
//!
//! struct Logger;
//! impl SelectorHandler for Logger {}
//! impl WorkerHandler for Logger {
//!     fn handle_connect(&self, channel: &Arc<ConnectionChannel>) {
//!         println!("connected to {}", channel.peer_addr());
//!     }
//! }
//!
//! let worker = Arc::new(WorkerSelector::new(Arc::new(Logger)).unwrap());
//! let stream = TcpStream::connect("example.com:80").unwrap();
//! let addr = stream.peer_addr().unwrap();
//! worker.register_socket_channel(Arc::new(ConnectionChannel::new(stream, addr))).unwrap();
//!
//! let handle = {
//!     let worker = worker.clone();
//!     std::thread::spawn(move || worker.run())
//! };
//! worker.running().wait();
//! worker.close(false);
//! handle.join().unwrap().unwrap();
//! ```

pub mod channel;
pub mod error;
pub mod handler;
pub mod net;
pub mod selector;
pub mod write;

mod epoll;
mod future;
mod queue;
mod sys;
mod waker;

pub use epoll::{Epoll, EpollOpt, Event, Events, Ready, Source, Token};
pub use future::OneShot;
