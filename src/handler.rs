//! Event hook interfaces implemented by the transport layer above this
//! crate. All hooks run on the owning selector thread and must not block.

use std::sync::Arc;

use crate::channel::{ConnectionChannel, ListeningChannel};
use crate::error::SelectorError;

/// Hooks invoked by an acceptor selector.
pub trait AcceptorHandler: SelectorHandler {
    /// A listening channel finished registering with the readiness
    /// primitive and is about to start accepting.
    fn server_channel_registered(&self, _channel: &Arc<ListeningChannel>) {}

    /// A new connection was accepted and handed to a worker selector.
    fn accept_channel(&self, _channel: &Arc<ConnectionChannel>) {}

    /// `accept()` on a ready listening channel failed.
    fn accept_exception(&self, _channel: &Arc<ListeningChannel>, _err: &SelectorError) {}

    /// A ready key for a listening channel could not be processed at all
    /// (e.g. a cancelled registration).
    fn generic_server_channel_exception(&self, _channel: &Arc<ListeningChannel>, _err: &SelectorError) {}
}

/// Hooks invoked by a worker selector.
pub trait WorkerHandler: SelectorHandler {
    /// A connection channel finished registering; READ interest has been
    /// armed and its contexts installed.
    fn handle_registration(&self, _channel: &Arc<ConnectionChannel>) {}

    /// Registration with the readiness primitive failed; the channel was
    /// never added to the registered set.
    fn registration_exception(&self, _channel: &Arc<ConnectionChannel>, _err: &SelectorError) {}

    /// The channel's non-blocking connect completed successfully.
    fn handle_connect(&self, _channel: &Arc<ConnectionChannel>) {}

    /// The channel's non-blocking connect failed.
    fn connect_exception(&self, _channel: &Arc<ConnectionChannel>, _err: &SelectorError) {}

    /// READ readiness fired on a channel whose connect is complete.
    fn handle_read(&self, _channel: &Arc<ConnectionChannel>) {}

    fn read_exception(&self, _channel: &Arc<ConnectionChannel>, _err: &SelectorError) {}

    /// WRITE readiness fired on a channel whose connect is complete.
    fn handle_write(&self, _channel: &Arc<ConnectionChannel>) {}

    fn write_exception(&self, _channel: &Arc<ConnectionChannel>, _err: &SelectorError) {}

    /// The channel has been fully torn down: state is now CLOSED.
    fn handle_close(&self, _channel: &Arc<ConnectionChannel>) {}

    fn generic_channel_exception(&self, _channel: &Arc<ConnectionChannel>, _err: &SelectorError) {}
}

/// Hooks shared by both selector kinds, for conditions not tied to a single
/// channel.
pub trait SelectorHandler: Send + Sync {
    /// An I/O error surfaced from the readiness primitive itself.
    fn select_exception(&self, _err: &SelectorError) {}

    /// A condition that doesn't fit any of the above.
    fn uncaught_exception(&self, _err: &SelectorError) {}
}
