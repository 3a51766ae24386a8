//! The error taxonomy of §7: one typed enum rather than stringly-typed or
//! boxed errors, so handler hooks can match on the failure kind.

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum SelectorError {
    /// Cancelled-key / closed-channel: the channel is no longer usable,
    /// whether because its registration token went stale or because it was
    /// simply never writable/readable to begin with. The channel is
    /// scheduled for close.
    #[error("channel unusable during {op}")]
    CancelledKey { op: &'static str },

    /// An operation (write enqueue, channel registration) targeted a
    /// selector that has already shut down.
    #[error("selector closed before {op} could complete")]
    ClosedSelector { op: &'static str },

    /// The readiness primitive refused to register a channel.
    #[error("registration failed: {source}")]
    RegistrationFailed {
        #[source]
        source: io::Error,
    },

    /// An I/O error surfaced from the readiness primitive itself, outside
    /// of any single channel's handling.
    #[error("poll failed: {source}")]
    Poll {
        #[source]
        source: io::Error,
    },

    /// A per-channel operation (accept, connect, read, write) failed.
    #[error("{op} failed: {source}")]
    Io {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    /// A condition the loop cannot attribute to any of the above.
    #[error("unexpected internal error: {0}")]
    Internal(String),
}

impl SelectorError {
    pub fn cancelled_key(op: &'static str) -> SelectorError {
        SelectorError::CancelledKey { op }
    }

    pub fn closed_selector(op: &'static str) -> SelectorError {
        SelectorError::ClosedSelector { op }
    }

    pub fn registration_failed(source: io::Error) -> SelectorError {
        SelectorError::RegistrationFailed { source }
    }

    pub fn poll(source: io::Error) -> SelectorError {
        SelectorError::Poll { source }
    }

    pub fn io(op: &'static str, source: io::Error) -> SelectorError {
        SelectorError::Io { op, source }
    }

    /// `true` for variants that mean the channel itself should be scheduled
    /// for close rather than merely logged and ignored.
    pub fn is_channel_fatal(&self) -> bool {
        matches!(
            self,
            SelectorError::CancelledKey { .. } | SelectorError::Io { .. }
        )
    }

    /// Builds an equivalent error to fan the same cause out to several
    /// listeners at once (the variants carrying an `io::Error` collapse to
    /// their closed-selector counterpart, since `io::Error` isn't `Clone`).
    pub fn duplicate(&self) -> SelectorError {
        match self {
            SelectorError::CancelledKey { op } => SelectorError::CancelledKey { op },
            SelectorError::ClosedSelector { op } => SelectorError::ClosedSelector { op },
            SelectorError::RegistrationFailed { .. } => {
                SelectorError::ClosedSelector { op: "register" }
            }
            SelectorError::Poll { .. } => SelectorError::ClosedSelector { op: "poll" },
            SelectorError::Io { op, .. } => SelectorError::ClosedSelector { op },
            SelectorError::Internal(msg) => SelectorError::Internal(msg.clone()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::SelectorError;
    use std::io;

    #[test]
    fn display_names_the_failing_operation() {
        let cases: Vec<(SelectorError, &str)> = vec![
            (SelectorError::cancelled_key("write"), "write"),
            (SelectorError::closed_selector("queue_write"), "queue_write"),
            (
                SelectorError::io("handle_read", io::Error::new(io::ErrorKind::Other, "boom")),
                "handle_read",
            ),
        ];

        for (err, op) in cases {
            assert!(
                err.to_string().contains(op),
                "expected {:?} to mention {op}",
                err
            );
        }
    }

    #[test]
    fn registration_and_poll_display_the_source() {
        let err = SelectorError::registration_failed(io::Error::new(io::ErrorKind::Other, "nope"));
        assert!(err.to_string().contains("nope"));

        let err = SelectorError::poll(io::Error::new(io::ErrorKind::Other, "epoll broke"));
        assert!(err.to_string().contains("epoll broke"));
    }
}
