//! Platform bindings. Linux `epoll` is the only backend this crate ships;
//! the split exists so the `Epoll`/`Events`/`EventFd` names stay stable if a
//! second backend (kqueue, IOCP) is ever added.

macro_rules! syscall {
    ($fn: ident ( $($arg: expr),* $(,)* ) ) => {{
        let res = unsafe { libc::$fn($($arg, )*) };
        if res == -1 {
            Err(std::io::Error::last_os_error())
        } else {
            Ok(res)
        }
    }};
}

mod epoll;
mod eventfd;
mod fd;

pub use epoll::{Epoll, Events};
pub use eventfd::EventFd;
pub(crate) use fd::FileDesc;
