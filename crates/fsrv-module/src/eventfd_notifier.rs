//! `EventFdNotifier` — default `CompletionHandle` implementation.
//!
//! An eventfd that io_uring signals on every posted completion (via
//! `IORING_REGISTER_EVENTFD`). The dispatcher registers it with epoll and
//! drains it before reaping the completion queue.
//! Coalescing: multiple signals before a drain are a single wakeup
//! (eventfd counter semantics).

use fsrv_core::error::{Result, ServeError};
use fsrv_core::notifier::CompletionHandle;

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

pub struct EventFdNotifier {
    fd: OwnedFd,
}

impl EventFdNotifier {
    /// Create a new non-blocking, close-on-exec eventfd.
    pub fn create() -> Result<Self> {
        let fd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
        if fd < 0 {
            return Err(ServeError::Os(io::Error::last_os_error()));
        }
        // Safety: eventfd() just returned this descriptor and nothing else owns it.
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };
        Ok(Self { fd })
    }
}

impl CompletionHandle for EventFdNotifier {
    fn fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }

    fn drain(&self) -> Result<u64> {
        let mut val: u64 = 0;
        let ret = unsafe {
            libc::read(
                self.fd.as_raw_fd(),
                &mut val as *mut u64 as *mut libc::c_void,
                std::mem::size_of::<u64>(),
            )
        };
        if ret < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::WouldBlock {
                return Ok(0);
            }
            return Err(ServeError::Os(err));
        }
        Ok(val)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_without_signal_is_zero() {
        let n = EventFdNotifier::create().unwrap();
        assert_eq!(n.drain().unwrap(), 0);
    }

    fn signal(n: &EventFdNotifier) {
        let val: u64 = 1;
        let ret = unsafe {
            libc::write(n.fd(), &val as *const u64 as *const libc::c_void, 8)
        };
        assert_eq!(ret, 8);
    }

    #[test]
    fn signals_coalesce_into_one_drain() {
        let n = EventFdNotifier::create().unwrap();
        signal(&n);
        signal(&n);
        signal(&n);
        assert_eq!(n.drain().unwrap(), 3);
        assert_eq!(n.drain().unwrap(), 0);
    }
}
