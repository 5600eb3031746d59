//! `EpollPoller` — default `Poller` implementation.
//!
//! Level-triggered epoll. `wait()` asks the kernel for exactly one event
//! (`maxevents = 1`), so the dispatcher handles one notification to
//! completion before it looks at the next.

use fsrv_core::error::{Result, ServeError};
use fsrv_core::poller::{Interest, Poller, Readiness};
use fsrv_core::token::Token;

use libc::{
    epoll_event, EPOLLERR, EPOLLHUP, EPOLLIN, EPOLLOUT, EPOLLRDHUP, EPOLL_CLOEXEC, EPOLL_CTL_ADD,
    EPOLL_CTL_DEL, EPOLL_CTL_MOD,
};
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::Duration;

pub struct EpollPoller {
    epoll: OwnedFd,
}

impl EpollPoller {
    pub fn new() -> Result<Self> {
        let fd = unsafe { libc::epoll_create1(EPOLL_CLOEXEC) };
        if fd < 0 {
            return Err(ServeError::Poller(io::Error::last_os_error()));
        }
        // Safety: epoll_create1() just returned this descriptor.
        let epoll = unsafe { OwnedFd::from_raw_fd(fd) };
        Ok(Self { epoll })
    }

    fn ctl(&self, op: libc::c_int, fd: RawFd, token: Token, interest: Interest) -> io::Result<()> {
        let mut flags = 0;
        if interest.read {
            flags |= EPOLLIN;
        }
        if interest.write {
            flags |= EPOLLOUT;
        }

        let mut event = epoll_event {
            events: flags as u32,
            u64: token.0,
        };

        let rc = unsafe { libc::epoll_ctl(self.epoll.as_raw_fd(), op, fd, &mut event) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

fn timeout_ms(timeout: Option<Duration>) -> libc::c_int {
    match timeout {
        None => -1,
        Some(t) => t.as_millis().min(libc::c_int::MAX as u128) as libc::c_int,
    }
}

impl Poller for EpollPoller {
    fn register(&self, fd: RawFd, token: Token, interest: Interest) -> Result<()> {
        self.ctl(EPOLL_CTL_ADD, fd, token, interest)
            .map_err(ServeError::Poller)
    }

    fn modify(&self, fd: RawFd, token: Token, interest: Interest) -> Result<()> {
        self.ctl(EPOLL_CTL_MOD, fd, token, interest)
            .map_err(ServeError::Poller)
    }

    fn unregister(&self, fd: RawFd) -> Result<()> {
        let rc = unsafe {
            libc::epoll_ctl(self.epoll.as_raw_fd(), EPOLL_CTL_DEL, fd, std::ptr::null_mut())
        };
        if rc < 0 {
            return Err(ServeError::Poller(io::Error::last_os_error()));
        }
        Ok(())
    }

    fn wait(&mut self, timeout: Option<Duration>) -> Result<Option<Readiness>> {
        let mut event = epoll_event { events: 0, u64: 0 };

        let n = unsafe {
            libc::epoll_wait(self.epoll.as_raw_fd(), &mut event, 1, timeout_ms(timeout))
        };

        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(None);
            }
            return Err(ServeError::Poller(err));
        }
        if n == 0 {
            return Ok(None);
        }

        // epoll_event is packed on x86_64; copy fields out by value.
        let flags = event.events;
        let token = event.u64;

        let failed = flags & ((EPOLLERR | EPOLLHUP) as u32) != 0;
        let readable = failed || flags & ((EPOLLIN | EPOLLRDHUP) as u32) != 0;
        let writable = failed || flags & (EPOLLOUT as u32) != 0;

        Ok(Some(Readiness {
            token: Token(token),
            readable,
            writable,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::net::UnixStream;

    #[test]
    fn wait_times_out_with_nothing_ready() {
        let mut p = EpollPoller::new().unwrap();
        let (a, _b) = UnixStream::pair().unwrap();
        p.register(a.as_raw_fd(), Token(7), Interest::READ).unwrap();
        assert_eq!(p.wait(Some(Duration::from_millis(10))).unwrap(), None);
    }

    #[test]
    fn readable_after_peer_writes() {
        let mut p = EpollPoller::new().unwrap();
        let (a, mut b) = UnixStream::pair().unwrap();
        p.register(a.as_raw_fd(), Token(7), Interest::READ).unwrap();
        b.write_all(b"x").unwrap();
        let r = p.wait(Some(Duration::from_secs(1))).unwrap().unwrap();
        assert_eq!(r.token, Token(7));
        assert!(r.readable);
        assert!(!r.writable);
    }

    #[test]
    fn modify_adds_write_interest() {
        let mut p = EpollPoller::new().unwrap();
        let (a, _b) = UnixStream::pair().unwrap();
        p.register(a.as_raw_fd(), Token(3), Interest::READ).unwrap();
        p.modify(a.as_raw_fd(), Token(4), Interest::READ_WRITE).unwrap();
        let r = p.wait(Some(Duration::from_secs(1))).unwrap().unwrap();
        assert_eq!(r.token, Token(4));
        assert!(r.writable);
    }

    #[test]
    fn unregistered_descriptor_is_silent() {
        let mut p = EpollPoller::new().unwrap();
        let (a, mut b) = UnixStream::pair().unwrap();
        p.register(a.as_raw_fd(), Token(1), Interest::READ_WRITE).unwrap();
        p.unregister(a.as_raw_fd()).unwrap();
        b.write_all(b"x").unwrap();
        assert_eq!(p.wait(Some(Duration::from_millis(10))).unwrap(), None);
        assert!(p.unregister(a.as_raw_fd()).is_err());
    }

    #[test]
    fn peer_close_is_readable() {
        let mut p = EpollPoller::new().unwrap();
        let (a, b) = UnixStream::pair().unwrap();
        p.register(a.as_raw_fd(), Token(2), Interest::READ).unwrap();
        drop(b);
        let r = p.wait(Some(Duration::from_secs(1))).unwrap().unwrap();
        assert!(r.readable);
    }
}
