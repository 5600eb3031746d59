//! In-kernel file-to-socket transfer.
//!
//! Repeated `sendfile` calls with a running offset until the whole file
//! is out. The socket is non-blocking, so a call can stop short with
//! `WouldBlock`; the transfer then parks and the dispatcher resumes it
//! on the next write-ready notification.

use fsrv_core::error::{Result, ServeError};
use fsrv_module::sendfile::send_file;

use std::io;
use std::os::fd::BorrowedFd;

/// Outcome of one `pump()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Every byte of the file was handed to the socket.
    Done,
    /// The socket buffer is full; wait for write-readiness.
    Blocked,
}

#[derive(Debug)]
pub struct ZeroCopyTransfer {
    size: u64,
    offset: libc::off_t,
}

impl ZeroCopyTransfer {
    pub fn new(size: u64) -> Self {
        Self { size, offset: 0 }
    }

    pub fn sent(&self) -> u64 {
        self.offset as u64
    }

    pub fn is_done(&self) -> bool {
        self.sent() >= self.size
    }

    /// Copy from `file` to `socket` until done or the socket is full.
    pub fn pump(&mut self, socket: BorrowedFd<'_>, file: BorrowedFd<'_>) -> Result<Progress> {
        self.pump_with(|offset, count| send_file(socket, file, offset, count))
    }

    /// `pump()` over an arbitrary copy primitive. `copy` must advance the
    /// offset it is given by the number of bytes it returns.
    pub fn pump_with<F>(&mut self, mut copy: F) -> Result<Progress>
    where
        F: FnMut(&mut libc::off_t, usize) -> io::Result<usize>,
    {
        while !self.is_done() {
            let remaining = usize::try_from(self.size - self.sent()).unwrap_or(usize::MAX);
            match copy(&mut self.offset, remaining) {
                // File shrank under us.
                Ok(0) => {
                    return Err(ServeError::ShortFile {
                        sent: self.sent(),
                        expected: self.size,
                    })
                }
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(Progress::Blocked),
                Err(e) => return Err(ServeError::Transfer(e)),
            }
        }
        Ok(Progress::Done)
    }
}
