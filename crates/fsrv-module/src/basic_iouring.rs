//! `BasicIoUring` — default `AsyncIo` implementation.
//!
//! Uses `io_uring_enter()` for submission and drains the CQ directly.
//! An eventfd is registered with the ring so every posted completion
//! bumps its counter; the dispatcher watches that eventfd in epoll.
//! No SQPOLL, no fixed files, no fixed buffers.

use crate::eventfd_notifier::EventFdNotifier;

use fsrv_core::error::{Result, ServeError};
use fsrv_core::io_backend::{AsyncIo, AsyncOp, IoCompletion, SubmitEntry};
use fsrv_core::notifier::CompletionHandle;
use fsrv_core::token::{OpId, OpKind};

use io_uring::{opcode, squeue, types, IoUring};
use std::os::unix::io::RawFd;

/// Configuration for BasicIoUring.
pub struct BasicIoUringConfig {
    /// Number of SQ entries. Must be power of 2.
    pub sq_entries: u32,
}

impl Default for BasicIoUringConfig {
    fn default() -> Self {
        Self { sq_entries: 256 }
    }
}

/// Default io_uring backend.
///
/// The dispatcher calls:
/// 1. `submit()` for each operation a transfer wants (queues SQEs)
/// 2. `flush()` once per loop turn (calls io_uring_enter)
/// 3. `acknowledge()` + `poll_completions()` when the eventfd is readable
///
/// NEVER blocks on the dispatch path, except `flush_and_wait()` at shutdown.
pub struct BasicIoUring {
    ring: IoUring,
    notifier: EventFdNotifier,
    inflight: usize,
    pending_submit: u32,
}

impl BasicIoUring {
    pub fn new(config: BasicIoUringConfig) -> Result<Self> {
        let ring = IoUring::builder()
            .build(config.sq_entries)
            .map_err(ServeError::IoUringSetup)?;

        let notifier = EventFdNotifier::create()?;
        ring.submitter()
            .register_eventfd(notifier.fd())
            .map_err(ServeError::IoUringSetup)?;

        Ok(Self {
            ring,
            notifier,
            inflight: 0,
            pending_submit: 0,
        })
    }

    /// Translate one operation into its SQE chain.
    ///
    /// `SendWhenWritable` becomes `POLL_ADD(POLLOUT)` linked to `SEND`;
    /// the poll completion carries `OpKind::Poll` so the owner can skip it.
    fn build_sqes(entry: &SubmitEntry) -> ([squeue::Entry; 2], usize) {
        let user_data = entry.id.0;
        match entry.op {
            AsyncOp::Read { fd, buf, len, offset } => {
                let sqe = opcode::Read::new(types::Fd(fd), buf, len)
                    .offset(offset)
                    .build()
                    .user_data(user_data);
                ([sqe, opcode::Nop::new().build()], 1)
            }
            AsyncOp::Send { fd, buf, len } => {
                let sqe = opcode::Send::new(types::Fd(fd), buf, len)
                    .flags(libc::MSG_NOSIGNAL)
                    .build()
                    .user_data(user_data);
                ([sqe, opcode::Nop::new().build()], 1)
            }
            AsyncOp::SendWhenWritable { fd, buf, len } => {
                let poll_id = OpId::new(OpKind::Poll, entry.id.token());
                let poll = opcode::PollAdd::new(types::Fd(fd), libc::POLLOUT as u32)
                    .build()
                    .flags(squeue::Flags::IO_LINK)
                    .user_data(poll_id.0);
                let send = opcode::Send::new(types::Fd(fd), buf, len)
                    .flags(libc::MSG_NOSIGNAL)
                    .build()
                    .user_data(user_data);
                ([poll, send], 2)
            }
        }
    }

    /// Push a linked chain atomically, flushing once if the SQ is full.
    unsafe fn push_all(&mut self, sqes: &[squeue::Entry]) -> Result<()> {
        let pushed = self.ring.submission().push_multiple(sqes).is_ok();
        if !pushed {
            self.flush()?;
            self.ring
                .submission()
                .push_multiple(sqes)
                .map_err(|_| ServeError::RingFull)?;
        }
        self.pending_submit += sqes.len() as u32;
        Ok(())
    }
}

impl AsyncIo for BasicIoUring {
    unsafe fn submit(&mut self, entry: &SubmitEntry) -> Result<()> {
        let (sqes, n) = Self::build_sqes(entry);
        self.push_all(&sqes[..n])
    }

    fn flush(&mut self) -> Result<usize> {
        if self.pending_submit == 0 {
            return Ok(0);
        }
        let submitted = self.ring.submit().map_err(ServeError::IoUringSubmit)?;
        self.inflight += submitted;
        self.pending_submit = self.pending_submit.saturating_sub(submitted as u32);
        Ok(submitted)
    }

    fn cancel(&mut self, id: OpId) -> Result<()> {
        let sqe = opcode::AsyncCancel::new(id.0)
            .build()
            .user_data(OpId::new(OpKind::Cancel, id.token()).0);
        // Safety: a cancel request carries no buffer.
        unsafe { self.push_all(&[sqe]) }
    }

    fn flush_and_wait(&mut self, want: usize) -> Result<usize> {
        let submitted = self
            .ring
            .submit_and_wait(want)
            .map_err(ServeError::IoUringSubmit)?;
        self.inflight += submitted;
        self.pending_submit = self.pending_submit.saturating_sub(submitted as u32);
        Ok(submitted)
    }

    fn poll_completions(&mut self, buf: &mut [IoCompletion]) -> usize {
        let mut cq = self.ring.completion();
        let mut count = 0;
        while count < buf.len() {
            let Some(cqe) = cq.next() else { break };
            buf[count] = IoCompletion {
                id: OpId(cqe.user_data()),
                result: cqe.result() as i64,
            };
            count += 1;
        }
        self.inflight = self.inflight.saturating_sub(count);
        count
    }

    fn inflight(&self) -> usize {
        self.inflight
    }

    fn completion_fd(&self) -> RawFd {
        self.notifier.fd()
    }

    fn acknowledge(&self) -> Result<()> {
        self.notifier.drain().map(|_| ())
    }

    fn shutdown(&mut self) {
        let mut buf = [IoCompletion::EMPTY; 64];
        while self.poll_completions(&mut buf) > 0 {}
        if let Err(e) = self.ring.submitter().unregister_eventfd() {
            log::debug!("unregister eventfd: {e}");
        }
        self.inflight = 0;
        self.pending_submit = 0;
        // IoUring::drop() closes the ring fd and unmaps SQ/CQ.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsrv_core::token::Token;
    use std::io::{Read, Write};
    use std::os::fd::AsRawFd;
    use std::os::unix::net::UnixStream;

    /// io_uring is often blocked by seccomp in containers; skip there.
    fn ring() -> Option<BasicIoUring> {
        match BasicIoUring::new(BasicIoUringConfig { sq_entries: 8 }) {
            Ok(r) => Some(r),
            Err(e) => {
                eprintln!("skipping: {e}");
                None
            }
        }
    }

    fn wait_one(io: &mut BasicIoUring) -> IoCompletion {
        io.flush_and_wait(1).unwrap();
        let mut buf = [IoCompletion::EMPTY; 4];
        let n = io.poll_completions(&mut buf);
        assert_eq!(n, 1);
        buf[0]
    }

    #[test]
    fn read_at_offset_signals_eventfd() {
        let Some(mut io) = ring() else { return };
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(b"0123456789").unwrap();

        let mut dst = [0u8; 4];
        let id = OpId::new(OpKind::Read, Token::connection(3, 1));
        unsafe {
            io.submit(&SubmitEntry {
                id,
                op: AsyncOp::Read {
                    fd: file.as_raw_fd(),
                    buf: dst.as_mut_ptr(),
                    len: 4,
                    offset: 6,
                },
            })
            .unwrap();
        }
        let c = wait_one(&mut io);
        assert_eq!(c.id, id);
        assert_eq!(c.result, 4);
        assert_eq!(&dst, b"6789");
        assert_eq!(io.inflight(), 0);

        // The registered eventfd saw the completion.
        let mut counter = [0u8; 8];
        let n = unsafe {
            libc::read(io.completion_fd(), counter.as_mut_ptr() as *mut libc::c_void, 8)
        };
        assert_eq!(n, 8);
        assert!(u64::from_ne_bytes(counter) >= 1);
    }

    #[test]
    fn send_when_writable_yields_poll_then_send() {
        let Some(mut io) = ring() else { return };
        let (tx, mut rx) = UnixStream::pair().unwrap();
        tx.set_nonblocking(true).unwrap();

        let payload = b"chunk";
        let token = Token::connection(9, 2);
        let id = OpId::new(OpKind::Send, token);
        unsafe {
            io.submit(&SubmitEntry {
                id,
                op: AsyncOp::SendWhenWritable {
                    fd: tx.as_raw_fd(),
                    buf: payload.as_ptr(),
                    len: payload.len() as u32,
                },
            })
            .unwrap();
        }
        io.flush_and_wait(2).unwrap();
        let mut buf = [IoCompletion::EMPTY; 4];
        let n = io.poll_completions(&mut buf);
        assert_eq!(n, 2);
        assert_eq!(buf[0].id.kind(), Some(OpKind::Poll));
        assert_eq!(buf[0].id.token(), token);
        assert_eq!(buf[1].id, id);
        assert_eq!(buf[1].result, payload.len() as i64);

        drop(tx);
        let mut got = Vec::new();
        rx.read_to_end(&mut got).unwrap();
        assert_eq!(got, payload);
    }

    #[test]
    fn cancel_unblocks_a_send_waiting_for_writability() {
        let Some(mut io) = ring() else { return };
        let (tx, _rx) = UnixStream::pair().unwrap();
        tx.set_nonblocking(true).unwrap();
        // Fill the socket so POLLOUT never fires while `_rx` is unread.
        let filler = [0u8; 4096];
        while unsafe {
            libc::send(
                tx.as_raw_fd(),
                filler.as_ptr() as *const libc::c_void,
                filler.len(),
                libc::MSG_DONTWAIT,
            )
        } > 0
        {}

        let payload = [7u8; 64];
        let token = Token::connection(4, 1);
        let send_id = OpId::new(OpKind::Send, token);
        unsafe {
            io.submit(&SubmitEntry {
                id: send_id,
                op: AsyncOp::SendWhenWritable {
                    fd: tx.as_raw_fd(),
                    buf: payload.as_ptr(),
                    len: payload.len() as u32,
                },
            })
            .unwrap();
        }
        io.flush().unwrap();
        io.cancel(OpId::new(OpKind::Poll, token)).unwrap();

        // Poll, linked send and the cancel request itself.
        let mut seen = Vec::new();
        while seen.len() < 3 {
            io.flush_and_wait(1).unwrap();
            let mut buf = [IoCompletion::EMPTY; 4];
            let n = io.poll_completions(&mut buf);
            seen.extend_from_slice(&buf[..n]);
        }
        assert_eq!(io.inflight(), 0);
        let send = seen.iter().find(|c| c.id == send_id).unwrap();
        assert_eq!(send.result, -(libc::ECANCELED as i64));
        assert!(seen.iter().any(|c| c.id.kind() == Some(OpKind::Cancel) && c.id.token() == token));
    }

    #[test]
    fn flush_without_pending_is_noop() {
        let Some(mut io) = ring() else { return };
        assert_eq!(io.flush().unwrap(), 0);
        let mut buf = [IoCompletion::EMPTY; 4];
        assert_eq!(io.poll_completions(&mut buf), 0);
        io.acknowledge().unwrap();
        io.shutdown();
    }
}
