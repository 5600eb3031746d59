//! Async I/O backend abstraction (staged transfers).
//!
//! An `AsyncIo` handles the lifecycle of asynchronous disk reads and
//! socket sends: submit, flush, poll completions.
//!
//! # Implementors
//!
//! - `BasicIoUring` (default): io_uring with an eventfd registered as its
//!   completion-notification handle. No SQPOLL, no fixed files, no fixed
//!   buffers.
//!
//! The backend never decides what happens next; the transfer that owns
//! an operation does, when the dispatcher routes the completion back to it.

use crate::error::Result;
use crate::token::OpId;

use std::os::unix::io::RawFd;

/// A single async operation.
#[derive(Debug, Clone, Copy)]
pub enum AsyncOp {
    /// `pread(fd, buf, len, offset)`.
    Read {
        fd: RawFd,
        buf: *mut u8,
        len: u32,
        offset: u64,
    },
    /// `send(fd, buf, len, MSG_NOSIGNAL)`.
    Send { fd: RawFd, buf: *const u8, len: u32 },
    /// Wait for `POLLOUT` on `fd`, then send. Used after a send came back
    /// with `EAGAIN`. Produces two completions: `OpKind::Poll` then `Send`.
    SendWhenWritable { fd: RawFd, buf: *const u8, len: u32 },
}

/// An operation plus the tag its completion will carry.
#[derive(Debug, Clone, Copy)]
pub struct SubmitEntry {
    pub id: OpId,
    pub op: AsyncOp,
}

/// A completed async operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoCompletion {
    /// The tag that was submitted.
    pub id: OpId,
    /// Result (byte count or negative errno).
    pub result: i64,
}

impl IoCompletion {
    pub const EMPTY: Self = Self { id: OpId(0), result: 0 };
}

/// Async submission and completion.
///
/// The dispatcher calls `submit()` while handling an event, `flush()`
/// once at the end of each loop turn, and `poll_completions()` whenever
/// the completion handle turns readable.
///
/// **Contract:** `submit()`, `flush()` and `poll_completions()` never block.
/// Only `flush_and_wait()` does, and the dispatcher calls it solely when
/// draining in-flight operations at shutdown.
pub trait AsyncIo {
    /// Queue one operation. Not visible to the kernel until `flush()`.
    ///
    /// # Safety
    /// Every buffer pointer in `entry.op` must stay valid, and must not be
    /// moved or freed, until the completion tagged `entry.id` has been
    /// returned by `poll_completions()`.
    unsafe fn submit(&mut self, entry: &SubmitEntry) -> Result<()>;

    /// Hand all queued operations to the kernel. Returns how many.
    fn flush(&mut self) -> Result<usize>;

    /// Ask the kernel to cancel the in-flight operation tagged `id`.
    ///
    /// Queued like any submission. The cancelled operation still posts its
    /// own completion (usually `-ECANCELED`); the request itself posts one
    /// tagged `OpKind::Cancel` for the same connection. No match is not
    /// an error: the operation may already have finished.
    fn cancel(&mut self, id: OpId) -> Result<()>;

    /// Flush, then block until at least `want` completions are available.
    fn flush_and_wait(&mut self, want: usize) -> Result<usize>;

    /// Drain up to `buf.len()` finished operations. Returns how many were written.
    fn poll_completions(&mut self, buf: &mut [IoCompletion]) -> usize;

    /// Operations handed to the kernel and not yet drained.
    fn inflight(&self) -> usize;

    /// Descriptor of the completion-notification handle.
    fn completion_fd(&self) -> RawFd;

    /// Reset the completion-notification handle before draining.
    fn acknowledge(&self) -> Result<()>;

    /// Release backend resources. In-flight operations must already be drained.
    fn shutdown(&mut self);
}
