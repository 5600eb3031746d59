//! Staged async transfer.
//!
//! The file is cut into `ChunkPlan` chunks. For each chunk, in order:
//! async read into the staging buffer, then async send of that buffer.
//! Exactly one operation is in flight at a time, so reads and sends of
//! one connection never overlap and chunk order is preserved.
//!
//! The transfer never waits. It submits an operation and returns; the
//! dispatcher routes the completion back through `on_completion()`,
//! which submits the next one. Other connections run in between.
//!
//! ```text
//!   start ─► Read(i) ──n──► (short? Read rest) ──► Send(i) ──n──► (short? Send rest)
//!                                                    │ EAGAIN            │
//!                                                    ▼                   ▼
//!                                          Poll(POLLOUT)+Send     i+1 < count ? Read(i+1) : Done
//! ```

use fsrv_core::buffer::{BufferProvider, StagingBuf};
use fsrv_core::error::{Result, ServeError};
use fsrv_core::io_backend::{AsyncIo, AsyncOp, IoCompletion, SubmitEntry};
use fsrv_core::token::{OpId, OpKind, Token};
use fsrv_core::transfer::ChunkPlan;

use std::io;
use std::os::fd::RawFd;

/// What the transfer wants after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// An operation is in flight; wait for its completion.
    Pending,
    /// The whole file was sent. The staging buffer is already released.
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Reading,
    Sending,
}

pub struct StagedTransfer {
    token: Token,
    plan: ChunkPlan,
    file_fd: RawFd,
    sock_fd: RawFd,
    /// Current chunk.
    index: u64,
    /// Bytes of the current chunk read (Reading) or sent (Sending).
    done: usize,
    phase: Phase,
    sent: u64,
    staging: Option<StagingBuf>,
    /// The one operation the kernel currently holds for this transfer.
    inflight: Option<OpId>,
    /// The in-flight send sits behind a linked writability poll.
    linked_poll: bool,
}

impl StagedTransfer {
    /// Set up a transfer of `plan.file_size()` bytes.
    ///
    /// The staging buffer is acquired here and held until the last chunk
    /// is sent or the transfer is dropped. An empty file needs none.
    pub fn new<B: BufferProvider>(
        token: Token,
        plan: ChunkPlan,
        file_fd: RawFd,
        sock_fd: RawFd,
        buffers: &B,
    ) -> Result<Self> {
        let staging = if plan.chunk_count() == 0 {
            None
        } else {
            Some(
                buffers
                    .acquire(plan.chunk_size())
                    .ok_or(ServeError::BuffersExhausted)?,
            )
        };
        Ok(Self {
            token,
            plan,
            file_fd,
            sock_fd,
            index: 0,
            done: 0,
            phase: Phase::Reading,
            sent: 0,
            staging,
            inflight: None,
            linked_poll: false,
        })
    }

    /// Body bytes the socket has accepted so far.
    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Chunks fully sent.
    pub fn chunks_sent(&self) -> u64 {
        self.index
    }

    pub fn inflight(&self) -> Option<OpId> {
        self.inflight
    }

    /// Submit the first read. An empty file is `Done` straight away.
    pub fn start<A: AsyncIo>(&mut self, io: &mut A) -> Result<Step> {
        if self.plan.chunk_count() == 0 {
            self.staging = None;
            return Ok(Step::Done);
        }
        self.submit_read(io)?;
        Ok(Step::Pending)
    }

    /// Advance on a completion routed to this transfer's token.
    ///
    /// Poll completions of a linked poll+send pair and completions that
    /// don't match the in-flight operation are ignored.
    pub fn on_completion<A: AsyncIo>(&mut self, io: &mut A, c: IoCompletion) -> Result<Step> {
        if c.id.kind() == Some(OpKind::Poll) {
            return Ok(Step::Pending);
        }
        if self.inflight != Some(c.id) {
            log::debug!("{:?}: stray completion {:#x}", self.token, c.id.0);
            return Ok(Step::Pending);
        }
        self.inflight = None;

        match self.phase {
            Phase::Reading => self.on_read(io, c.result),
            Phase::Sending => self.on_send(io, c.result),
        }
    }

    /// Ask the backend to cancel whatever is in flight. A send waiting on
    /// its linked poll is cancelled through the poll, which fails the send
    /// with it. The cancelled completion still has to be reaped.
    pub fn cancel<A: AsyncIo>(&self, io: &mut A) -> Result<()> {
        let Some(id) = self.inflight else {
            return Ok(());
        };
        if self.linked_poll {
            io.cancel(OpId::new(OpKind::Poll, self.token))?;
        }
        io.cancel(id)
    }

    /// Forget the in-flight operation matching `id`, whose completion
    /// was reaped without advancing. Returns whether it matched.
    pub fn abandon(&mut self, id: OpId) -> bool {
        if id.kind() != Some(OpKind::Poll) && self.inflight == Some(id) {
            self.inflight = None;
            true
        } else {
            false
        }
    }

    fn on_read<A: AsyncIo>(&mut self, io: &mut A, result: i64) -> Result<Step> {
        if result < 0 {
            if is_retryable(result) {
                self.submit_read(io)?;
                return Ok(Step::Pending);
            }
            return Err(ServeError::from_errno(result));
        }
        if result == 0 {
            return Err(ServeError::ShortFile {
                sent: self.plan.offset(self.index) + self.done as u64,
                expected: self.plan.file_size(),
            });
        }

        self.done += result as usize;
        if self.done < self.chunk_len() {
            self.submit_read(io)?;
        } else {
            self.done = 0;
            self.submit_send(io, false)?;
        }
        Ok(Step::Pending)
    }

    fn on_send<A: AsyncIo>(&mut self, io: &mut A, result: i64) -> Result<Step> {
        if result == -(libc::EAGAIN as i64) {
            self.submit_send(io, true)?;
            return Ok(Step::Pending);
        }
        if result == -(libc::EINTR as i64) {
            self.submit_send(io, false)?;
            return Ok(Step::Pending);
        }
        if result < 0 {
            return Err(ServeError::from_errno(result));
        }
        if result == 0 {
            return Err(ServeError::Transfer(io::ErrorKind::WriteZero.into()));
        }

        self.done += result as usize;
        self.sent += result as u64;
        if self.done < self.chunk_len() {
            self.submit_send(io, false)?;
            return Ok(Step::Pending);
        }

        self.index += 1;
        self.done = 0;
        if self.index >= self.plan.chunk_count() {
            self.staging = None;
            return Ok(Step::Done);
        }
        self.submit_read(io)?;
        Ok(Step::Pending)
    }

    fn chunk_len(&self) -> usize {
        self.plan.chunk_len(self.index)
    }

    fn staging_mut(&mut self) -> Result<&mut StagingBuf> {
        self.staging.as_mut().ok_or(ServeError::BuffersExhausted)
    }

    fn submit_read<A: AsyncIo>(&mut self, io: &mut A) -> Result<()> {
        let done = self.done;
        let len = (self.chunk_len() - done) as u32;
        let offset = self.plan.offset(self.index) + done as u64;
        let fd = self.file_fd;
        // Safety: `done < chunk_len <= staging.len()`.
        let buf = unsafe { self.staging_mut()?.as_mut_ptr().add(done) };
        let entry = SubmitEntry {
            id: OpId::new(OpKind::Read, self.token),
            op: AsyncOp::Read { fd, buf, len, offset },
        };
        self.phase = Phase::Reading;
        self.push(io, entry)?;
        self.linked_poll = false;
        Ok(())
    }

    fn submit_send<A: AsyncIo>(&mut self, io: &mut A, when_writable: bool) -> Result<()> {
        let done = self.done;
        let len = (self.chunk_len() - done) as u32;
        let fd = self.sock_fd;
        // Safety: `done < chunk_len <= staging.len()`.
        let buf = unsafe { self.staging_mut()?.as_ptr().add(done) };
        let op = if when_writable {
            AsyncOp::SendWhenWritable { fd, buf, len }
        } else {
            AsyncOp::Send { fd, buf, len }
        };
        let entry = SubmitEntry {
            id: OpId::new(OpKind::Send, self.token),
            op,
        };
        self.phase = Phase::Sending;
        self.push(io, entry)?;
        self.linked_poll = when_writable;
        Ok(())
    }

    fn push<A: AsyncIo>(&mut self, io: &mut A, entry: SubmitEntry) -> Result<()> {
        // Safety: the staging buffer stays put until `inflight` is cleared,
        // and Drop refuses to free it while it is set.
        unsafe { io.submit(&entry)? };
        self.inflight = Some(entry.id);
        Ok(())
    }
}

fn is_retryable(result: i64) -> bool {
    result == -(libc::EINTR as i64) || result == -(libc::EAGAIN as i64)
}

impl Drop for StagedTransfer {
    fn drop(&mut self) {
        if let Some(id) = self.inflight {
            // The kernel may still write into the buffer. Leak it.
            if let Some(buf) = self.staging.take() {
                log::warn!(
                    "{:?}: dropped with op {:#x} in flight, leaking {} byte staging buffer",
                    self.token,
                    id.0,
                    buf.len()
                );
                std::mem::forget(buf);
            }
        }
    }
}
