//! Test doubles shared by the unit tests.

use fsrv_core::error::{Result, ServeError};
use fsrv_core::io_backend::{AsyncIo, IoCompletion, SubmitEntry};
use fsrv_core::notifier::CompletionHandle;
use fsrv_core::token::{OpId, OpKind};
use fsrv_module::eventfd_notifier::EventFdNotifier;

use std::os::fd::RawFd;

/// Records every submission; completions are fed by the test.
///
/// A cancel behaves like the kernel's: the target completes with
/// `-ECANCELED` and the request posts its own completion. Anything queued
/// in `completions` counts as in flight.
pub(crate) struct MockIo {
    pub submitted: Vec<SubmitEntry>,
    pub cancelled: Vec<OpId>,
    pub completions: Vec<IoCompletion>,
    pub fail_submit: bool,
    notifier: EventFdNotifier,
}

impl Default for MockIo {
    fn default() -> Self {
        Self {
            submitted: Vec::new(),
            cancelled: Vec::new(),
            completions: Vec::new(),
            fail_submit: false,
            notifier: EventFdNotifier::create().expect("eventfd"),
        }
    }
}

impl MockIo {
    pub fn last(&self) -> SubmitEntry {
        *self.submitted.last().expect("nothing submitted")
    }
}

impl AsyncIo for MockIo {
    unsafe fn submit(&mut self, entry: &SubmitEntry) -> Result<()> {
        if self.fail_submit {
            return Err(ServeError::RingFull);
        }
        self.submitted.push(*entry);
        Ok(())
    }

    fn cancel(&mut self, id: OpId) -> Result<()> {
        self.cancelled.push(id);
        self.completions.push(IoCompletion {
            id,
            result: -(libc::ECANCELED as i64),
        });
        self.completions.push(IoCompletion {
            id: OpId::new(OpKind::Cancel, id.token()),
            result: 0,
        });
        Ok(())
    }

    fn flush(&mut self) -> Result<usize> {
        Ok(0)
    }

    fn flush_and_wait(&mut self, _want: usize) -> Result<usize> {
        Ok(0)
    }

    fn poll_completions(&mut self, buf: &mut [IoCompletion]) -> usize {
        let n = self.completions.len().min(buf.len());
        for (slot, c) in buf.iter_mut().zip(self.completions.drain(..n)) {
            *slot = c;
        }
        n
    }

    fn inflight(&self) -> usize {
        self.completions.len()
    }

    fn completion_fd(&self) -> RawFd {
        self.notifier.fd()
    }

    fn acknowledge(&self) -> Result<()> {
        self.notifier.drain().map(|_| ())
    }

    fn shutdown(&mut self) {}
}
