//! Completion-notification handle abstraction.
//!
//! A `CompletionHandle` is a descriptor that becomes readable whenever
//! the async backend has finished operations. The dispatcher registers it
//! with the poller under `Token::COMPLETION`, so one wait call covers
//! socket readiness and disk completions alike.
//!
//! # Implementors
//!
//! - `EventFdNotifier` (default): an eventfd the io_uring instance
//!   signals on every posted completion.

use crate::error::Result;

use std::os::unix::io::RawFd;

/// Wakes the dispatcher when completions are ready.
///
/// **Contract:** the backend signals the handle itself; multiple signals
/// before a `drain()` are coalesced (eventfd semantics: counter
/// increments, one read drains).
pub trait CompletionHandle {
    /// Descriptor to register with the poller for read-readiness.
    fn fd(&self) -> RawFd;

    /// Reset the handle. Returns the coalesced count, 0 if none pending.
    fn drain(&self) -> Result<u64>;
}
