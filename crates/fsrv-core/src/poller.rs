//! Readiness multiplexer abstraction.
//!
//! # Implementors
//!
//! - `EpollPoller` (default): level-triggered epoll, one event per wait.
//!
//! The dispatcher only ever needs one notification at a time, so `wait`
//! returns a single `Readiness` rather than a batch.

use crate::error::Result;
use crate::token::Token;

use std::os::unix::io::RawFd;
use std::time::Duration;

/// Which readiness a descriptor is registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interest {
    pub read: bool,
    pub write: bool,
}

impl Interest {
    pub const READ: Self = Self { read: true, write: false };
    pub const WRITE: Self = Self { read: false, write: true };
    pub const READ_WRITE: Self = Self { read: true, write: true };
}

/// One readiness notification.
///
/// Error and hang-up conditions are folded into both flags so that
/// whichever phase the connection is in observes the failure on its
/// next recv/send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    pub token: Token,
    pub readable: bool,
    pub writable: bool,
}

/// Register descriptors and block until one is ready.
///
/// **Contract:**
/// - `register` must be called once per descriptor before `modify`.
/// - `unregister` removes every interest; the descriptor may be closed
///   afterwards without further calls.
/// - `wait` returns `Ok(None)` on timeout or signal interruption.
pub trait Poller {
    fn register(&self, fd: RawFd, token: Token, interest: Interest) -> Result<()>;

    fn modify(&self, fd: RawFd, token: Token, interest: Interest) -> Result<()>;

    fn unregister(&self, fd: RawFd) -> Result<()>;

    /// Block until one registered descriptor is ready.
    ///
    /// `None` blocks indefinitely.
    fn wait(&mut self, timeout: Option<Duration>) -> Result<Option<Readiness>>;
}
