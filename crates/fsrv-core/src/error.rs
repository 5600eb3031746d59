//! fsrv error types.

use std::io;

use thiserror::Error;

/// Everything that can go wrong inside the server.
///
/// Setup variants (`Poller`, `Listener`, `IoUringSetup`, `Config`) are
/// fatal and end the process. All others are scoped to one connection:
/// the connection is torn down and the event loop carries on.
#[derive(Debug, Error)]
pub enum ServeError {
    /// Creating or driving the readiness multiplexer failed.
    #[error("poller: {0}")]
    Poller(#[source] io::Error),
    /// Creating, binding or registering the listening socket failed.
    #[error("listener: {0}")]
    Listener(#[source] io::Error),
    /// io_uring setup failed.
    #[error("io_uring setup: {0}")]
    IoUringSetup(#[source] io::Error),
    /// io_uring submission failed.
    #[error("io_uring submit: {0}")]
    IoUringSubmit(#[source] io::Error),
    /// Submission queue is full even after a flush.
    #[error("submission queue full")]
    RingFull,
    /// Rejected configuration.
    #[error("invalid config: {0}")]
    Config(&'static str),
    /// accept() on the listener failed.
    #[error("accept: {0}")]
    Accept(#[source] io::Error),
    /// Connection registry has no free slot.
    #[error("registry full ({0} connections)")]
    RegistryFull(usize),
    /// recv() on a connection failed.
    #[error("receive: {0}")]
    Receive(#[source] io::Error),
    /// No request path could be extracted from the received bytes.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// send() of the status line failed or wrote nothing.
    #[error("send: {0}")]
    Send(#[source] io::Error),
    /// A step of a file transfer failed.
    #[error("transfer: {0}")]
    Transfer(#[source] io::Error),
    /// The file ended before its recorded size was transferred.
    #[error("file ended after {sent} of {expected} bytes")]
    ShortFile { sent: u64, expected: u64 },
    /// No staging buffer could be acquired.
    #[error("staging buffers exhausted")]
    BuffersExhausted,
    /// Any other OS error.
    #[error("OS error: {0}")]
    Os(#[from] io::Error),
}

impl ServeError {
    /// Build a `Transfer` error from a negative errno result.
    pub fn from_errno(result: i64) -> Self {
        Self::Transfer(io::Error::from_raw_os_error((-result) as i32))
    }

    /// True for errors that end the process rather than one connection.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Poller(_) | Self::Listener(_) | Self::IoUringSetup(_) | Self::Config(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ServeError>;
