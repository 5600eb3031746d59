//! Server configuration.

use fsrv_core::error::{Result, ServeError};

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Largest submission queue io_uring accepts.
const MAX_RING_ENTRIES: u32 = 32768;

/// Configuration for the event loop.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the listener binds to.
    pub listen: SocketAddr,
    /// Prepended verbatim to every request path.
    pub document_root: PathBuf,
    /// Request paths containing this substring go out zero-copy.
    pub static_segment: String,
    /// Staged transfer chunk size in bytes.
    pub chunk_size: usize,
    /// Connections held at once; accepts beyond this are closed immediately.
    pub max_conns: usize,
    /// listen(2) backlog.
    pub backlog: u32,
    /// io_uring submission queue size. Must be a power of 2.
    pub ring_entries: u32,
    /// Upper bound on one readiness wait, so `run()` notices its shutdown
    /// flag without a signal. `None` blocks until something is ready.
    pub wake_interval: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8888)),
            document_root: PathBuf::from("."),
            static_segment: "static".to_owned(),
            chunk_size: 8192,
            max_conns: 1024,
            backlog: 128,
            ring_entries: 256,
            wake_interval: None,
        }
    }
}

impl ServerConfig {
    pub fn listen(mut self, addr: SocketAddr) -> Self {
        self.listen = addr;
        self
    }

    pub fn document_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.document_root = root.into();
        self
    }

    pub fn static_segment(mut self, segment: impl Into<String>) -> Self {
        self.static_segment = segment.into();
        self
    }

    pub fn chunk_size(mut self, bytes: usize) -> Self {
        self.chunk_size = bytes;
        self
    }

    pub fn max_conns(mut self, n: usize) -> Self {
        self.max_conns = n;
        self
    }

    pub fn backlog(mut self, n: u32) -> Self {
        self.backlog = n;
        self
    }

    pub fn ring_entries(mut self, n: u32) -> Self {
        self.ring_entries = n;
        self
    }

    pub fn wake_interval(mut self, interval: Option<Duration>) -> Self {
        self.wake_interval = interval;
        self
    }

    /// Reject values the loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(ServeError::Config("chunk_size must be non-zero"));
        }
        if self.chunk_size > u32::MAX as usize {
            return Err(ServeError::Config("chunk_size must fit in 32 bits"));
        }
        if self.max_conns == 0 {
            return Err(ServeError::Config("max_conns must be non-zero"));
        }
        if self.max_conns > u32::MAX as usize {
            return Err(ServeError::Config("max_conns must fit in 32 bits"));
        }
        if self.static_segment.is_empty() {
            return Err(ServeError::Config("static_segment must be non-empty"));
        }
        // A retried send is a linked pair of entries.
        if !self.ring_entries.is_power_of_two() || self.ring_entries < 2 {
            return Err(ServeError::Config("ring_entries must be a power of 2, at least 2"));
        }
        if self.ring_entries > MAX_RING_ENTRIES {
            return Err(ServeError::Config("ring_entries must be at most 32768"));
        }
        Ok(())
    }
}
