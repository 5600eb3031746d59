//! # fsrv-executor — The Event Loop
//!
//! One thread, one readiness multiplexer, one async I/O backend. Each
//! turn of the loop handles exactly one notification:
//!
//! ```text
//! loop {
//!     1. Block in Poller::wait() for one readiness notification
//!     2. Route by token:
//!          LISTENER   → accept one connection, register it for read
//!          COMPLETION → drain async completions, advance staged transfers
//!          connection → read-ready: receive phase
//!                       write-ready: send phase / resume zero-copy
//!     3. Tear down any connection whose response cycle ended
//!     4. Flush queued async operations to the kernel
//! }
//! ```
//!
//! The server is generic over every fsrv-core trait. Swap any component
//! and the loop doesn't change.

pub mod config;
pub mod connection;
pub mod machine;
pub mod registry;
pub mod server;
pub mod stats;
pub mod transfer;

#[cfg(test)]
pub(crate) mod testing;

pub use config::ServerConfig;
pub use server::{DefaultServer, Server};
pub use stats::Stats;
