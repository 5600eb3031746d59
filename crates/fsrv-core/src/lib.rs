//! # fsrv-core — types and trait seams for fsrv
//!
//! This crate holds everything the server's moving parts agree on:
//! how descriptors and async operations are tagged, what a readiness
//! multiplexer and an async I/O backend look like, the per-connection
//! state and buffers, and the two-line response framing.
//!
//! ## Design principle
//!
//! The executor depends on the traits here, never on concrete types.
//! Default implementations live in `fsrv-module`; tests swap in mocks.
//!
//! | Trait            | Default impl (`fsrv-module`) |
//! |------------------|------------------------------|
//! | `Poller`         | `EpollPoller`                |
//! | `AsyncIo`        | `BasicIoUring`               |
//! | `CompletionHandle` | `EventFdNotifier`          |
//! | `BufferProvider` | `HeapBuffers`                |
//! | `PathExtractor`  | `HttpPathExtractor`          |

pub mod token;
pub mod error;
pub mod poller;
pub mod io_backend;
pub mod notifier;
pub mod buffer;
pub mod state;
pub mod request;
pub mod response;
pub mod transfer;
