//! # fsrv-module — Default implementations
//!
//! This crate provides the default implementation for every fsrv-core
//! trait, plus the socket and zero-copy primitives the executor calls
//! directly. Each impl prioritizes correctness and simplicity.
//!
//! ## Default stack
//!
//! | Trait            | Default Impl        |
//! |------------------|---------------------|
//! | Poller           | EpollPoller         |
//! | AsyncIo          | BasicIoUring        |
//! | CompletionHandle | EventFdNotifier     |
//! | BufferProvider   | HeapBuffers         |
//! | PathExtractor    | HttpPathExtractor   |
//!
//! Free functions: `net` (listener setup, accept, recv, send) and
//! `sendfile` (in-kernel file-to-socket copy).

pub mod epoll_poller;
pub mod basic_iouring;
pub mod eventfd_notifier;
pub mod heap_buffers;
pub mod http_path;
pub mod net;
pub mod sendfile;
