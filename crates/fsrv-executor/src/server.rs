//! The dispatcher.
//!
//! Owns the listening socket, the connection registry and the `Engine`.
//! Each `turn()` waits for one readiness notification and routes it by
//! token. Connections whose handler says `Close` are torn down before
//! the turn ends.

use crate::config::ServerConfig;
use crate::connection::Connection;
use crate::machine::{Engine, Verdict};
use crate::registry::Registry;
use crate::stats::Stats;
use crate::transfer::Transfer;

use fsrv_core::buffer::BufferProvider;
use fsrv_core::error::{Result, ServeError};
use fsrv_core::io_backend::{AsyncIo, IoCompletion};
use fsrv_core::poller::{Interest, Poller, Readiness};
use fsrv_core::request::PathExtractor;
use fsrv_core::token::{OpKind, Token};
use fsrv_module::basic_iouring::{BasicIoUring, BasicIoUringConfig};
use fsrv_module::epoll_poller::EpollPoller;
use fsrv_module::heap_buffers::HeapBuffers;
use fsrv_module::http_path::HttpPathExtractor;
use fsrv_module::net;

use std::io;
use std::net::SocketAddr;
use std::os::fd::{AsFd, AsRawFd, OwnedFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Completions drained per batch.
const COMPLETION_BATCH: usize = 64;

/// The server with every default implementation.
pub type DefaultServer = Server<EpollPoller, BasicIoUring, HttpPathExtractor, HeapBuffers>;

pub struct Server<P, A, X, B>
where
    P: Poller,
    A: AsyncIo,
    X: PathExtractor,
    B: BufferProvider,
{
    registry: Registry,
    engine: Engine<P, A, X, B>,
    listener: OwnedFd,
    local_addr: SocketAddr,
    started: Instant,
    stopped: bool,
}

impl DefaultServer {
    /// Bind `config.listen` and set up epoll, io_uring and its eventfd.
    pub fn bind(config: ServerConfig) -> Result<Self> {
        config.validate()?;
        let poller = EpollPoller::new()?;
        let io = BasicIoUring::new(BasicIoUringConfig {
            sq_entries: config.ring_entries,
        })?;
        Self::with_parts(config, poller, io, HttpPathExtractor::new(), HeapBuffers::new())
    }
}

impl<P, A, X, B> Server<P, A, X, B>
where
    P: Poller,
    A: AsyncIo,
    X: PathExtractor,
    B: BufferProvider,
{
    pub fn with_parts(
        config: ServerConfig,
        poller: P,
        io: A,
        extractor: X,
        buffers: B,
    ) -> Result<Self> {
        config.validate()?;

        let listener =
            net::bind_listener(config.listen, config.backlog).map_err(ServeError::Listener)?;
        let local_addr = net::local_addr(listener.as_fd()).map_err(ServeError::Listener)?;

        poller.register(listener.as_raw_fd(), Token::LISTENER, Interest::READ)?;
        poller.register(io.completion_fd(), Token::COMPLETION, Interest::READ)?;

        Ok(Self {
            registry: Registry::new(config.max_conns),
            engine: Engine::new(poller, io, extractor, buffers, config),
            listener,
            local_addr,
            started: Instant::now(),
            stopped: false,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn config(&self) -> &ServerConfig {
        &self.engine.config
    }

    pub fn stats(&self) -> Stats {
        self.engine.stats
    }

    /// Live connections.
    pub fn connections(&self) -> usize {
        self.registry.len()
    }

    /// Staging buffers currently on loan.
    pub fn buffers_in_use(&self) -> usize {
        self.engine.buffers.in_use()
    }

    /// Serve until `shutdown` is set, then drain and close everything.
    pub fn run(&mut self, shutdown: &AtomicBool) -> Result<()> {
        log::info!(
            "fsrv: listening on http://{}/ (root {}, static segment {:?}, chunk {})",
            self.local_addr,
            self.engine.config.document_root.display(),
            self.engine.config.static_segment,
            self.engine.config.chunk_size,
        );
        let wake = self.engine.config.wake_interval;
        while !shutdown.load(Ordering::Relaxed) {
            if let Err(e) = self.turn(wake) {
                if e.is_fatal() {
                    log::error!("{e}");
                    self.shutdown();
                    return Err(e);
                }
                log::warn!("{e}");
                self.engine.stats.errors += 1;
            }
        }
        self.shutdown();
        Ok(())
    }

    /// Wait for one notification and handle it, then hand queued async
    /// submissions to the kernel. Returns `false` if the wait ended
    /// without one (timeout or signal).
    pub fn turn(&mut self, timeout: Option<Duration>) -> Result<bool> {
        let Some(ready) = self.engine.poller.wait(timeout)? else {
            return Ok(false);
        };

        match ready.token {
            Token::LISTENER => {
                if ready.readable {
                    self.accept_one();
                }
            }
            Token::COMPLETION => self.reap_completions(),
            token => self.dispatch(token, ready),
        }

        self.engine.io.flush()?;
        Ok(true)
    }

    // ── Listener ──

    fn accept_one(&mut self) {
        let (socket, peer) = match net::accept(self.listener.as_fd()) {
            Ok(pair) => pair,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
            Err(e) => {
                log::warn!("{}", ServeError::Accept(e));
                self.engine.stats.errors += 1;
                return;
            }
        };
        self.engine.stats.accepts += 1;

        if self.registry.is_full() {
            log::warn!("{peer}: {}", ServeError::RegistryFull(self.registry.capacity()));
            self.engine.stats.errors += 1;
            return;
        }
        let token = match self
            .registry
            .insert_with(|token| Connection::new(token, socket, peer))
        {
            Ok(token) => token,
            Err(e) => {
                log::warn!("{peer}: {e}");
                self.engine.stats.errors += 1;
                return;
            }
        };

        let Some(conn) = self.registry.get_mut(token) else {
            return;
        };
        match self.engine.poller.register(conn.fd(), token, Interest::READ) {
            Ok(()) => {
                conn.registered = true;
                log::info!("{peer}: accepted as {token:?}");
            }
            Err(e) => {
                log::warn!("{peer}: {e}");
                self.engine.stats.errors += 1;
                self.teardown(token);
            }
        }
    }

    // ── Connections ──

    fn dispatch(&mut self, token: Token, ready: Readiness) {
        let Some(conn) = self.registry.get_mut(token) else {
            log::debug!("stale readiness for {token:?}");
            return;
        };

        let mut verdict = Verdict::Keep;
        if ready.readable {
            verdict = self.engine.on_readable(conn);
        }
        if verdict == Verdict::Keep && ready.writable {
            verdict = self.engine.on_writable(conn);
        }
        if verdict == Verdict::Close {
            self.teardown(token);
        }
    }

    fn reap_completions(&mut self) {
        if let Err(e) = self.engine.io.acknowledge() {
            log::warn!("acknowledge completions: {e}");
        }
        let mut buf = [IoCompletion::EMPTY; COMPLETION_BATCH];
        loop {
            let n = self.engine.io.poll_completions(&mut buf);
            if n == 0 {
                break;
            }
            for c in &buf[..n] {
                self.route_completion(*c);
            }
        }
    }

    fn route_completion(&mut self, c: IoCompletion) {
        if matches!(c.id.kind(), Some(OpKind::Poll | OpKind::Cancel)) {
            return;
        }
        let token = c.id.token();
        let Some(conn) = self.registry.get_mut(token) else {
            log::debug!("completion {:#x} for a closed connection", c.id.0);
            return;
        };
        if self.engine.on_completion(conn, c) == Verdict::Close {
            self.teardown(token);
        }
    }

    /// Remove and release one connection. Safe to call twice.
    fn teardown(&mut self, token: Token) {
        let Some(conn) = self.registry.remove(token) else {
            return;
        };
        let peer = conn.peer;
        let trail = conn.close(&self.engine.poller);
        self.engine.stats.closed += 1;
        log::info!("{peer}: closed ({:?})", trail.as_slice());
    }

    // ── Shutdown ──

    /// Wait out every in-flight async operation, then close every
    /// connection. Idempotent; also runs on drop.
    pub fn shutdown(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;

        self.drain_inflight();
        for token in self.registry.tokens() {
            self.teardown(token);
        }
        self.engine.io.shutdown();
        self.engine.stats.log(self.registry.len(), self.started.elapsed());
    }

    /// Cancel every staged operation, then reap completions without
    /// advancing any transfer, so no kernel operation still points at a
    /// staging buffer when it is freed.
    fn drain_inflight(&mut self) {
        for conn in self.registry.iter_mut() {
            if let Some(Transfer::Staged(t)) = conn.transfer.as_ref() {
                if let Err(e) = t.cancel(&mut self.engine.io) {
                    log::warn!("{}: cancel: {e}", conn.peer);
                }
            }
        }

        let mut buf = [IoCompletion::EMPTY; COMPLETION_BATCH];
        while self.engine.io.inflight() > 0 {
            match self.engine.io.flush_and_wait(1) {
                Ok(_) => {}
                Err(ServeError::IoUringSubmit(e)) if e.kind() == io::ErrorKind::Interrupted => {
                    continue
                }
                Err(e) => {
                    log::error!("drain async operations: {e}");
                    return;
                }
            }
            let n = self.engine.io.poll_completions(&mut buf);
            for c in &buf[..n] {
                if let Some(Transfer::Staged(t)) = self
                    .registry
                    .get_mut(c.id.token())
                    .and_then(|conn| conn.transfer.as_mut())
                {
                    t.abandon(c.id);
                }
            }
        }
    }
}

impl<P, A, X, B> Drop for Server<P, A, X, B>
where
    P: Poller,
    A: AsyncIo,
    X: PathExtractor,
    B: BufferProvider,
{
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockIo;
    use fsrv_core::response::STATUS_OK;
    use std::io::{Read, Write};
    use std::net::TcpStream;

    #[test]
    fn invalid_config_is_rejected_before_binding() {
        let r = DefaultServer::bind(ServerConfig::default().chunk_size(0));
        assert!(matches!(r, Err(ServeError::Config(_))));
    }

    #[test]
    fn taken_port_is_a_listener_error() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = taken.local_addr().unwrap();
        let r = Server::with_parts(
            ServerConfig::default().listen(addr),
            EpollPoller::new().unwrap(),
            MockIo::default(),
            HttpPathExtractor::new(),
            HeapBuffers::new(),
        );
        assert!(matches!(r, Err(ServeError::Listener(_))));
    }

    #[test]
    fn shutdown_cancels_a_staged_transfer_in_flight() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("doc.txt"), b"0123456789").unwrap();
        let mut server = Server::with_parts(
            ServerConfig::default()
                .listen("127.0.0.1:0".parse().unwrap())
                .document_root(dir.path())
                .chunk_size(4),
            EpollPoller::new().unwrap(),
            MockIo::default(),
            HttpPathExtractor::new(),
            HeapBuffers::new(),
        )
        .unwrap();

        let mut client = TcpStream::connect(server.local_addr()).unwrap();
        client.write_all(b"GET /doc.txt HTTP/1.0\r\n\r\n").unwrap();
        // Accept, receive, then send the status line and start the transfer.
        for _ in 0..50 {
            if !server.engine.io.submitted.is_empty() {
                break;
            }
            server.turn(Some(Duration::from_millis(100))).unwrap();
        }
        let read = server.engine.io.last();
        assert_eq!(read.id.kind(), Some(OpKind::Read));
        assert_eq!(server.buffers_in_use(), 1);

        server.shutdown();
        assert_eq!(server.engine.io.cancelled, vec![read.id]);
        assert_eq!(server.engine.io.inflight(), 0);
        assert_eq!(server.connections(), 0);
        assert_eq!(server.buffers_in_use(), 0);

        client.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let mut got = Vec::new();
        client.read_to_end(&mut got).unwrap();
        assert_eq!(got, STATUS_OK);
    }
}
