//! Per-connection state machine.
//!
//! `Engine` is everything a connection needs besides itself: the poller
//! it is registered with, the async backend, the path extractor, the
//! staging-buffer provider, configuration and counters. The dispatcher
//! owns the connection registry separately and lends one connection at a
//! time to these handlers.
//!
//! Each handler returns a `Verdict`. `Close` means the response cycle is
//! over (or failed) and the dispatcher must tear the connection down.

use crate::config::ServerConfig;
use crate::connection::Connection;
use crate::stats::Stats;
use crate::transfer::{Progress, StagedTransfer, Step, Transfer, ZeroCopyTransfer};

use fsrv_core::buffer::BufferProvider;
use fsrv_core::error::{Result, ServeError};
use fsrv_core::io_backend::{AsyncIo, IoCompletion};
use fsrv_core::poller::{Interest, Poller};
use fsrv_core::request::PathExtractor;
use fsrv_core::response::{status_line, STATUS_OK};
use fsrv_core::state::ConnState;
use fsrv_core::transfer::{ChunkPlan, TransferKind};
use fsrv_module::net;

use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::{AsFd, AsRawFd};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Keep,
    Close,
}

pub struct Engine<P, A, X, B> {
    pub poller: P,
    pub io: A,
    pub extractor: X,
    pub buffers: B,
    pub config: ServerConfig,
    pub stats: Stats,
}

/// Document root and request path joined as plain strings. No
/// normalisation: `..` segments are passed to the filesystem untouched.
pub fn resolve(root: &std::path::Path, request_path: &str) -> PathBuf {
    let mut joined = OsString::from(root.as_os_str());
    joined.push(request_path);
    PathBuf::from(joined)
}

fn open_file(path: &std::path::Path) -> io::Result<File> {
    OpenOptions::new().read(true).write(true).open(path)
}

impl<P, A, X, B> Engine<P, A, X, B>
where
    P: Poller,
    A: AsyncIo,
    X: PathExtractor,
    B: BufferProvider,
{
    pub fn new(poller: P, io: A, extractor: X, buffers: B, config: ServerConfig) -> Self {
        Self {
            poller,
            io,
            extractor,
            buffers,
            config,
            stats: Stats::new(),
        }
    }

    // ── Receive phase ──

    /// Read-ready. Only a connection still awaiting its request reads.
    pub fn on_readable(&mut self, conn: &mut Connection) -> Verdict {
        if conn.state() != ConnState::AwaitingRequest {
            return Verdict::Keep;
        }

        let n = match net::recv(conn.socket.as_fd(), conn.recv.spare_mut()) {
            Ok(0) => {
                log::debug!("{}: closed before sending a request", conn.peer);
                return Verdict::Close;
            }
            Ok(n) => n,
            Err(e)
                if e.kind() == io::ErrorKind::WouldBlock
                    || e.kind() == io::ErrorKind::Interrupted =>
            {
                return Verdict::Keep;
            }
            Err(e) => {
                self.fail(conn, ServeError::Receive(e));
                return Verdict::Close;
            }
        };

        let fill = conn.recv.commit(n);
        if fill.is_truncated() {
            log::warn!(
                "{}: request fills the {} byte receive buffer, rest ignored",
                conn.peer,
                conn.recv.capacity()
            );
            self.stats.truncated += 1;
        }
        conn.advance(ConnState::DataReceived);
        self.stats.requests += 1;

        self.prepare_response(conn);

        let interest = Interest::READ_WRITE;
        if let Err(e) = self.poller.modify(conn.fd(), conn.token, interest) {
            self.fail(conn, e);
            return Verdict::Close;
        }
        Verdict::Keep
    }

    /// Extract, resolve, open; stage the status line.
    fn prepare_response(&mut self, conn: &mut Connection) {
        match self.extractor.extract(conn.recv.as_slice()) {
            Ok(path) => {
                let resolved = resolve(&self.config.document_root, &path);
                match open_file(&resolved) {
                    Ok(file) => conn.file = Some(file),
                    Err(e) => log::debug!("{}: open {}: {e}", conn.peer, resolved.display()),
                }
                log::debug!("{}: GET {path}", conn.peer);
                conn.request_path = Some(path);
                conn.resolved_path = Some(resolved);
            }
            Err(e) => log::debug!("{}: {e}", conn.peer),
        }
        conn.send.fill_from(status_line(conn.file.is_some()));
    }

    // ── Send phase ──

    /// Write-ready. Sends the status line once, then starts the body
    /// transfer; later calls resume a parked zero-copy transfer.
    pub fn on_writable(&mut self, conn: &mut Connection) -> Verdict {
        if conn.state() != ConnState::DataReceived {
            return Verdict::Keep;
        }
        match conn.transfer {
            None => self.send_status(conn),
            Some(Transfer::ZeroCopy(_)) => self.resume_zero_copy(conn),
            // The socket is out of the poller while a staged transfer runs.
            Some(Transfer::Staged(_)) => Verdict::Keep,
        }
    }

    /// Write what is left of the status line. A short write keeps the
    /// connection and resumes on the next write-readiness; the body only
    /// starts once the whole line is out.
    fn send_status(&mut self, conn: &mut Connection) -> Verdict {
        let rest = &conn.send.as_slice()[conn.status_sent..];
        match net::send(conn.socket(), rest) {
            Ok(0) => {
                self.fail(conn, ServeError::Send(io::ErrorKind::WriteZero.into()));
                return Verdict::Close;
            }
            Ok(n) => {
                conn.status_sent += n;
                self.stats.bytes_out += n as u64;
                if conn.status_sent < conn.send.len() {
                    log::debug!(
                        "{}: status line at {} of {} bytes",
                        conn.peer,
                        conn.status_sent,
                        conn.send.len()
                    );
                    return Verdict::Keep;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Verdict::Keep,
            Err(e) => {
                self.fail(conn, ServeError::Send(e));
                return Verdict::Close;
            }
        }

        if conn.send.as_slice() == STATUS_OK {
            self.stats.responses_ok += 1;
        } else {
            self.stats.responses_not_found += 1;
        }

        if conn.file.is_none() {
            return self.finish(conn);
        }
        match self.start_transfer(conn) {
            Ok(Verdict::Keep) => Verdict::Keep,
            Ok(Verdict::Close) => self.finish(conn),
            Err(e) => {
                self.fail(conn, e);
                self.finish(conn)
            }
        }
    }

    /// Pick a strategy by request path and run it as far as it goes now.
    fn start_transfer(&mut self, conn: &mut Connection) -> Result<Verdict> {
        let Some(file) = conn.file.as_ref() else {
            return Ok(Verdict::Close);
        };
        let size = file.metadata()?.len();
        let path = conn.request_path.as_deref().unwrap_or_default();

        match TransferKind::classify(path, &self.config.static_segment) {
            TransferKind::ZeroCopy => {
                log::debug!("{}: zero-copy {size} bytes", conn.peer);
                conn.transfer = Some(Transfer::ZeroCopy(ZeroCopyTransfer::new(size)));
                Ok(self.resume_zero_copy(conn))
            }
            TransferKind::StagedAsync => {
                let plan = ChunkPlan::new(size, self.config.chunk_size);
                log::debug!(
                    "{}: staged {size} bytes in {} chunks",
                    conn.peer,
                    plan.chunk_count()
                );
                let mut transfer = StagedTransfer::new(
                    conn.token,
                    plan,
                    file.as_raw_fd(),
                    conn.fd(),
                    &self.buffers,
                )?;
                // Completions drive the socket from here on; level-triggered
                // readiness would only spin the loop.
                if conn.registered {
                    self.poller.unregister(conn.fd())?;
                    conn.registered = false;
                }
                if transfer.start(&mut self.io)? == Step::Done {
                    self.stats.staged += 1;
                    return Ok(Verdict::Close);
                }
                conn.transfer = Some(Transfer::Staged(transfer));
                Ok(Verdict::Keep)
            }
        }
    }

    fn resume_zero_copy(&mut self, conn: &mut Connection) -> Verdict {
        let (Some(Transfer::ZeroCopy(t)), Some(file)) = (conn.transfer.as_mut(), conn.file.as_ref())
        else {
            return Verdict::Keep;
        };
        let before = t.sent();
        let progress = t.pump(conn.socket.as_fd(), file.as_fd());
        self.stats.bytes_out += t.sent() - before;

        match progress {
            Ok(Progress::Done) => {
                self.stats.zero_copy += 1;
                conn.transfer = None;
                self.finish(conn)
            }
            Ok(Progress::Blocked) => {
                if let Err(e) = self.poller.modify(conn.fd(), conn.token, Interest::WRITE) {
                    self.fail(conn, e);
                    return self.finish(conn);
                }
                Verdict::Keep
            }
            Err(e) => {
                conn.transfer = None;
                self.fail(conn, e);
                self.finish(conn)
            }
        }
    }

    // ── Async completions ──

    /// A completion tagged with this connection's token.
    pub fn on_completion(&mut self, conn: &mut Connection, c: IoCompletion) -> Verdict {
        let Some(Transfer::Staged(t)) = conn.transfer.as_mut() else {
            log::debug!("{:?}: completion {:#x} with no staged transfer", conn.token, c.id.0);
            return Verdict::Keep;
        };
        let before = t.sent();
        let step = t.on_completion(&mut self.io, c);
        self.stats.bytes_out += t.sent() - before;

        match step {
            Ok(Step::Pending) => Verdict::Keep,
            Ok(Step::Done) => {
                self.stats.staged += 1;
                conn.transfer = None;
                self.finish(conn)
            }
            Err(e) => {
                conn.transfer = None;
                self.fail(conn, e);
                self.finish(conn)
            }
        }
    }

    // ── Outcomes ──

    /// The response was attempted in full.
    fn finish(&mut self, conn: &mut Connection) -> Verdict {
        conn.advance(ConnState::DataSent);
        Verdict::Close
    }

    fn fail(&mut self, conn: &Connection, e: ServeError) {
        log::warn!("{}: {e}", conn.peer);
        self.stats.errors += 1;
    }
}
