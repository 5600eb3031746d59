//! Per-connection record.

use crate::transfer::Transfer;

use fsrv_core::buffer::FixedBuf;
use fsrv_core::poller::Poller;
use fsrv_core::state::{ConnState, StateTrail};
use fsrv_core::token::Token;

use std::fs::File;
use std::net::SocketAddr;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};
use std::path::PathBuf;

/// Receive buffer size. One read; no growth, no reassembly.
pub const RECV_CAPACITY: usize = 8192;
/// Send buffer size. Holds the status line.
pub const SEND_CAPACITY: usize = 128;

pub struct Connection {
    pub token: Token,
    pub peer: SocketAddr,
    /// Dropped before `file` and `socket`, so a staged transfer's
    /// descriptors outlive it.
    pub transfer: Option<Transfer>,
    /// Set only after a successful open.
    pub file: Option<File>,
    pub socket: OwnedFd,
    pub request_path: Option<String>,
    pub resolved_path: Option<PathBuf>,
    pub recv: FixedBuf<RECV_CAPACITY>,
    pub send: FixedBuf<SEND_CAPACITY>,
    /// Bytes of `send` already on the wire.
    pub status_sent: usize,
    /// Whether `socket` is currently in the poller.
    pub registered: bool,
    state: ConnState,
    trail: StateTrail,
}

impl Connection {
    pub fn new(token: Token, socket: OwnedFd, peer: SocketAddr) -> Self {
        Self {
            token,
            peer,
            transfer: None,
            file: None,
            socket,
            request_path: None,
            resolved_path: None,
            recv: FixedBuf::new(),
            send: FixedBuf::new(),
            status_sent: 0,
            registered: false,
            state: ConnState::AwaitingRequest,
            trail: StateTrail::new(),
        }
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    pub fn trail(&self) -> &StateTrail {
        &self.trail
    }

    /// Move forward to `next`; backward or repeated moves are ignored.
    pub fn advance(&mut self, next: ConnState) {
        if self.state.advance(next) {
            self.trail.push(next);
        }
    }

    pub fn fd(&self) -> RawFd {
        self.socket.as_raw_fd()
    }

    pub fn socket(&self) -> BorrowedFd<'_> {
        self.socket.as_fd()
    }

    /// Release everything the connection holds, in order: poller
    /// registration, transfer context, file, socket. Consumes the record,
    /// so it can only happen once. Returns the states it went through.
    pub fn close<P: Poller>(mut self, poller: &P) -> StateTrail {
        if self.registered {
            if let Err(e) = poller.unregister(self.fd()) {
                log::debug!("{:?}: unregister: {e}", self.token);
            }
            self.registered = false;
        }
        self.transfer = None;
        self.file = None;
        self.advance(ConnState::Closed);
        self.trail
        // `socket` closes when `self` drops here.
    }
}
