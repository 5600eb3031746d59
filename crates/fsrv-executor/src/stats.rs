//! Loop counters, logged once at shutdown.

use std::time::Duration;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub accepts: u64,
    pub requests: u64,
    /// Requests that filled the whole receive buffer.
    pub truncated: u64,
    pub responses_ok: u64,
    pub responses_not_found: u64,
    /// Status lines plus file bodies.
    pub bytes_out: u64,
    pub zero_copy: u64,
    pub staged: u64,
    pub errors: u64,
    pub closed: u64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn responses(&self) -> u64 {
        self.responses_ok + self.responses_not_found
    }

    pub fn log(&self, live: usize, elapsed: Duration) {
        let secs = elapsed.as_secs_f64();
        let rps = if secs > 0.0 { self.responses() as f64 / secs } else { 0.0 };
        log::info!(
            "[{:.1}s] conns={} accepts={} req={} truncated={} 200={} 404={} rps={:.0} \
             bytes_out={} zero_copy={} staged={} err={} closed={}",
            secs,
            live,
            self.accepts,
            self.requests,
            self.truncated,
            self.responses_ok,
            self.responses_not_found,
            rps,
            self.bytes_out,
            self.zero_copy,
            self.staged,
            self.errors,
            self.closed,
        );
    }
}
