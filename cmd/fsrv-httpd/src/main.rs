//! fsrv HTTP/1.0 file server
//!
//! Single-threaded. One epoll loop multiplexes every connection; each
//! connection gets exactly one response and is closed.
//!
//! Files whose request path contains the static segment go out with
//! sendfile; everything else is read and sent in chunks through io_uring.
//!
//! Usage:
//!     ./target/release/fsrv-httpd [--listen 0.0.0.0:8888] [--root ./www]
//!
//! Logging via RUST_LOG (default `info`).

use fsrv_executor::{DefaultServer, ServerConfig};

use anyhow::Context;
use clap::Parser;
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};

use std::net::SocketAddr;
use std::os::raw::c_int;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Command-line flags; each falls back to an `FSRV_*` environment variable.
#[derive(Debug, Parser)]
#[command(name = "fsrv-httpd", version, about)]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "FSRV_LISTEN", default_value = "0.0.0.0:8888")]
    listen: SocketAddr,

    /// Document root; request paths are appended to it verbatim.
    #[arg(long, env = "FSRV_ROOT", default_value = ".")]
    root: PathBuf,

    /// Request paths containing this go out zero-copy.
    #[arg(long = "static", env = "FSRV_STATIC", default_value = "static")]
    static_segment: String,

    /// Staged transfer chunk size in bytes.
    #[arg(long, env = "FSRV_CHUNK", default_value_t = 8192)]
    chunk: usize,

    /// Maximum simultaneous connections.
    #[arg(long, env = "FSRV_MAX_CONNS", default_value_t = 1024)]
    max_conns: usize,

    /// listen(2) backlog.
    #[arg(long, env = "FSRV_BACKLOG", default_value_t = 128)]
    backlog: u32,

    /// io_uring submission queue entries (power of 2).
    #[arg(long, env = "FSRV_RING", default_value_t = 256)]
    ring: u32,

    /// Wake the loop at least this often (ms) to check for shutdown.
    /// Signals interrupt the wait anyway; 0 disables.
    #[arg(long, env = "FSRV_WAKE_MS", default_value_t = 0)]
    wake_ms: u64,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        let wake = (self.wake_ms > 0).then(|| Duration::from_millis(self.wake_ms));
        ServerConfig::default()
            .listen(self.listen)
            .document_root(self.root)
            .static_segment(self.static_segment)
            .chunk_size(self.chunk)
            .max_conns(self.max_conns)
            .backlog(self.backlog)
            .ring_entries(self.ring)
            .wake_interval(wake)
    }
}

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

extern "C" fn on_signal(_: c_int) {
    SHUTDOWN.store(true, Ordering::Relaxed);
}

/// SIGINT/SIGTERM request shutdown. No SA_RESTART, so a blocked
/// epoll_wait returns EINTR and the loop sees the flag. SIGPIPE is
/// ignored; sends report EPIPE instead.
fn install_signals() -> anyhow::Result<()> {
    let stop = SigAction::new(SigHandler::Handler(on_signal), SaFlags::empty(), SigSet::empty());
    unsafe {
        signal::sigaction(Signal::SIGINT, &stop).context("install SIGINT handler")?;
        signal::sigaction(Signal::SIGTERM, &stop).context("install SIGTERM handler")?;
        signal::signal(Signal::SIGPIPE, SigHandler::SigIgn).context("ignore SIGPIPE")?;
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    log::debug!("{args:?}");
    install_signals()?;

    let config = args.into_config();
    let mut server = match DefaultServer::bind(config) {
        Ok(s) => s,
        Err(e) => {
            log::error!("startup failed: {e}");
            return Err(e).context("fsrv-httpd: setup");
        }
    };

    server.run(&SHUTDOWN).context("fsrv-httpd: event loop")?;
    log::info!("fsrv-httpd: stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_flags_map_onto_config() {
        let args = Args::parse_from([
            "fsrv-httpd",
            "--listen",
            "127.0.0.1:9000",
            "--root",
            "/srv/www",
            "--static",
            "assets",
            "--chunk",
            "4096",
            "--wake-ms",
            "100",
        ]);
        let c = args.into_config();
        assert_eq!(c.listen, "127.0.0.1:9000".parse::<SocketAddr>().unwrap());
        assert_eq!(c.document_root, PathBuf::from("/srv/www"));
        assert_eq!(c.static_segment, "assets");
        assert_eq!(c.chunk_size, 4096);
        assert_eq!(c.wake_interval, Some(Duration::from_millis(100)));
        c.validate().unwrap();
    }

    #[test]
    fn defaults_match_server_defaults() {
        let c = Args::parse_from(["fsrv-httpd"]).into_config();
        let d = ServerConfig::default();
        assert_eq!(c.listen, d.listen);
        assert_eq!(c.chunk_size, d.chunk_size);
        assert_eq!(c.max_conns, d.max_conns);
        assert_eq!(c.ring_entries, d.ring_entries);
        assert_eq!(c.wake_interval, None);
    }
}
