//! In-kernel file-to-socket copy.
//!
//! One call of the platform primitive. Looping until the whole file is
//! out is the caller's business (see the executor's zero-copy transfer),
//! because a non-blocking socket can stop accepting bytes at any point.

use std::io;
use std::os::fd::BorrowedFd;

/// Largest count handed to one `sendfile` call (Linux caps a single call
/// at `0x7ffff000` bytes anyway).
pub const MAX_SENDFILE_COUNT: usize = 0x7fff_f000;

cfg_if::cfg_if! {
    if #[cfg(any(target_os = "linux", target_os = "android"))] {
        /// Copy up to `count` bytes from `file` at `*offset` to `socket`.
        ///
        /// Advances `*offset` by the number of bytes copied and returns it.
        /// `Ok(0)` means the file has no bytes at `*offset`.
        pub fn send_file(
            socket: BorrowedFd<'_>,
            file: BorrowedFd<'_>,
            offset: &mut libc::off_t,
            count: usize,
        ) -> io::Result<usize> {
            nix::sys::sendfile::sendfile(socket, file, Some(offset), count.min(MAX_SENDFILE_COUNT))
                .map_err(io::Error::from)
        }
    } else {
        pub fn send_file(
            _socket: BorrowedFd<'_>,
            _file: BorrowedFd<'_>,
            _offset: &mut libc::off_t,
            _count: usize,
        ) -> io::Result<usize> {
            Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "zero-copy transfer needs Linux sendfile",
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::os::fd::AsFd;
    use std::os::unix::net::UnixStream;

    #[test]
    fn copies_file_bytes_and_advances_offset() {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(b"hello zero copy").unwrap();

        let (tx, mut rx) = UnixStream::pair().unwrap();
        let mut offset: libc::off_t = 0;
        let n = send_file(tx.as_fd(), file.as_fd(), &mut offset, 15).unwrap();
        assert_eq!(n, 15);
        assert_eq!(offset, 15);
        drop(tx);

        let mut got = Vec::new();
        rx.read_to_end(&mut got).unwrap();
        assert_eq!(got, b"hello zero copy");
    }

    #[test]
    fn offset_past_end_copies_nothing() {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(b"abc").unwrap();
        let (tx, _rx) = UnixStream::pair().unwrap();
        let mut offset: libc::off_t = 3;
        assert_eq!(send_file(tx.as_fd(), file.as_fd(), &mut offset, 10).unwrap(), 0);
    }
}
