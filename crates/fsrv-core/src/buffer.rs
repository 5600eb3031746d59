//! Buffer types.
//!
//! Two kinds of memory hang off a connection:
//!
//! - `FixedBuf<N>`: the receive and send buffers. Fixed capacity, never
//!   grows; running out of room is reported as `Fill::Truncated`.
//! - `StagingBuf`: the chunk buffer of a staged transfer, handed out by a
//!   `BufferProvider`. Dropping it returns it to the provider's accounting.

use std::cell::Cell;
use std::rc::Rc;

/// How a buffer fill went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fill {
    /// All bytes fit.
    Complete(usize),
    /// The buffer is full; more bytes may have been available or were dropped.
    Truncated(usize),
}

impl Fill {
    pub fn len(self) -> usize {
        match self {
            Fill::Complete(n) | Fill::Truncated(n) => n,
        }
    }

    pub fn is_truncated(self) -> bool {
        matches!(self, Fill::Truncated(_))
    }
}

/// Fixed-capacity byte buffer, zeroed on creation.
pub struct FixedBuf<const N: usize> {
    data: Box<[u8; N]>,
    len: usize,
}

impl<const N: usize> FixedBuf<N> {
    pub fn new() -> Self {
        Self { data: Box::new([0u8; N]), len: 0 }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The filled part.
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// The whole region, for a single read into it.
    pub fn spare_mut(&mut self) -> &mut [u8] {
        &mut self.data[..]
    }

    /// Record that a read wrote `n` bytes into `spare_mut()`.
    ///
    /// A read that filled every byte is `Truncated`: the peer may have
    /// sent more than fits, and nothing reassembles the rest.
    pub fn commit(&mut self, n: usize) -> Fill {
        self.len = n.min(N);
        if self.len == N {
            Fill::Truncated(N)
        } else {
            Fill::Complete(self.len)
        }
    }

    /// Replace the contents with `bytes`, keeping at most `N` of them.
    pub fn fill_from(&mut self, bytes: &[u8]) -> Fill {
        let n = bytes.len().min(N);
        self.data[..n].copy_from_slice(&bytes[..n]);
        self.len = n;
        if bytes.len() > N {
            Fill::Truncated(n)
        } else {
            Fill::Complete(n)
        }
    }

    pub fn clear(&mut self) {
        self.data.fill(0);
        self.len = 0;
    }
}

impl<const N: usize> Default for FixedBuf<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// A staging buffer on loan from a `BufferProvider`.
///
/// The live counter is shared with the provider and decremented on drop,
/// so `BufferProvider::in_use()` is exact on every exit path.
pub struct StagingBuf {
    data: Box<[u8]>,
    live: Rc<Cell<usize>>,
}

impl StagingBuf {
    /// Wrap `data` and count it against `live`.
    pub fn new(data: Box<[u8]>, live: Rc<Cell<usize>>) -> Self {
        live.set(live.get() + 1);
        Self { data, live }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.data.as_ptr()
    }

    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.data.as_mut_ptr()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

impl Drop for StagingBuf {
    fn drop(&mut self) {
        self.live.set(self.live.get().saturating_sub(1));
    }
}

/// Hands out staging buffers.
///
/// **Contract:**
/// - `acquire()` returns a buffer of exactly `len` bytes, or `None` if
///   the provider is exhausted.
/// - `in_use()` counts buffers acquired and not yet dropped.
pub trait BufferProvider {
    fn acquire(&self, len: usize) -> Option<StagingBuf>;

    fn in_use(&self) -> usize;

    /// Total buffers ever handed out (diagnostics).
    fn total(&self) -> usize;
}
