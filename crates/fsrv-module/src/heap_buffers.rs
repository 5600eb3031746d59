//! `HeapBuffers` — default `BufferProvider` implementation.
//!
//! Each staging buffer is a plain boxed slice. No pre-registration, no
//! page pinning. The provider only keeps counters: how many buffers are
//! live right now and how many were ever handed out. An optional cap
//! bounds the live count.

use fsrv_core::buffer::{BufferProvider, StagingBuf};

use std::cell::Cell;
use std::rc::Rc;

pub struct HeapBuffers {
    /// Buffers currently on loan; shared with every `StagingBuf`.
    live: Rc<Cell<usize>>,
    /// Total handed out (diagnostics).
    total: Cell<usize>,
    /// Upper bound on `live`; `None` means unbounded.
    limit: Option<usize>,
}

impl HeapBuffers {
    pub fn new() -> Self {
        Self {
            live: Rc::new(Cell::new(0)),
            total: Cell::new(0),
            limit: None,
        }
    }

    /// Provider that refuses to have more than `limit` buffers live.
    pub fn with_limit(limit: usize) -> Self {
        Self { limit: Some(limit), ..Self::new() }
    }
}

impl Default for HeapBuffers {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferProvider for HeapBuffers {
    fn acquire(&self, len: usize) -> Option<StagingBuf> {
        if let Some(limit) = self.limit {
            if self.live.get() >= limit {
                return None;
            }
        }
        self.total.set(self.total.get() + 1);
        Some(StagingBuf::new(
            vec![0u8; len].into_boxed_slice(),
            self.live.clone(),
        ))
    }

    fn in_use(&self) -> usize {
        self.live.get()
    }

    fn total(&self) -> usize {
        self.total.get()
    }
}
