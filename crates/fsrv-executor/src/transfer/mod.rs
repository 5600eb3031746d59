//! File body transfers.
//!
//! A connection whose status line went out with a file attached gets one
//! of these, chosen by `TransferKind::classify` on its request path.
//! The transfer lives on the connection until it finishes or fails;
//! dropping it releases everything it holds.

pub mod staged;
pub mod zero_copy;

pub use staged::{StagedTransfer, Step};
pub use zero_copy::{Progress, ZeroCopyTransfer};

pub enum Transfer {
    /// Parked on a full socket; resumed on write-readiness.
    ZeroCopy(ZeroCopyTransfer),
    /// Waiting on an async read or send completion.
    Staged(StagedTransfer),
}

