//! Connection state.
//!
//! ```text
//!  AwaitingRequest ──recv > 0──► DataReceived ──response attempted──► DataSent ──► Closed
//!         │                            │                                              ▲
//!         └────────── recv ≤ 0 / any error ───────────────────────────────────────────┘
//! ```
//!
//! Transitions only move right. There is no path back to
//! `AwaitingRequest`: a connection serves exactly one request.

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ConnState {
    /// Registered for read-readiness, nothing received yet.
    AwaitingRequest = 0,
    /// Request received, status line prepared.
    DataReceived = 1,
    /// Response (status line and any body) attempted.
    DataSent = 2,
    /// Descriptors released.
    Closed = 3,
}

impl ConnState {
    /// Move to `next` if it lies strictly ahead. Returns whether it moved.
    #[inline]
    pub fn advance(&mut self, next: ConnState) -> bool {
        if next > *self {
            *self = next;
            true
        } else {
            false
        }
    }

    pub fn is_closed(self) -> bool {
        self == ConnState::Closed
    }
}

impl Default for ConnState {
    fn default() -> Self {
        ConnState::AwaitingRequest
    }
}

/// The states a connection passed through, in order.
///
/// Monotonic transitions mean at most four entries, so this is a fixed array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTrail {
    states: [ConnState; 4],
    len: usize,
}

impl StateTrail {
    pub fn new() -> Self {
        Self { states: [ConnState::AwaitingRequest; 4], len: 1 }
    }

    pub fn push(&mut self, state: ConnState) {
        if self.len < self.states.len() {
            self.states[self.len] = state;
            self.len += 1;
        }
    }

    pub fn as_slice(&self) -> &[ConnState] {
        &self.states[..self.len]
    }

    /// True if the trail is a strictly increasing run starting at `AwaitingRequest`.
    pub fn is_monotonic(&self) -> bool {
        let s = self.as_slice();
        s.first() == Some(&ConnState::AwaitingRequest) && s.windows(2).all(|w| w[0] < w[1])
    }
}

impl Default for StateTrail {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_moves_forward_only() {
        let mut s = ConnState::default();
        assert!(s.advance(ConnState::DataReceived));
        assert!(!s.advance(ConnState::AwaitingRequest));
        assert!(!s.advance(ConnState::DataReceived));
        assert_eq!(s, ConnState::DataReceived);
        assert!(s.advance(ConnState::Closed));
        assert!(s.is_closed());
        assert!(!s.advance(ConnState::DataSent));
    }

    #[test]
    fn skipping_states_is_allowed() {
        let mut s = ConnState::AwaitingRequest;
        assert!(s.advance(ConnState::Closed));
    }

    #[test]
    fn trail_records_full_cycle() {
        let mut t = StateTrail::new();
        t.push(ConnState::DataReceived);
        t.push(ConnState::DataSent);
        t.push(ConnState::Closed);
        assert_eq!(
            t.as_slice(),
            &[
                ConnState::AwaitingRequest,
                ConnState::DataReceived,
                ConnState::DataSent,
                ConnState::Closed
            ]
        );
        assert!(t.is_monotonic());
        t.push(ConnState::Closed);
        assert_eq!(t.as_slice().len(), 4);
    }

    #[test]
    fn early_close_trail_is_a_prefix() {
        let mut t = StateTrail::new();
        t.push(ConnState::Closed);
        assert!(t.is_monotonic());
    }
}
