//! Descriptor and operation tags.
//!
//! A `Token` is what the readiness multiplexer hands back for a ready
//! descriptor (stored in `epoll_event.u64`). An `OpId` is what the async
//! backend hands back for a finished operation (stored in io_uring's
//! `user_data`). Both are plain `u64`s so neither side needs a lookup table.

/// Registration tag for a descriptor in the poller.
///
/// Layout for connections: `[unused:8][generation:24][slot:32]`.
/// The two reserved values at the top of the range tag the listening
/// socket and the async backend's completion handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Token(pub u64);

const SLOT_MASK: u64 = 0xFFFF_FFFF;
const GEN_BITS: u32 = 24;
const GEN_MASK: u32 = (1 << GEN_BITS) - 1;
const TOKEN_MASK: u64 = (1 << 56) - 1;

impl Token {
    pub const LISTENER: Self = Self(u64::MAX);
    pub const COMPLETION: Self = Self(u64::MAX - 1);

    /// Token for a connection living in registry slot `slot`.
    ///
    /// `generation` is truncated to 24 bits; it only has to differ
    /// between consecutive occupants of the same slot.
    #[inline]
    pub fn connection(slot: u32, generation: u32) -> Self {
        Self(((generation & GEN_MASK) as u64) << 32 | slot as u64)
    }

    #[inline]
    pub fn slot(self) -> usize {
        (self.0 & SLOT_MASK) as usize
    }

    #[inline]
    pub fn generation(self) -> u32 {
        ((self.0 >> 32) as u32) & GEN_MASK
    }

    #[inline]
    pub fn is_connection(self) -> bool {
        self.0 & !TOKEN_MASK == 0
    }
}

/// Kind of async operation, stored in the top byte of an `OpId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpKind {
    /// Disk read of one chunk into a staging buffer.
    Read = 1,
    /// Socket send of a staging buffer.
    Send = 2,
    /// Writability poll linked in front of a retried send.
    Poll = 3,
    /// Cancellation request for another operation of the same connection.
    Cancel = 4,
}

impl OpKind {
    fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(Self::Read),
            2 => Some(Self::Send),
            3 => Some(Self::Poll),
            4 => Some(Self::Cancel),
            _ => None,
        }
    }
}

/// Correlation tag for one async operation.
///
/// Layout: `[op:8][connection token:56]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct OpId(pub u64);

impl OpId {
    #[inline]
    pub fn new(kind: OpKind, token: Token) -> Self {
        Self((kind as u64) << 56 | (token.0 & TOKEN_MASK))
    }

    #[inline]
    pub fn kind(self) -> Option<OpKind> {
        OpKind::from_u8((self.0 >> 56) as u8)
    }

    #[inline]
    pub fn token(self) -> Token {
        Token(self.0 & TOKEN_MASK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_token_roundtrips_slot_and_generation() {
        let t = Token::connection(17, 3);
        assert_eq!(t.slot(), 17);
        assert_eq!(t.generation(), 3);
        assert!(t.is_connection());
    }

    #[test]
    fn reserved_tokens_are_not_connections() {
        assert!(!Token::LISTENER.is_connection());
        assert!(!Token::COMPLETION.is_connection());
        assert_ne!(Token::LISTENER, Token::COMPLETION);
    }

    #[test]
    fn generation_wraps_at_24_bits() {
        let t = Token::connection(0, (1 << 24) + 5);
        assert_eq!(t.generation(), 5);
    }

    #[test]
    fn op_id_carries_kind_and_token() {
        let token = Token::connection(9, 0xABCDEF);
        for kind in [OpKind::Read, OpKind::Send, OpKind::Poll, OpKind::Cancel] {
            let id = OpId::new(kind, token);
            assert_eq!(id.kind(), Some(kind));
            assert_eq!(id.token(), token);
        }
        assert_eq!(OpId(0).kind(), None);
    }
}
