//! Connection slab.
//!
//! Fixed number of slots, a free list, and a generation per slot. The
//! generation goes into the token, so a notification for a connection
//! that has already been torn down can't reach the slot's next occupant.

use crate::connection::Connection;

use fsrv_core::error::{Result, ServeError};
use fsrv_core::token::Token;

struct Slot {
    generation: u32,
    conn: Option<Connection>,
}

pub struct Registry {
    slots: Vec<Slot>,
    free: Vec<usize>,
    live: usize,
}

impl Registry {
    pub fn new(max: usize) -> Self {
        Self {
            slots: (0..max).map(|_| Slot { generation: 0, conn: None }).collect(),
            free: (0..max).rev().collect(),
            live: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn is_full(&self) -> bool {
        self.free.is_empty()
    }

    /// Take a free slot and fill it with `build(token)`.
    pub fn insert_with<F>(&mut self, build: F) -> Result<Token>
    where
        F: FnOnce(Token) -> Connection,
    {
        let idx = self
            .free
            .pop()
            .ok_or(ServeError::RegistryFull(self.slots.len()))?;
        let slot = &mut self.slots[idx];
        let token = Token::connection(idx as u32, slot.generation);
        slot.conn = Some(build(token));
        self.live += 1;
        Ok(token)
    }

    fn slot_of(&self, token: Token) -> Option<usize> {
        if !token.is_connection() {
            return None;
        }
        let idx = token.slot();
        let slot = self.slots.get(idx)?;
        (slot.generation == token.generation() && slot.conn.is_some()).then_some(idx)
    }

    pub fn get_mut(&mut self, token: Token) -> Option<&mut Connection> {
        let idx = self.slot_of(token)?;
        self.slots[idx].conn.as_mut()
    }

    /// Take the connection out and free its slot. A second call for the
    /// same token finds nothing.
    pub fn remove(&mut self, token: Token) -> Option<Connection> {
        let idx = self.slot_of(token)?;
        let slot = &mut self.slots[idx];
        let conn = slot.conn.take()?;
        slot.generation = Token::connection(0, slot.generation.wrapping_add(1)).generation();
        self.free.push(idx);
        self.live -= 1;
        Some(conn)
    }

    /// Tokens of every live connection.
    pub fn tokens(&self) -> Vec<Token> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.conn.is_some())
            .map(|(i, s)| Token::connection(i as u32, s.generation))
            .collect()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Connection> {
        self.slots.iter_mut().filter_map(|s| s.conn.as_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::fd::OwnedFd;
    use std::os::unix::net::UnixStream;

    fn insert(reg: &mut Registry) -> Result<(Token, UnixStream)> {
        let (a, b) = UnixStream::pair().unwrap();
        let token = reg.insert_with(|t| {
            Connection::new(t, OwnedFd::from(a), "127.0.0.1:1".parse().unwrap())
        })?;
        Ok((token, b))
    }

    #[test]
    fn insert_and_lookup() {
        let mut reg = Registry::new(4);
        let (t, _p) = insert(&mut reg).unwrap();
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.get_mut(t).unwrap().token, t);
        assert_eq!(reg.tokens(), vec![t]);
    }

    #[test]
    fn remove_is_idempotent() {
        let mut reg = Registry::new(2);
        let (t, _p) = insert(&mut reg).unwrap();
        assert!(reg.remove(t).is_some());
        assert!(reg.remove(t).is_none());
        assert!(reg.is_empty());
    }

    #[test]
    fn reused_slot_rejects_stale_token() {
        let mut reg = Registry::new(1);
        let (old, _p1) = insert(&mut reg).unwrap();
        reg.remove(old);
        let (new, _p2) = insert(&mut reg).unwrap();
        assert_eq!(old.slot(), new.slot());
        assert_ne!(old, new);
        assert!(reg.get_mut(old).is_none());
        assert!(reg.remove(old).is_none());
        assert!(reg.get_mut(new).is_some());
    }

    #[test]
    fn full_registry_refuses() {
        let mut reg = Registry::new(1);
        let (_t, _p) = insert(&mut reg).unwrap();
        assert!(reg.is_full());
        assert!(matches!(insert(&mut reg), Err(ServeError::RegistryFull(1))));
    }

    #[test]
    fn reserved_tokens_never_match() {
        let mut reg = Registry::new(1);
        let _ = insert(&mut reg).unwrap();
        assert!(reg.get_mut(Token::LISTENER).is_none());
        assert!(reg.get_mut(Token::COMPLETION).is_none());
    }
}
