//! The set of live sessions and call-number allocation.

use std::collections::BTreeMap;
use std::net::SocketAddr;

use tracing::trace;

use crate::core::{EngineError, EngineResult, MAX_CALL_NUMBER};
use crate::event::CallNumber;

use super::session::Session;

/// Counter producing values in `1..=MAX_CALL_NUMBER`, wrapping back to 1.
#[derive(Debug, Clone)]
pub struct WrappingCounter {
    next: u16,
}

impl WrappingCounter {
    /// Start at `first` (clamped into range).
    pub fn starting_at(first: u16) -> Self {
        Self {
            next: first.clamp(1, MAX_CALL_NUMBER),
        }
    }

    /// Start at a random value.
    pub fn random() -> Self {
        use rand::Rng;
        Self::starting_at(rand::thread_rng().gen_range(1..=MAX_CALL_NUMBER))
    }

    /// Take the next value.
    pub fn advance(&mut self) -> u16 {
        let value = self.next;
        self.next = if value >= MAX_CALL_NUMBER { 1 } else { value + 1 };
        value
    }
}

/// Live sessions keyed by local call number.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: BTreeMap<CallNumber, Session>,
    counter: WrappingCounter,
}

impl SessionRegistry {
    /// Empty registry allocating from `counter`.
    pub fn new(counter: WrappingCounter) -> Self {
        Self {
            sessions: BTreeMap::new(),
            counter,
        }
    }

    /// Allocate a call number not held by any live session.
    pub fn allocate(&mut self) -> EngineResult<CallNumber> {
        for _ in 0..MAX_CALL_NUMBER {
            let candidate = CallNumber(self.counter.advance());
            if !self.sessions.contains_key(&candidate) {
                return Ok(candidate);
            }
        }
        Err(EngineError::CallNumbersExhausted)
    }

    /// Register a session under its call number.
    pub fn insert(&mut self, session: Session) {
        self.sessions.insert(session.call_number, session);
    }

    /// Remove a session.
    pub fn remove(&mut self, call: CallNumber) -> Option<Session> {
        self.sessions.remove(&call)
    }

    /// Look up a session.
    pub fn get(&self, call: CallNumber) -> Option<&Session> {
        self.sessions.get(&call)
    }

    /// Look up a session mutably.
    pub fn get_mut(&mut self, call: CallNumber) -> Option<&mut Session> {
        self.sessions.get_mut(&call)
    }

    /// Look up a session or fail with [`EngineError::UnknownSession`].
    pub fn require(&mut self, call: CallNumber) -> EngineResult<&mut Session> {
        self.sessions
            .get_mut(&call)
            .ok_or(EngineError::UnknownSession(call.0))
    }

    /// Whether a session is live.
    pub fn contains(&self, call: CallNumber) -> bool {
        self.sessions.contains_key(&call)
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is live.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Snapshot of live call numbers.
    pub fn call_numbers(&self) -> Vec<CallNumber> {
        self.sessions.keys().copied().collect()
    }

    /// Iterate over sessions.
    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    /// Match an inbound packet to a session.
    ///
    /// The first pass matches on our call number, either through an
    /// in-flight transfer address or the primary peer address. On the
    /// primary path the source call number must be the peer's, or the
    /// peer's must still be unknown, in which case it is learned. The
    /// second pass matches on the peer's call number alone (mini frames
    /// carry no destination).
    pub fn find(&mut self, from: SocketAddr, source_call: u16, dest_call: u16) -> Option<CallNumber> {
        for session in self.sessions.values_mut() {
            let ours = dest_call == session.call_number.0;
            if ours && session.transfer.is_active() && session.transfer.address == Some(from) {
                return Some(session.call_number);
            }
            let peer_known = session.peer_call_number != 0;
            if ours
                && dest_call != 0
                && session.peer_addr == Some(from)
                && (!peer_known || session.peer_call_number == source_call)
            {
                if !peer_known {
                    trace!(call = %session.call_number, peer = source_call, "learned peer call number");
                    session.peer_call_number = source_call;
                }
                return Some(session.call_number);
            }
        }

        self.sessions
            .values()
            .find(|session| {
                session.peer_call_number == source_call
                    && ((session.transfer.is_active() && session.transfer.address == Some(from))
                        || session.peer_addr == Some(from))
            })
            .map(|session| session.call_number)
    }

    /// Match a transfer probe (TXCNT) arriving from a not-yet-known
    /// address, and record that address as the transfer target.
    pub fn find_transfer_probe(
        &mut self,
        from: SocketAddr,
        source_call: u16,
        dest_call: u16,
        transfer_id: u32,
    ) -> Option<CallNumber> {
        let session = self.sessions.values_mut().find(|session| {
            session.transfer.is_active()
                && session.transfer.id == transfer_id
                && session.call_number.0 == dest_call
                && session.transfer.call_number == source_call
        })?;
        session.transfer.address = Some(from);
        Some(session.call_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jitter::JitterConfig;
    use crate::session::TransferState;

    fn test_addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    fn registry_with(calls: &[u16]) -> SessionRegistry {
        let mut registry = SessionRegistry::new(WrappingCounter::starting_at(1));
        for &call in calls {
            registry.insert(Session::new(CallNumber(call), JitterConfig::default()));
        }
        registry
    }

    #[test]
    fn test_counter_wraps_to_one() {
        let mut counter = WrappingCounter::starting_at(MAX_CALL_NUMBER);
        assert_eq!(counter.advance(), MAX_CALL_NUMBER);
        assert_eq!(counter.advance(), 1);
        assert_eq!(WrappingCounter::starting_at(0).advance(), 1);
    }

    #[test]
    fn test_allocate_skips_live_numbers() {
        let mut registry = registry_with(&[1, 2]);
        assert_eq!(registry.allocate().unwrap(), CallNumber(3));
    }

    #[test]
    fn test_find_learns_peer_call_number() {
        let mut registry = registry_with(&[5]);
        let peer = test_addr(4000);
        registry.get_mut(CallNumber(5)).unwrap().peer_addr = Some(peer);

        assert_eq!(registry.find(peer, 77, 5), Some(CallNumber(5)));
        assert_eq!(registry.get(CallNumber(5)).unwrap().peer_call_number, 77);

        // wrong address
        assert_eq!(registry.find(test_addr(4001), 77, 5), None);
    }

    #[test]
    fn test_find_rejects_stale_peer_call() {
        let mut registry = registry_with(&[5]);
        let peer = test_addr(4000);
        {
            let session = registry.get_mut(CallNumber(5)).unwrap();
            session.peer_addr = Some(peer);
            session.peer_call_number = 77;
        }
        // an earlier call from the same host still addressed to us
        assert_eq!(registry.find(peer, 12, 5), None);
        assert_eq!(registry.get(CallNumber(5)).unwrap().peer_call_number, 77);
        assert_eq!(registry.find(peer, 77, 5), Some(CallNumber(5)));
    }

    #[test]
    fn test_find_mini_frame_by_peer_call() {
        let mut registry = registry_with(&[5]);
        let peer = test_addr(4000);
        {
            let session = registry.get_mut(CallNumber(5)).unwrap();
            session.peer_addr = Some(peer);
            session.peer_call_number = 42;
        }
        assert_eq!(registry.find(peer, 42, 0), Some(CallNumber(5)));
        assert_eq!(registry.find(peer, 43, 0), None);
    }

    #[test]
    fn test_find_via_transfer_address() {
        let mut registry = registry_with(&[9]);
        let target = test_addr(5000);
        {
            let session = registry.get_mut(CallNumber(9)).unwrap();
            session.peer_addr = Some(test_addr(4000));
            session.transfer.address = Some(target);
            session.transfer.state = TransferState::Begin;
        }
        assert_eq!(registry.find(target, 100, 9), Some(CallNumber(9)));

        registry.get_mut(CallNumber(9)).unwrap().transfer.state = TransferState::None;
        assert_eq!(registry.find(target, 100, 9), None);
    }

    #[test]
    fn test_find_transfer_probe() {
        let mut registry = registry_with(&[9]);
        {
            let session = registry.get_mut(CallNumber(9)).unwrap();
            session.transfer.state = TransferState::Begin;
            session.transfer.id = 1234;
            session.transfer.call_number = 300;
        }
        let from = test_addr(6000);
        assert_eq!(registry.find_transfer_probe(from, 300, 9, 999), None);
        assert_eq!(registry.find_transfer_probe(from, 300, 9, 1234), Some(CallNumber(9)));
        assert_eq!(
            registry.get(CallNumber(9)).unwrap().transfer.address,
            Some(from)
        );
    }
}
