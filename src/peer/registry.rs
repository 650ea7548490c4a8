use super::message::Message;
use super::peer_id::PeerId;
use super::request::RequestTracker;
use super::session::Session;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// The set of currently connected neighbors.
///
/// Sessions are inserted when a handshake completes and removed when their
/// connection closes. Iteration always works on a snapshot of `Arc`s so no
/// map shard stays locked while callers touch session state.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<PeerId, Arc<Session>>,
    requests: RequestTracker,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a session; returns false if the neighbor is already
    /// connected.
    pub fn insert(&self, session: Arc<Session>) -> bool {
        match self.sessions.entry(session.neighbor()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(session);
                true
            }
        }
    }

    /// Removes a session and releases the pieces it had claimed.
    pub fn remove(&self, neighbor: PeerId) -> Option<Arc<Session>> {
        let (_, session) = self.sessions.remove(&neighbor)?;
        for (piece, token) in session.abandon_requests() {
            self.requests.release(piece, token);
        }
        Some(session)
    }

    pub fn get(&self, neighbor: PeerId) -> Option<Arc<Session>> {
        self.sessions.get(&neighbor).map(|s| Arc::clone(s.value()))
    }

    pub fn contains(&self, neighbor: PeerId) -> bool {
        self.sessions.contains_key(&neighbor)
    }

    pub fn snapshot(&self) -> Vec<Arc<Session>> {
        self.sessions.iter().map(|s| Arc::clone(s.value())).collect()
    }

    pub fn neighbors(&self) -> Vec<PeerId> {
        let mut ids: Vec<PeerId> = self.sessions.iter().map(|s| *s.key()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn requests(&self) -> &RequestTracker {
        &self.requests
    }

    /// Queues `message` on every session. Closed sessions are skipped.
    pub fn broadcast(&self, message: &Message) -> usize {
        let mut sent = 0;
        for session in self.snapshot() {
            match session.send(message.clone()) {
                Ok(()) => sent += 1,
                Err(e) => debug!("Skipping broadcast to peer {}: {}", session.neighbor(), e),
            }
        }
        sent
    }
}
