use super::peer_id::PeerId;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Claim {
    neighbor: PeerId,
    token: u64,
}

/// Swarm-wide table of pieces that have an outstanding request.
///
/// A piece is requested from at most one neighbor at a time. Claiming is
/// atomic, so two sessions selecting concurrently cannot both win the same
/// piece. Each claim carries a token; releasing with a stale token is a
/// no-op, which lets an expiry timer and a piece arrival race safely.
#[derive(Debug, Default)]
pub struct RequestTracker {
    claims: DashMap<u32, Claim>,
    next_token: AtomicU64,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `piece` for `neighbor`, returning the claim token.
    ///
    /// Returns `None` if another request for the piece is outstanding.
    pub fn try_claim(&self, piece: u32, neighbor: PeerId) -> Option<u64> {
        match self.claims.entry(piece) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let token = self.next_token.fetch_add(1, Ordering::Relaxed);
                slot.insert(Claim { neighbor, token });
                Some(token)
            }
        }
    }

    /// Releases the claim on `piece` if it still carries `token`.
    pub fn release(&self, piece: u32, token: u64) -> bool {
        self.claims
            .remove_if(&piece, |_, claim| claim.token == token)
            .is_some()
    }

    pub fn is_claimed(&self, piece: u32) -> bool {
        self.claims.contains_key(&piece)
    }

    /// Returns the neighbor currently holding the claim on `piece`.
    pub fn claimed_by(&self, piece: u32) -> Option<PeerId> {
        self.claims.get(&piece).map(|claim| claim.neighbor)
    }

    pub fn len(&self) -> usize {
        self.claims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }
}
