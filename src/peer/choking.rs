use super::peer_id::PeerId;
use rand::seq::SliceRandom;
use rand::Rng as _;

/// The four choke/interest flags of one connection.
///
/// `am_*` flags describe what we do to the neighbor, `peer_*` flags what the
/// neighbor does to us. The scheduler only ever flips `am_choking`;
/// `peer_choking` changes only when the neighbor sends choke or unchoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChokingState {
    pub am_choking: bool,
    pub am_interested: bool,
    pub peer_choking: bool,
    pub peer_interested: bool,
}

impl Default for ChokingState {
    fn default() -> Self {
        Self {
            am_choking: true,
            am_interested: false,
            peer_choking: true,
            peer_interested: false,
        }
    }
}

/// A neighbor considered by one scheduling round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerStats {
    pub peer: PeerId,
    /// Bytes received from this neighbor during the previous interval.
    pub downloaded: u64,
    pub interested: bool,
    pub we_choking: bool,
}

/// Preferred-neighbor and optimistic-unchoke selection.
///
/// The algorithm is pure: it looks at a snapshot of [`PeerStats`] and
/// returns decisions; sending choke and unchoke messages is left to the
/// caller.
#[derive(Debug, Clone)]
pub struct ChokingAlgorithm {
    max_preferred: usize,
}

/// Outcome of a preferred-neighbor evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnchokeDecisions {
    /// Every neighbor selected as preferred this round.
    pub preferred: Vec<PeerId>,
    /// Preferred neighbors that are currently choked.
    pub unchoke: Vec<PeerId>,
    /// Interested, non-preferred neighbors that are currently unchoked.
    pub choke: Vec<PeerId>,
}

impl ChokingAlgorithm {
    pub fn new(max_preferred: usize) -> Self {
        Self { max_preferred }
    }

    pub fn max_preferred(&self) -> usize {
        self.max_preferred
    }

    /// Picks up to `max_preferred` interested neighbors.
    ///
    /// A seed picks uniformly at random. A downloader ranks by bytes
    /// received in the previous interval; candidates are shuffled before the
    /// stable sort so equal rates come out in no particular order.
    /// Neighbors that are not interested never appear in any list.
    pub fn compute_unchoke_decisions(&self, peers: &[PeerStats], is_seed: bool) -> UnchokeDecisions {
        let mut candidates: Vec<&PeerStats> = peers.iter().filter(|p| p.interested).collect();
        candidates.shuffle(&mut rand::rng());

        if !is_seed {
            candidates.sort_by(|a, b| b.downloaded.cmp(&a.downloaded));
        }

        let preferred: Vec<PeerId> = candidates
            .iter()
            .take(self.max_preferred)
            .map(|p| p.peer)
            .collect();

        let mut decisions = UnchokeDecisions {
            preferred,
            ..Default::default()
        };

        for stats in &candidates {
            let chosen = decisions.preferred.contains(&stats.peer);
            if chosen && stats.we_choking {
                decisions.unchoke.push(stats.peer);
            } else if !chosen && !stats.we_choking {
                decisions.choke.push(stats.peer);
            }
        }

        decisions
    }

    /// Picks one neighbor among those that are choked and interested.
    pub fn select_optimistic(&self, peers: &[PeerStats]) -> Option<PeerId> {
        let choked_interested: Vec<_> = peers
            .iter()
            .filter(|p| p.interested && p.we_choking)
            .map(|p| p.peer)
            .collect();

        if choked_interested.is_empty() {
            return None;
        }

        let idx = rand::rng().random_range(0..choked_interested.len());
        Some(choked_interested[idx])
    }
}
