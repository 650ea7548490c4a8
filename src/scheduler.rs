//! Periodic neighbor scheduling.
//!
//! Two independent timers decide which neighbors may download from us:
//!
//! - every `UnchokingInterval` the preferred neighbors are re-evaluated
//!   (by download rate, or at random once we have the whole file);
//! - every `OptimisticUnchokingInterval` one choked but interested
//!   neighbor is unchoked at random.
//!
//! Both work on a snapshot of the [`SessionRegistry`] and only ever flip
//! our own choking flag on a session.

use crate::peer::{ChokingAlgorithm, PeerError, PeerId, PeerStats, SessionRegistry};
use crate::storage::PieceStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

pub struct NeighborScheduler {
    local_id: PeerId,
    registry: Arc<SessionRegistry>,
    store: Arc<PieceStore>,
    algorithm: ChokingAlgorithm,
    unchoking_interval: Duration,
    optimistic_interval: Duration,
}

impl NeighborScheduler {
    pub fn new(
        local_id: PeerId,
        registry: Arc<SessionRegistry>,
        store: Arc<PieceStore>,
        preferred_neighbors: usize,
        unchoking_interval: Duration,
        optimistic_interval: Duration,
    ) -> Self {
        Self {
            local_id,
            registry,
            store,
            algorithm: ChokingAlgorithm::new(preferred_neighbors),
            unchoking_interval,
            optimistic_interval,
        }
    }

    /// Re-selects preferred neighbors and sends the resulting chokes and
    /// unchokes. Returns the preferred set.
    pub fn evaluate_preferred(&self) -> Vec<PeerId> {
        let sessions = self.registry.snapshot();
        let stats: Vec<_> = sessions.iter().map(|s| s.take_stats()).collect();
        let decisions = self
            .algorithm
            .compute_unchoke_decisions(&stats, self.store.is_complete());

        for session in &sessions {
            let neighbor = session.neighbor();
            let result = if decisions.unchoke.contains(&neighbor) {
                session.unchoke()
            } else if decisions.choke.contains(&neighbor) {
                session.choke()
            } else {
                Ok(false)
            };
            log_send_failure(neighbor, result);
        }

        if !decisions.preferred.is_empty() {
            info!(
                "Peer {} has the preferred neighbors {}",
                self.local_id,
                join_ids(&decisions.preferred)
            );
        }

        decisions.preferred
    }

    /// Unchokes one random choked and interested neighbor.
    pub fn optimistic_unchoke(&self) -> Option<PeerId> {
        let sessions = self.registry.snapshot();
        let stats: Vec<_> = sessions
            .iter()
            .map(|s| {
                let choking = s.choking();
                PeerStats {
                    peer: s.neighbor(),
                    downloaded: 0,
                    interested: choking.peer_interested,
                    we_choking: choking.am_choking,
                }
            })
            .collect();

        let chosen = self.algorithm.select_optimistic(&stats)?;
        let session = self.registry.get(chosen)?;
        log_send_failure(chosen, session.unchoke());

        info!(
            "Peer {} has the optimistically unchoked neighbor {}",
            self.local_id, chosen
        );
        Some(chosen)
    }

    /// Runs preferred-neighbor evaluation forever.
    pub async fn run_preferred(self: Arc<Self>) {
        let mut ticker = interval_at(
            Instant::now() + self.unchoking_interval,
            self.unchoking_interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.evaluate_preferred();
        }
    }

    /// Runs optimistic unchoking forever.
    pub async fn run_optimistic(self: Arc<Self>) {
        let mut ticker = interval_at(
            Instant::now() + self.optimistic_interval,
            self.optimistic_interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.optimistic_unchoke();
        }
    }
}

fn log_send_failure(neighbor: PeerId, result: Result<bool, PeerError>) {
    if let Err(e) = result {
        debug!("Could not update choke state of peer {}: {}", neighbor, e);
    }
}

fn join_ids(ids: &[PeerId]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",")
}
