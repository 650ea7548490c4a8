use super::bitfield::Bitfield;
use super::choking::{ChokingState, PeerStats};
use super::error::PeerError;
use super::message::Message;
use super::peer_id::PeerId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

struct SessionState {
    bitfield: Bitfield,
    choking: ChokingState,
}

struct PendingRequest {
    token: u64,
    timer: Option<AbortHandle>,
}

/// One established connection to a neighbor.
///
/// A session owns the outbound half of the connection (as a message queue
/// drained by the connection task), the neighbor's bitfield, the
/// choke/interest flags and the requests outstanding with this neighbor.
///
/// Every field is behind a lock or an atomic: the receive loop, the
/// scheduler timers and other sessions' have-broadcasts all touch the same
/// session concurrently. Locks are never held across an `.await`; sends go
/// into an unbounded queue and never block.
pub struct Session {
    neighbor: PeerId,
    outbound: mpsc::UnboundedSender<Message>,
    state: Mutex<SessionState>,
    pending: Mutex<HashMap<u32, PendingRequest>>,
    interval_downloaded: AtomicU64,
    bytes_downloaded: AtomicU64,
    bytes_uploaded: AtomicU64,
}

impl Session {
    pub fn new(
        neighbor: PeerId,
        piece_count: usize,
        outbound: mpsc::UnboundedSender<Message>,
    ) -> Self {
        Self {
            neighbor,
            outbound,
            state: Mutex::new(SessionState {
                bitfield: Bitfield::new(piece_count),
                choking: ChokingState::default(),
            }),
            pending: Mutex::new(HashMap::new()),
            interval_downloaded: AtomicU64::new(0),
            bytes_downloaded: AtomicU64::new(0),
            bytes_uploaded: AtomicU64::new(0),
        }
    }

    pub fn neighbor(&self) -> PeerId {
        self.neighbor
    }

    /// Queues a message for the neighbor.
    ///
    /// Fails with [`PeerError::ConnectionClosed`] once the connection task
    /// has stopped draining the queue.
    pub fn send(&self, message: Message) -> Result<(), PeerError> {
        let uploaded = match &message {
            Message::Piece { data, .. } => data.len() as u64,
            _ => 0,
        };

        self.outbound
            .send(message)
            .map_err(|_| PeerError::ConnectionClosed)?;

        self.bytes_uploaded.fetch_add(uploaded, Ordering::Relaxed);
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }

    /// Returns a snapshot of the neighbor's bitfield.
    pub fn bitfield(&self) -> Bitfield {
        self.state.lock().bitfield.clone()
    }

    pub fn has_piece(&self, index: usize) -> bool {
        self.state.lock().bitfield.has_piece(index)
    }

    pub fn merge_bitfield(&self, other: &Bitfield) {
        self.state.lock().bitfield.merge(other);
    }

    /// Records a have announcement; returns whether the bit was new.
    pub fn mark_have(&self, index: usize) -> bool {
        self.state.lock().bitfield.set_piece(index)
    }

    pub fn has_all_pieces(&self) -> bool {
        self.state.lock().bitfield.is_complete()
    }

    /// Returns true if the neighbor has a piece that `ours` lacks.
    pub fn has_pieces_missing_from(&self, ours: &Bitfield) -> bool {
        self.state.lock().bitfield.has_any_missing_from(ours)
    }

    pub fn choking(&self) -> ChokingState {
        self.state.lock().choking
    }

    /// Whether we are choking the neighbor.
    pub fn am_choking(&self) -> bool {
        self.state.lock().choking.am_choking
    }

    /// Whether the neighbor is choking us.
    pub fn peer_choking(&self) -> bool {
        self.state.lock().choking.peer_choking
    }

    pub fn peer_interested(&self) -> bool {
        self.state.lock().choking.peer_interested
    }

    pub fn set_peer_choking(&self, choking: bool) {
        self.state.lock().choking.peer_choking = choking;
    }

    pub fn set_peer_interested(&self, interested: bool) {
        self.state.lock().choking.peer_interested = interested;
    }

    /// Records our interest and tells the neighbor.
    pub fn set_interested(&self, interested: bool) -> Result<(), PeerError> {
        let mut state = self.state.lock();
        state.choking.am_interested = interested;
        self.send(if interested {
            Message::Interested
        } else {
            Message::NotInterested
        })
    }

    /// Chokes the neighbor if it is currently unchoked.
    ///
    /// Returns whether a choke message was sent.
    pub fn choke(&self) -> Result<bool, PeerError> {
        let mut state = self.state.lock();
        if state.choking.am_choking {
            return Ok(false);
        }
        state.choking.am_choking = true;
        self.send(Message::Choke)?;
        Ok(true)
    }

    /// Unchokes the neighbor if it is currently choked.
    ///
    /// Returns whether an unchoke message was sent.
    pub fn unchoke(&self) -> Result<bool, PeerError> {
        let mut state = self.state.lock();
        if !state.choking.am_choking {
            return Ok(false);
        }
        state.choking.am_choking = false;
        self.send(Message::Unchoke)?;
        Ok(true)
    }

    pub fn record_download(&self, bytes: u64) {
        self.interval_downloaded.fetch_add(bytes, Ordering::Relaxed);
        self.bytes_downloaded.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Returns the bytes received since the last call and resets the counter.
    pub fn take_interval_downloaded(&self) -> u64 {
        self.interval_downloaded.swap(0, Ordering::Relaxed)
    }

    pub fn bytes_downloaded(&self) -> u64 {
        self.bytes_downloaded.load(Ordering::Relaxed)
    }

    pub fn bytes_uploaded(&self) -> u64 {
        self.bytes_uploaded.load(Ordering::Relaxed)
    }

    /// Snapshot used by the scheduler; resets the interval counter.
    pub fn take_stats(&self) -> PeerStats {
        let choking = self.choking();
        PeerStats {
            peer: self.neighbor,
            downloaded: self.take_interval_downloaded(),
            interested: choking.peer_interested,
            we_choking: choking.am_choking,
        }
    }

    /// Records a request for `piece` under the given claim token.
    pub fn track_request(&self, piece: u32, token: u64) {
        self.pending
            .lock()
            .insert(piece, PendingRequest { token, timer: None });
    }

    /// Attaches the expiry timer of a tracked request.
    ///
    /// If the request is already gone the timer is aborted.
    pub fn attach_timer(&self, piece: u32, token: u64, timer: AbortHandle) {
        let mut pending = self.pending.lock();
        match pending.get_mut(&piece) {
            Some(request) if request.token == token => request.timer = Some(timer),
            _ => timer.abort(),
        }
    }

    /// Completes the request for `piece`, cancelling its timer.
    ///
    /// Returns the claim token, or `None` if no request was outstanding
    /// (it expired or was never made).
    pub fn complete_request(&self, piece: u32) -> Option<u64> {
        let request = self.pending.lock().remove(&piece)?;
        if let Some(timer) = request.timer {
            timer.abort();
        }
        Some(request.token)
    }

    /// Drops the request for `piece` if it still carries `token`.
    ///
    /// Called by the expiry timer; returns false if the piece arrived first.
    pub fn expire_request(&self, piece: u32, token: u64) -> bool {
        let mut pending = self.pending.lock();
        match pending.get(&piece) {
            Some(request) if request.token == token => {
                pending.remove(&piece);
                true
            }
            _ => false,
        }
    }

    /// Cancels every outstanding request, returning `(piece, token)` pairs.
    pub fn abandon_requests(&self) -> Vec<(u32, u64)> {
        self.pending
            .lock()
            .drain()
            .map(|(piece, request)| {
                if let Some(timer) = request.timer {
                    timer.abort();
                }
                (piece, request.token)
            })
            .collect()
    }

    pub fn has_pending_request(&self, piece: u32) -> bool {
        self.pending.lock().contains_key(&piece)
    }

    pub fn pending_requests(&self) -> Vec<u32> {
        let mut pieces: Vec<u32> = self.pending.lock().keys().copied().collect();
        pieces.sort_unstable();
        pieces
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("neighbor", &self.neighbor)
            .field("choking", &self.choking())
            .finish()
    }
}
