use super::Swarm;
use crate::peer::{Bitfield, Message, PeerError, Session};
use bytes::Bytes;
use rand::seq::SliceRandom;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Reacts to the messages of one neighbor.
pub(super) struct Dispatcher<'a> {
    swarm: &'a Arc<Swarm>,
    session: &'a Arc<Session>,
}

impl<'a> Dispatcher<'a> {
    pub(super) fn new(swarm: &'a Arc<Swarm>, session: &'a Arc<Session>) -> Self {
        Self { swarm, session }
    }

    /// First message on every connection: our bitfield.
    pub(super) fn on_established(&self) -> Result<(), PeerError> {
        let ours = self.swarm.store.bitfield();
        self.session.send(Message::Bitfield(ours.to_bytes()))
    }

    pub(super) async fn dispatch(&self, message: Message) -> Result<(), PeerError> {
        let local = self.swarm.local_id;
        let neighbor = self.session.neighbor();

        match message {
            Message::Bitfield(bits) => self.on_bitfield(&bits),
            Message::Choke => {
                self.session.set_peer_choking(true);
                info!("Peer {} is choked by {}", local, neighbor);
                Ok(())
            }
            Message::Unchoke => {
                self.session.set_peer_choking(false);
                info!("Peer {} is unchoked by {}", local, neighbor);
                self.request_next_piece().map(|_| ())
            }
            Message::Interested => {
                self.session.set_peer_interested(true);
                info!(
                    "Peer {} received the 'interested' message from {}",
                    local, neighbor
                );
                Ok(())
            }
            Message::NotInterested => {
                self.session.set_peer_interested(false);
                info!(
                    "Peer {} received the 'not interested' message from {}",
                    local, neighbor
                );
                Ok(())
            }
            Message::Have { piece } => self.on_have(piece),
            Message::Request { piece } => self.on_request(piece),
            Message::Piece { index, data } => self.on_piece(index, data).await,
        }
    }

    fn on_bitfield(&self, bits: &[u8]) -> Result<(), PeerError> {
        let theirs = Bitfield::from_bytes(bits, self.swarm.store.piece_count());
        self.session.merge_bitfield(&theirs);
        debug!(
            "Peer {} received a bitfield with {} pieces from {}",
            self.swarm.local_id,
            theirs.count(),
            self.session.neighbor()
        );

        let interested = self
            .session
            .has_pieces_missing_from(&self.swarm.store.bitfield());
        self.session.set_interested(interested)?;

        self.swarm.note_neighbor_progress(self.session);
        Ok(())
    }

    fn on_have(&self, piece: u32) -> Result<(), PeerError> {
        if piece as usize >= self.swarm.store.piece_count() {
            return Err(PeerError::InvalidMessage(format!(
                "have for piece {} out of range",
                piece
            )));
        }

        self.session.mark_have(piece as usize);
        info!(
            "Peer {} received the 'have' message from {} for the piece {}",
            self.swarm.local_id,
            self.session.neighbor(),
            piece
        );

        if !self.swarm.store.has_piece(piece) {
            self.session.set_interested(true)?;
        }

        self.swarm.note_neighbor_progress(self.session);
        Ok(())
    }

    fn on_request(&self, piece: u32) -> Result<(), PeerError> {
        if self.session.am_choking() {
            debug!(
                "Peer {} ignored a request for piece {} from choked {}",
                self.swarm.local_id,
                piece,
                self.session.neighbor()
            );
            return Ok(());
        }

        match self.swarm.store.get_piece(piece) {
            Ok(data) => self.session.send(Message::Piece { index: piece, data }),
            Err(e) => {
                debug!(
                    "Peer {} cannot serve piece {} to {}: {}",
                    self.swarm.local_id,
                    piece,
                    self.session.neighbor(),
                    e
                );
                Ok(())
            }
        }
    }

    async fn on_piece(&self, index: u32, data: Bytes) -> Result<(), PeerError> {
        let store = &self.swarm.store;
        let requests = self.swarm.registry.requests();

        let token = self.session.complete_request(index);
        self.session.record_download(data.len() as u64);

        let stored = store.put_piece(index, data);
        if let Some(token) = token {
            requests.release(index, token);
        }

        match stored {
            Ok(_) => {
                info!(
                    "Peer {} has downloaded the piece {} from {}. Now the number of pieces it has is {}",
                    self.swarm.local_id,
                    index,
                    self.session.neighbor(),
                    store.owned_count()
                );
                self.swarm.registry.broadcast(&Message::Have { piece: index });
            }
            Err(e) => {
                warn!(
                    "Peer {} discarded piece {} from {}: {}",
                    self.swarm.local_id,
                    index,
                    self.session.neighbor(),
                    e
                );
                return Ok(());
            }
        }

        if !self.session.has_pieces_missing_from(&store.bitfield()) {
            self.session.set_interested(false)?;
        } else if !self.session.peer_choking() {
            self.request_next_piece()?;
        }

        if store.is_complete() {
            self.swarm.finish_download().await;
        }
        Ok(())
    }

    /// Requests a random piece the neighbor has, we lack, and nobody else
    /// has been asked for.
    ///
    /// Returns the requested index, if any.
    pub(super) fn request_next_piece(&self) -> Result<Option<u32>, PeerError> {
        let requests = self.swarm.registry.requests();
        let neighbor = self.session.neighbor();

        let mut candidates: Vec<u32> = self
            .session
            .bitfield()
            .missing_pieces(&self.swarm.store.bitfield())
            .into_iter()
            .map(|piece| piece as u32)
            .filter(|&piece| !requests.is_claimed(piece))
            .collect();
        candidates.shuffle(&mut rand::rng());

        for piece in candidates {
            let Some(token) = self.claim(piece) else {
                continue;
            };

            self.session.track_request(piece, token);
            if let Err(e) = self.session.send(Message::Request { piece }) {
                self.session.complete_request(piece);
                requests.release(piece, token);
                return Err(e);
            }
            self.start_expiry(piece, token);

            debug!(
                "Peer {} requested piece {} from {}",
                self.swarm.local_id, piece, neighbor
            );
            return Ok(Some(piece));
        }

        Ok(None)
    }

    /// Claims `piece` for this neighbor unless it is claimed elsewhere or
    /// became ours after the candidate list was built.
    pub(super) fn claim(&self, piece: u32) -> Option<u64> {
        let requests = self.swarm.registry.requests();
        let token = requests.try_claim(piece, self.session.neighbor())?;

        if self.swarm.store.has_piece(piece) {
            requests.release(piece, token);
            return None;
        }
        Some(token)
    }

    fn start_expiry(&self, piece: u32, token: u64) {
        let session = Arc::clone(self.session);
        let registry = Arc::clone(&self.swarm.registry);
        let after = self.swarm.config.request_timeout;

        let timer = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if session.expire_request(piece, token) {
                registry.requests().release(piece, token);
                debug!(
                    "Request for piece {} to {} expired",
                    piece,
                    session.neighbor()
                );
            }
        });
        self.session.attach_timer(piece, token, timer.abort_handle());
    }
}
