//! Connection orchestration.
//!
//! The [`Engine`] owns every long-lived task of a peer:
//!
//! - an accept loop that validates inbound handshakes;
//! - one dial task per roster peer listed before us;
//! - one task per established connection, driving its reader and writer;
//! - the two [`NeighborScheduler`] timers.
//!
//! Connection tasks and background tasks live in two `JoinSet`s.
//! [`Engine::shutdown`] stops the background tasks, lets every session
//! flush what it has queued, then aborts whatever is left.
//!
//! # Examples
//!
//! ```no_run
//! use peerswarm::config::EngineConfig;
//! use peerswarm::engine::Engine;
//! use peerswarm::peer::PeerId;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EngineConfig::load(PeerId::new(1002), ".")?;
//! let engine = Engine::new(config).await?;
//! engine.start().await?;
//! engine.wait_for_swarm().await;
//! engine.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod dispatch;
mod error;
mod handshake;

pub use error::EngineError;

use crate::config::{ConfigError, EngineConfig, PeerInfo};
use crate::constants::{HANDSHAKE_TIMEOUT, PIECE_HEADER_LEN, SHUTDOWN_TIMEOUT};
use crate::peer::{Message, MessageReader, MessageWriter, PeerError, PeerId, PeerTransport};
use crate::peer::{Session, SessionRegistry};
use crate::scheduler::NeighborScheduler;
use crate::storage::PieceStore;
use dispatch::Dispatcher;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{ReadHalf, WriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// A running (or ready to run) peer.
pub struct Engine {
    swarm: Arc<Swarm>,
    started: AtomicBool,
}

/// State shared by every task of one engine.
struct Swarm {
    local_id: PeerId,
    config: EngineConfig,
    store: Arc<PieceStore>,
    registry: Arc<SessionRegistry>,
    max_frame: usize,
    has_file: watch::Sender<bool>,
    swarm_complete: watch::Sender<bool>,
    /// Neighbors known to hold every piece. Survives their disconnect.
    finished: Mutex<HashSet<PeerId>>,
    /// Set once the local file has been (or is being) written.
    assembling: AtomicBool,
    /// Tells every send loop to flush its queue and stop.
    closing: watch::Sender<bool>,
    /// Accept loop and scheduler timers.
    tasks: Mutex<JoinSet<()>>,
    /// Dials, inbound handshakes and established sessions.
    connections: Mutex<JoinSet<()>>,
}

impl Engine {
    /// Builds an engine, loading the file from disk if the roster says the
    /// local peer starts with it.
    pub async fn new(config: EngineConfig) -> Result<Self, EngineError> {
        let local = local_peer(&config)?;
        let common = &config.common;

        let store = if local.has_file {
            let path = config.file_path();
            let store = PieceStore::load(&path, common.piece_size, common.file_size).await?;
            info!("Peer {} loaded {} from {}", local.id, common.file_name, path.display());
            store
        } else {
            PieceStore::new(common.piece_size, common.file_size)?
        };

        Self::with_store(config, store)
    }

    /// Builds an engine around an existing piece store.
    pub fn with_store(config: EngineConfig, store: PieceStore) -> Result<Self, EngineError> {
        local_peer(&config)?;

        let local_id = config.local_id;
        let complete = store.is_complete();
        let max_frame = (store.piece_size() as usize + PIECE_HEADER_LEN)
            .max(store.piece_count().div_ceil(8) + 1);

        let swarm = Swarm {
            local_id,
            config,
            store: Arc::new(store),
            registry: Arc::new(SessionRegistry::new()),
            max_frame,
            has_file: watch::Sender::new(complete),
            swarm_complete: watch::Sender::new(false),
            finished: Mutex::new(HashSet::new()),
            assembling: AtomicBool::new(complete),
            closing: watch::Sender::new(false),
            tasks: Mutex::new(JoinSet::new()),
            connections: Mutex::new(JoinSet::new()),
        };

        Ok(Self {
            swarm: Arc::new(swarm),
            started: AtomicBool::new(false),
        })
    }

    /// Listens on the roster port of the local peer and starts every task.
    pub async fn start(&self) -> Result<SocketAddr, EngineError> {
        let port = local_peer(&self.swarm.config)?.port;
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        self.start_with_listener(listener)
    }

    /// Starts every task using an already bound listener.
    pub fn start_with_listener(&self, listener: TcpListener) -> Result<SocketAddr, EngineError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(EngineError::AlreadyStarted);
        }

        let swarm = &self.swarm;
        let addr = listener.local_addr()?;
        info!("Peer {} listening on {}", swarm.local_id, addr);

        swarm.spawn(Arc::clone(swarm).accept_loop(listener));

        let common = &swarm.config.common;
        let scheduler = Arc::new(NeighborScheduler::new(
            swarm.local_id,
            Arc::clone(&swarm.registry),
            Arc::clone(&swarm.store),
            common.preferred_neighbors,
            common.unchoking_interval,
            common.optimistic_unchoking_interval,
        ));
        swarm.spawn(Arc::clone(&scheduler).run_preferred());
        swarm.spawn(scheduler.run_optimistic());

        for peer in swarm.config.roster.predecessors(swarm.local_id) {
            swarm.spawn_connection(Arc::clone(swarm).dial(peer.clone()));
        }

        swarm.check_swarm_complete();
        Ok(addr)
    }

    pub fn local_id(&self) -> PeerId {
        self.swarm.local_id
    }

    pub fn config(&self) -> &EngineConfig {
        &self.swarm.config
    }

    pub fn store(&self) -> &Arc<PieceStore> {
        &self.swarm.store
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.swarm.registry
    }

    /// Whether the local peer holds (and has written) the whole file.
    pub fn has_file(&self) -> bool {
        *self.swarm.has_file.borrow()
    }

    /// Whether every roster peer is known to hold the whole file.
    pub fn is_swarm_complete(&self) -> bool {
        *self.swarm.swarm_complete.borrow()
    }

    /// Resolves once the local file has been assembled and written.
    pub async fn wait_for_file(&self) {
        let mut rx = self.swarm.has_file.subscribe();
        let _ = rx.wait_for(|done| *done).await;
    }

    /// Resolves once every roster peer holds the whole file.
    pub async fn wait_for_swarm(&self) {
        let mut rx = self.swarm.swarm_complete.subscribe();
        let _ = rx.wait_for(|done| *done).await;
    }

    /// Stops accepting and scheduling, gives every session a short grace
    /// period to flush its queue, then aborts the remaining tasks.
    pub async fn shutdown(&self) {
        let mut tasks = std::mem::take(&mut *self.swarm.tasks.lock());
        tasks.abort_all();
        while tasks.join_next().await.is_some() {}

        self.swarm.closing.send_replace(true);
        let mut connections = std::mem::take(&mut *self.swarm.connections.lock());
        let drained = timeout(SHUTDOWN_TIMEOUT, async {
            while connections.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            debug!(
                "Peer {} aborting {} connections that did not finish in time",
                self.swarm.local_id,
                connections.len()
            );
        }
        connections.abort_all();
        while connections.join_next().await.is_some() {}

        for neighbor in self.swarm.registry.neighbors() {
            self.swarm.registry.remove(neighbor);
        }

        info!("Peer {} shut down", self.swarm.local_id);
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("local_id", &self.swarm.local_id)
            .field("neighbors", &self.swarm.registry.neighbors())
            .field("pieces", &self.swarm.store.owned_count())
            .finish()
    }
}

fn local_peer(config: &EngineConfig) -> Result<PeerInfo, ConfigError> {
    config
        .local_peer()
        .cloned()
        .ok_or(ConfigError::UnknownLocalPeer(config.local_id.get()))
}

impl Swarm {
    fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.lock().spawn(task);
    }

    fn spawn_connection<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.connections.lock().spawn(task);
    }

    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    let swarm = Arc::clone(&self);
                    self.spawn_connection(swarm.handle_inbound(stream, addr));
                }
                Err(e) => {
                    warn!("Peer {} failed to accept a connection: {}", self.local_id, e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    async fn handle_inbound(self: Arc<Self>, stream: TcpStream, addr: SocketAddr) {
        let _ = stream.set_nodelay(true);
        let mut transport = PeerTransport::new(stream).with_max_message_size(self.max_frame);

        let handshake = handshake::accept(
            &mut transport,
            self.local_id,
            &self.config.roster,
            &self.registry,
        );
        let neighbor = match timeout(HANDSHAKE_TIMEOUT, handshake).await {
            Ok(Ok(neighbor)) => neighbor,
            Ok(Err(e)) => {
                warn!("Peer {} rejected a connection from {}: {}", self.local_id, addr, e);
                return;
            }
            Err(_) => {
                warn!("Peer {} timed out waiting for a handshake from {}", self.local_id, addr);
                return;
            }
        };

        info!("Peer {} is connected from Peer {}", self.local_id, neighbor);
        self.run_session(transport, neighbor).await;
    }

    async fn dial(self: Arc<Self>, peer: PeerInfo) {
        let stream = match TcpStream::connect(peer.address()).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(
                    "Peer {} could not connect to Peer {} at {}: {}",
                    self.local_id,
                    peer.id,
                    peer.address(),
                    e
                );
                return;
            }
        };
        let _ = stream.set_nodelay(true);
        let mut transport = PeerTransport::new(stream).with_max_message_size(self.max_frame);

        let handshake =
            handshake::initiate(&mut transport, self.local_id, peer.id, &self.config.roster);
        match timeout(HANDSHAKE_TIMEOUT, handshake).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                warn!("Peer {} handshake with Peer {} failed: {}", self.local_id, peer.id, e);
                return;
            }
            Err(_) => {
                warn!("Peer {} timed out in handshake with Peer {}", self.local_id, peer.id);
                return;
            }
        }

        info!("Peer {} makes a connection to Peer {}", self.local_id, peer.id);
        self.run_session(transport, peer.id).await;
    }

    /// Drives one established connection until it closes.
    async fn run_session(
        self: Arc<Self>,
        transport: PeerTransport<TcpStream>,
        neighbor: PeerId,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Arc::new(Session::new(neighbor, self.store.piece_count(), tx));

        if !self.registry.insert(Arc::clone(&session)) {
            warn!(
                "Peer {} dropped a duplicate connection with Peer {}",
                self.local_id, neighbor
            );
            return;
        }

        let (reader, writer) = transport.into_split();
        let dispatcher = Dispatcher::new(&self, &session);

        let result = match dispatcher.on_established() {
            Ok(()) => {
                tokio::select! {
                    r = receive_loop(&dispatcher, reader) => r,
                    r = send_loop(writer, rx, self.closing.subscribe()) => r,
                }
            }
            Err(e) => Err(e),
        };

        self.registry.remove(neighbor);

        match result {
            Ok(()) | Err(PeerError::ConnectionClosed) => info!(
                "Peer {} lost the connection to Peer {} ({} bytes down, {} bytes up)",
                self.local_id,
                neighbor,
                session.bytes_downloaded(),
                session.bytes_uploaded()
            ),
            Err(e) => warn!(
                "Peer {} closed the connection to Peer {}: {}",
                self.local_id, neighbor, e
            ),
        }
    }

    /// Records that `session`'s neighbor holds every piece, then re-checks
    /// swarm completion.
    fn note_neighbor_progress(&self, session: &Session) {
        if session.has_all_pieces() && self.finished.lock().insert(session.neighbor()) {
            info!(
                "Peer {} learned that Peer {} has the complete file",
                self.local_id,
                session.neighbor()
            );
        }
        self.check_swarm_complete();
    }

    fn check_swarm_complete(&self) {
        if !*self.has_file.borrow() {
            return;
        }

        let all_done = {
            let finished = self.finished.lock();
            self.config
                .roster
                .peers()
                .iter()
                .filter(|p| p.id != self.local_id)
                .all(|p| finished.contains(&p.id))
        };
        if !all_done {
            return;
        }

        let changed = self.swarm_complete.send_if_modified(|done| {
            let changed = !*done;
            *done = true;
            changed
        });
        if changed {
            info!("Peer {} sees that every peer has the complete file", self.local_id);
        }
    }

    /// Writes the assembled file once, after the last piece arrives.
    async fn finish_download(&self) {
        if self.assembling.swap(true, Ordering::SeqCst) {
            return;
        }

        let path = self.config.file_path();
        match self.store.write_file(&path).await {
            Ok(()) => {
                info!("Peer {} has downloaded the complete file", self.local_id);
                debug!("Peer {} wrote {}", self.local_id, path.display());
                self.has_file.send_replace(true);
                self.check_swarm_complete();
            }
            Err(e) => error!(
                "Peer {} failed to write {}: {}",
                self.local_id,
                path.display(),
                e
            ),
        }
    }
}

async fn receive_loop(
    dispatcher: &Dispatcher<'_>,
    mut reader: MessageReader<ReadHalf<TcpStream>>,
) -> Result<(), PeerError> {
    loop {
        let message = reader.receive_message().await?;
        dispatcher.dispatch(message).await?;
    }
}

/// Writes queued messages until the queue closes or shutdown begins.
///
/// On shutdown the queue is closed to new messages and flushed before the
/// write half is shut down.
async fn send_loop(
    mut writer: MessageWriter<WriteHalf<TcpStream>>,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    mut closing: watch::Receiver<bool>,
) -> Result<(), PeerError> {
    loop {
        tokio::select! {
            message = outbound.recv() => match message {
                Some(message) => writer.send_message(&message).await?,
                None => return Ok(()),
            },
            _ = async { closing.wait_for(|done| *done).await.map(|_| ()) } => break,
        }
    }

    outbound.close();
    while let Some(message) = outbound.recv().await {
        writer.send_message(&message).await?;
    }
    writer.shutdown().await
}

#[cfg(test)]
mod tests;
