//! peerswarm - roster-based peer-to-peer file distribution
//!
//! A fixed set of peers, listed in a shared roster, exchange one file split
//! into fixed-size pieces. Peers that start with the file seed it; the rest
//! download pieces from whichever neighbors unchoke them and re-share what
//! they receive. Each peer limits its uploads with a choke/unchoke scheduler
//! (preferred neighbors by download rate plus one optimistic unchoke).
//!
//! # Modules
//!
//! - [`peer`] - Handshake, message framing, bitfields, sessions and the session registry
//! - [`storage`] - In-memory piece store, seed loading and file assembly
//! - [`scheduler`] - Preferred and optimistic unchoking timers
//! - [`engine`] - Accept loop, dialing, message dispatch and shutdown
//! - [`config`] - `Common.cfg` and `PeerInfo.cfg` parsing
//! - [`constants`] - Wire literals, timeouts and file-layout conventions

pub mod config;
pub mod constants;
pub mod engine;
pub mod peer;
pub mod scheduler;
pub mod storage;

pub use config::{CommonConfig, ConfigError, EngineConfig, PeerInfo, Roster};
pub use engine::{Engine, EngineError};
pub use peer::{
    Bitfield, ChokingAlgorithm, Handshake, Message, PeerError, PeerId, PeerTransport, Session,
    SessionRegistry,
};
pub use scheduler::NeighborScheduler;
pub use storage::{PieceStore, StorageError};
