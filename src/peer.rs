//! Peer wire protocol and per-neighbor session state.
//!
//! This module implements the 32-byte handshake, the length-prefixed
//! message framing, piece bitfields, the choke/unchoke selection algorithm
//! and the concurrent session registry.
//!
//! # Wire format
//!
//! ```text
//! handshake: "P2PFILESHARINGPROJ" | 10 x 0x00 | peer id (u32, big-endian)
//! message:   length (u32, big-endian) | type (u8) | payload
//! ```
//!
//! # Examples
//!
//! ```
//! use peerswarm::peer::{Handshake, Message, PeerId};
//!
//! let handshake = Handshake::new(PeerId::new(1001));
//! let bytes = handshake.encode();
//! assert_eq!(bytes.len(), 32);
//! assert_eq!(Handshake::decode(&bytes).unwrap().peer_id, PeerId::new(1001));
//!
//! let have = Message::Have { piece: 7 };
//! assert_eq!(have.encode().as_ref(), &[0, 0, 0, 5, 4, 0, 0, 0, 7]);
//! ```

mod bitfield;
mod choking;
mod error;
mod message;
mod peer_id;
mod registry;
mod request;
mod session;
mod transport;

pub use bitfield::Bitfield;
pub use choking::{ChokingAlgorithm, ChokingState, PeerStats, UnchokeDecisions};
pub use error::PeerError;
pub use message::{Handshake, Message, MessageId};
pub use peer_id::PeerId;
pub use registry::SessionRegistry;
pub use request::RequestTracker;
pub use session::Session;
pub use transport::{MessageReader, MessageWriter, PeerTransport};
