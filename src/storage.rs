//! Piece storage.
//!
//! The shared file is held in memory as a map from piece index to content,
//! alongside the local ownership bitfield. A peer that starts with the file
//! loads and splits it; a downloading peer fills the store piece by piece
//! and assembles the file once every piece is present.
//!
//! # Examples
//!
//! ```
//! use peerswarm::storage::PieceStore;
//! use bytes::Bytes;
//!
//! let seed = PieceStore::seeded(Bytes::from_static(b"0123456789"), 4).unwrap();
//! assert_eq!(seed.piece_count(), 3);
//! assert_eq!(seed.get_piece(2).unwrap().as_ref(), b"89");
//!
//! let leech = PieceStore::new(4, 10).unwrap();
//! for index in 0..3 {
//!     leech.put_piece(index, seed.get_piece(index).unwrap()).unwrap();
//! }
//! assert!(leech.is_complete());
//! assert_eq!(leech.assemble().unwrap().as_ref(), b"0123456789");
//! ```

mod error;
mod piece_store;

pub use error::StorageError;
pub use piece_store::PieceStore;

#[cfg(test)]
mod tests;
