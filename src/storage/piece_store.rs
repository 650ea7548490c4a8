use super::error::StorageError;
use crate::peer::Bitfield;
use bytes::{Bytes, BytesMut};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::path::Path;
use tracing::debug;

/// In-memory store of the shared file's pieces.
///
/// Holds the local ownership bitfield and the content of every owned
/// piece. A piece index is present in the content map exactly when its bit
/// is set: both are updated while holding the bitfield's write lock, and
/// pieces are never removed.
///
/// Readers of different pieces proceed concurrently through the sharded
/// content map.
#[derive(Debug)]
pub struct PieceStore {
    piece_size: u64,
    file_size: u64,
    piece_count: usize,
    pieces: DashMap<u32, Bytes>,
    owned: RwLock<Bitfield>,
}

impl PieceStore {
    /// Creates an empty store for a file of `file_size` bytes.
    pub fn new(piece_size: u64, file_size: u64) -> Result<Self, StorageError> {
        if piece_size == 0 || file_size == 0 {
            return Err(StorageError::InvalidLayout {
                piece_size,
                file_size,
            });
        }

        let piece_count = file_size.div_ceil(piece_size);
        if piece_count > u32::MAX as u64 {
            return Err(StorageError::InvalidLayout {
                piece_size,
                file_size,
            });
        }
        let piece_count = piece_count as usize;

        Ok(Self {
            piece_size,
            file_size,
            piece_count,
            pieces: DashMap::with_capacity(piece_count),
            owned: RwLock::new(Bitfield::new(piece_count)),
        })
    }

    /// Creates a complete store by splitting `data` into pieces.
    ///
    /// Every piece is `piece_size` bytes except the last, which holds the
    /// remainder.
    pub fn seeded(data: Bytes, piece_size: u64) -> Result<Self, StorageError> {
        let store = Self::new(piece_size, data.len() as u64)?;

        {
            let mut owned = store.owned.write();
            for index in 0..store.piece_count {
                let start = index as u64 * piece_size;
                let end = start + store.piece_length(index as u32);
                store
                    .pieces
                    .insert(index as u32, data.slice(start as usize..end as usize));
                owned.set_piece(index);
            }
        }

        Ok(store)
    }

    /// Reads a complete file from disk and splits it into pieces.
    pub async fn load(
        path: impl AsRef<Path>,
        piece_size: u64,
        file_size: u64,
    ) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await?;

        if data.len() as u64 != file_size {
            return Err(StorageError::FileSizeMismatch {
                expected: file_size,
                found: data.len() as u64,
            });
        }

        debug!("Loaded {} bytes from {}", data.len(), path.display());
        Self::seeded(Bytes::from(data), piece_size)
    }

    pub fn piece_count(&self) -> usize {
        self.piece_count
    }

    pub fn piece_size(&self) -> u64 {
        self.piece_size
    }

    /// Expected length of the piece at `index`.
    pub fn piece_length(&self, index: u32) -> u64 {
        let index = index as u64;
        let last = self.piece_count as u64 - 1;
        if index < last {
            self.piece_size
        } else {
            self.file_size - self.piece_size * last
        }
    }

    pub fn has_piece(&self, index: u32) -> bool {
        self.owned.read().has_piece(index as usize)
    }

    pub fn get_piece(&self, index: u32) -> Result<Bytes, StorageError> {
        self.pieces
            .get(&index)
            .map(|piece| piece.value().clone())
            .ok_or(StorageError::PieceNotFound(index))
    }

    /// Stores a piece and marks it owned.
    ///
    /// Storing an already-owned index overwrites its content. Returns
    /// `true` if the piece was not owned before.
    pub fn put_piece(&self, index: u32, data: Bytes) -> Result<bool, StorageError> {
        if index as usize >= self.piece_count {
            return Err(StorageError::InvalidPieceIndex(index));
        }

        let expected = self.piece_length(index);
        if data.len() as u64 != expected {
            return Err(StorageError::InvalidPieceLength {
                piece: index,
                expected,
                got: data.len() as u64,
            });
        }

        let mut owned = self.owned.write();
        self.pieces.insert(index, data);
        Ok(owned.set_piece(index as usize))
    }

    /// Returns a snapshot of the local ownership bitfield.
    pub fn bitfield(&self) -> Bitfield {
        self.owned.read().clone()
    }

    pub fn owned_count(&self) -> usize {
        self.owned.read().count()
    }

    pub fn is_complete(&self) -> bool {
        self.owned.read().is_complete()
    }

    /// Concatenates all pieces in index order.
    pub fn assemble(&self) -> Result<Bytes, StorageError> {
        let owned = self.owned_count();
        if owned != self.piece_count {
            return Err(StorageError::Incomplete {
                owned,
                total: self.piece_count,
            });
        }

        let mut file = BytesMut::with_capacity(self.file_size as usize);
        for index in 0..self.piece_count as u32 {
            let piece = self
                .pieces
                .get(&index)
                .ok_or(StorageError::MissingPiece(index))?;
            file.extend_from_slice(piece.value());
        }

        Ok(file.freeze())
    }

    /// Assembles the file and writes it to `path`, creating parent
    /// directories as needed.
    pub async fn write_file(&self, path: impl AsRef<Path>) -> Result<(), StorageError> {
        let path = path.as_ref();
        let data = self.assemble()?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, &data).await?;

        debug!("Wrote {} bytes to {}", data.len(), path.display());
        Ok(())
    }
}
