use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid piece index: {0}")]
    InvalidPieceIndex(u32),

    #[error("invalid length for piece {piece}: expected {expected}, got {got}")]
    InvalidPieceLength { piece: u32, expected: u64, got: u64 },

    #[error("piece not found: {0}")]
    PieceNotFound(u32),

    #[error("missing piece {0}, cannot assemble file")]
    MissingPiece(u32),

    #[error("download incomplete: {owned} of {total} pieces")]
    Incomplete { owned: usize, total: usize },

    #[error("file size mismatch: expected {expected}, found {found}")]
    FileSizeMismatch { expected: u64, found: u64 },

    #[error("invalid layout: piece size {piece_size}, file size {file_size}")]
    InvalidLayout { piece_size: u64, file_size: u64 },
}
