use thiserror::Error;

/// Errors that can occur during peer communication.
#[derive(Debug, Error)]
pub enum PeerError {
    /// Network I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer sent a handshake with a bad header or length.
    #[error("invalid handshake")]
    InvalidHandshake,

    /// The handshake carried a peer id that is not in the roster.
    #[error("unknown peer id: {0}")]
    UnknownPeer(u32),

    /// The dialed peer answered with a different id.
    #[error("unexpected peer id: expected {expected}, got {got}")]
    UnexpectedPeer { expected: u32, got: u32 },

    /// A session with this neighbor already exists.
    #[error("duplicate session with peer {0}")]
    DuplicateSession(u32),

    /// Received a malformed protocol message.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Received an unknown message ID.
    #[error("invalid message id: {0}")]
    InvalidMessageId(u8),

    /// The connection was closed by the peer.
    #[error("connection closed")]
    ConnectionClosed,

    /// Operation timed out.
    #[error("timeout")]
    Timeout,
}
