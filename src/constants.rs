//! Protocol constants and tuning parameters.
//!
//! This module contains the constants used throughout the engine: wire
//! protocol literals, timeouts, buffer sizes and file-layout conventions.

use std::time::Duration;

// ============================================================================
// Wire protocol
// ============================================================================

/// Fixed header that opens every handshake.
pub const HANDSHAKE_HEADER: &[u8; 18] = b"P2PFILESHARINGPROJ";

/// Number of zero bytes between the header and the peer id.
pub const HANDSHAKE_ZERO_BYTES: usize = 10;

/// Total handshake length: header + zero bytes + 4-byte peer id.
pub const HANDSHAKE_LEN: usize = 32;

/// Size of the big-endian length prefix of a message frame.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Frame overhead of a piece message: type byte + 4-byte index.
pub const PIECE_HEADER_LEN: usize = 5;

/// Upper bound on a single frame when no piece size is known.
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Initial capacity of a transport read buffer.
pub const READ_BUFFER_CAPACITY: usize = 32 * 1024;

// ============================================================================
// Timeouts
// ============================================================================

/// How long a connection may stay in the handshake phase.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum time to flush one frame to the socket.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(30);

/// Time after which an unanswered piece request frees its slot.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// How long shutdown waits for sessions to flush their queued messages.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

// ============================================================================
// Files
// ============================================================================

/// Name of the common configuration file.
pub const COMMON_CONFIG_FILE: &str = "Common.cfg";

/// Name of the roster file.
pub const PEER_INFO_FILE: &str = "PeerInfo.cfg";

/// Prefix of the per-peer working directory (`peer_<id>`).
pub const PEER_DIR_PREFIX: &str = "peer_";

/// Prefix of the per-peer log file (`log_peer_<id>.log`).
pub const LOG_FILE_PREFIX: &str = "log_peer_";
