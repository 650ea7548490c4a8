//! Static configuration.
//!
//! Two text files describe a swarm:
//!
//! - `Common.cfg` - settings shared by every peer ([`CommonConfig`])
//! - `PeerInfo.cfg` - the ordered roster of peers ([`Roster`])
//!
//! [`EngineConfig`] combines them with the local peer's id and the
//! directory the engine works in. It is built once at startup and handed to
//! the engine by value; nothing reads configuration from global state.
//!
//! # Examples
//!
//! ```
//! use peerswarm::config::{CommonConfig, EngineConfig, Roster};
//! use peerswarm::peer::PeerId;
//!
//! let common: CommonConfig = "NumberOfPreferredNeighbors 2\n\
//!     UnchokingInterval 5\n\
//!     OptimisticUnchokingInterval 15\n\
//!     FileName TheFile.dat\n\
//!     FileSize 10000232\n\
//!     PieceSize 32768\n"
//!     .parse()
//!     .unwrap();
//! let roster: Roster = "1001 localhost 6008 1\n1002 localhost 6009 0\n".parse().unwrap();
//!
//! let config = EngineConfig::new(PeerId::new(1002), common, roster, ".").unwrap();
//! assert_eq!(config.common.piece_count(), 306);
//! assert!(!config.local_peer().unwrap().has_file);
//! ```

mod common;
mod error;
mod roster;

pub use common::CommonConfig;
pub use error::ConfigError;
pub use roster::{PeerInfo, Roster};

use crate::constants::{COMMON_CONFIG_FILE, PEER_DIR_PREFIX, PEER_INFO_FILE, REQUEST_TIMEOUT};
use crate::peer::PeerId;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Everything the engine needs to run one peer.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Id of the peer this process runs as.
    pub local_id: PeerId,
    pub common: CommonConfig,
    pub roster: Roster,
    /// Directory holding the per-peer `peer_<id>` directories.
    pub work_dir: PathBuf,
    /// How long a piece request may stay unanswered before its slot is freed.
    pub request_timeout: Duration,
}

impl EngineConfig {
    pub fn new(
        local_id: PeerId,
        common: CommonConfig,
        roster: Roster,
        work_dir: impl Into<PathBuf>,
    ) -> Result<Self, ConfigError> {
        if !roster.contains(local_id) {
            return Err(ConfigError::UnknownLocalPeer(local_id.get()));
        }

        Ok(Self {
            local_id,
            common,
            roster,
            work_dir: work_dir.into(),
            request_timeout: REQUEST_TIMEOUT,
        })
    }

    /// Reads `Common.cfg` and `PeerInfo.cfg` from `config_dir`.
    pub fn load(local_id: PeerId, config_dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();
        let common: CommonConfig = read_file(&config_dir.join(COMMON_CONFIG_FILE))?.parse()?;
        let roster: Roster = read_file(&config_dir.join(PEER_INFO_FILE))?.parse()?;
        Self::new(local_id, common, roster, config_dir)
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn local_peer(&self) -> Option<&PeerInfo> {
        self.roster.get(self.local_id)
    }

    /// `<work_dir>/peer_<id>`, where the file is read from and written to.
    pub fn peer_dir(&self) -> PathBuf {
        self.work_dir
            .join(format!("{}{}", PEER_DIR_PREFIX, self.local_id))
    }

    pub fn file_path(&self) -> PathBuf {
        self.peer_dir().join(&self.common.file_name)
    }
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })
}
