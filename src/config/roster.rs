use super::error::ConfigError;
use crate::peer::PeerId;
use std::collections::HashSet;
use std::str::FromStr;

/// One roster entry from `PeerInfo.cfg`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    pub id: PeerId,
    pub host: String,
    pub port: u16,
    pub has_file: bool,
}

impl PeerInfo {
    pub fn new(id: u32, host: impl Into<String>, port: u16, has_file: bool) -> Self {
        Self {
            id: PeerId::new(id),
            host: host.into(),
            port,
            has_file,
        }
    }

    /// `host:port` form suitable for `TcpStream::connect`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// The ordered list of every peer in the swarm.
///
/// Order matters: each peer dials the entries before it and accepts
/// connections from the entries after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Roster {
    peers: Vec<PeerInfo>,
}

impl Roster {
    pub fn new(peers: Vec<PeerInfo>) -> Result<Self, ConfigError> {
        if peers.is_empty() {
            return Err(ConfigError::EmptyRoster);
        }

        let mut seen = HashSet::new();
        for peer in &peers {
            if !seen.insert(peer.id) {
                return Err(ConfigError::DuplicatePeer(peer.id.get()));
            }
        }

        Ok(Self { peers })
    }

    pub fn peers(&self) -> &[PeerInfo] {
        &self.peers
    }

    pub fn get(&self, id: PeerId) -> Option<&PeerInfo> {
        self.peers.iter().find(|p| p.id == id)
    }

    pub fn contains(&self, id: PeerId) -> bool {
        self.get(id).is_some()
    }

    /// Entries listed before `id`, in roster order.
    pub fn predecessors(&self, id: PeerId) -> &[PeerInfo] {
        let position = self
            .peers
            .iter()
            .position(|p| p.id == id)
            .unwrap_or(self.peers.len());
        &self.peers[..position]
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

impl FromStr for Roster {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut peers = Vec::new();

        for (number, line) in s.lines().enumerate() {
            let content = line.trim();
            if content.is_empty() || content.starts_with('#') {
                continue;
            }

            let invalid = || ConfigError::InvalidPeerLine {
                line: number + 1,
                content: content.to_string(),
            };

            let parts: Vec<&str> = content.split_whitespace().collect();
            let [id, host, port, has_file] = parts.as_slice() else {
                return Err(invalid());
            };

            let id: u32 = id.parse().map_err(|_| invalid())?;
            let port: u16 = port.parse().map_err(|_| invalid())?;
            let has_file = match *has_file {
                "0" => false,
                "1" => true,
                _ => return Err(invalid()),
            };

            peers.push(PeerInfo::new(id, *host, port, has_file));
        }

        Self::new(peers)
    }
}
