use std::fmt;

/// A numeric peer identifier taken from the roster.
///
/// Peer ids are carried in the last four bytes of the handshake, big-endian.
///
/// # Examples
///
/// ```
/// use peerswarm::peer::PeerId;
///
/// let id = PeerId::new(1001);
/// assert_eq!(id.to_be_bytes(), [0, 0, 0x03, 0xE9]);
/// assert_eq!(PeerId::from_be_bytes([0, 0, 0x03, 0xE9]), id);
/// assert_eq!(id.to_string(), "1001");
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub u32);

impl PeerId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    pub fn from_be_bytes(bytes: [u8; 4]) -> Self {
        Self(u32::from_be_bytes(bytes))
    }

    pub fn to_be_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }
}

impl From<u32> for PeerId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", self.0)
    }
}
