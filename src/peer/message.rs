use super::error::PeerError;
use super::peer_id::PeerId;
use crate::constants::{HANDSHAKE_HEADER, HANDSHAKE_LEN, HANDSHAKE_ZERO_BYTES, LENGTH_PREFIX_LEN};
use bytes::{Buf, BufMut, Bytes, BytesMut};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageId {
    Choke = 0,
    Unchoke = 1,
    Interested = 2,
    NotInterested = 3,
    Have = 4,
    Bitfield = 5,
    Request = 6,
    Piece = 7,
}

impl TryFrom<u8> for MessageId {
    type Error = PeerError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MessageId::Choke),
            1 => Ok(MessageId::Unchoke),
            2 => Ok(MessageId::Interested),
            3 => Ok(MessageId::NotInterested),
            4 => Ok(MessageId::Have),
            5 => Ok(MessageId::Bitfield),
            6 => Ok(MessageId::Request),
            7 => Ok(MessageId::Piece),
            _ => Err(PeerError::InvalidMessageId(value)),
        }
    }
}

/// The 32-byte handshake exchanged once in each direction.
///
/// Layout: `P2PFILESHARINGPROJ`, ten zero bytes, big-endian peer id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handshake {
    pub peer_id: PeerId,
}

impl Handshake {
    pub fn new(peer_id: PeerId) -> Self {
        Self { peer_id }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HANDSHAKE_LEN);
        buf.put_slice(HANDSHAKE_HEADER);
        buf.put_bytes(0, HANDSHAKE_ZERO_BYTES);
        buf.put_u32(self.peer_id.get());
        buf.freeze()
    }

    /// Decodes a handshake, checking only its length and header.
    ///
    /// Roster membership is checked by the caller.
    pub fn decode(data: &[u8]) -> Result<Self, PeerError> {
        if data.len() < HANDSHAKE_LEN {
            return Err(PeerError::InvalidHandshake);
        }

        if &data[..HANDSHAKE_HEADER.len()] != HANDSHAKE_HEADER {
            return Err(PeerError::InvalidHandshake);
        }

        let mut id = [0u8; 4];
        id.copy_from_slice(&data[HANDSHAKE_LEN - 4..HANDSHAKE_LEN]);

        Ok(Self {
            peer_id: PeerId::from_be_bytes(id),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Choke,
    Unchoke,
    Interested,
    NotInterested,
    Have { piece: u32 },
    Bitfield(Bytes),
    Request { piece: u32 },
    Piece { index: u32, data: Bytes },
}

impl Message {
    pub fn id(&self) -> MessageId {
        match self {
            Message::Choke => MessageId::Choke,
            Message::Unchoke => MessageId::Unchoke,
            Message::Interested => MessageId::Interested,
            Message::NotInterested => MessageId::NotInterested,
            Message::Have { .. } => MessageId::Have,
            Message::Bitfield(_) => MessageId::Bitfield,
            Message::Request { .. } => MessageId::Request,
            Message::Piece { .. } => MessageId::Piece,
        }
    }

    /// Length of the type byte plus payload, as written in the length prefix.
    pub fn frame_len(&self) -> usize {
        1 + match self {
            Message::Choke | Message::Unchoke | Message::Interested | Message::NotInterested => 0,
            Message::Have { .. } | Message::Request { .. } => 4,
            Message::Bitfield(bits) => bits.len(),
            Message::Piece { data, .. } => 4 + data.len(),
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_LEN + self.frame_len());
        buf.put_u32(self.frame_len() as u32);
        buf.put_u8(self.id() as u8);

        match self {
            Message::Choke | Message::Unchoke | Message::Interested | Message::NotInterested => {}
            Message::Have { piece } | Message::Request { piece } => {
                buf.put_u32(*piece);
            }
            Message::Bitfield(bits) => {
                buf.put_slice(bits);
            }
            Message::Piece { index, data } => {
                buf.put_u32(*index);
                buf.put_slice(data);
            }
        }

        buf.freeze()
    }

    /// Decodes a complete frame, length prefix included.
    pub fn decode(mut data: Bytes) -> Result<Self, PeerError> {
        if data.len() < LENGTH_PREFIX_LEN {
            return Err(PeerError::InvalidMessage("too short".into()));
        }

        let length = data.get_u32() as usize;

        if length == 0 {
            return Err(PeerError::InvalidMessage("empty frame".into()));
        }

        if data.remaining() < length {
            return Err(PeerError::InvalidMessage("incomplete message".into()));
        }

        let id = data.get_u8();
        Self::from_parts(id, data.split_to(length - 1))
    }

    /// Builds a message from its type byte and payload.
    pub fn from_parts(id: u8, mut payload: Bytes) -> Result<Self, PeerError> {
        let id = MessageId::try_from(id)?;

        match id {
            MessageId::Choke => Ok(Message::Choke),
            MessageId::Unchoke => Ok(Message::Unchoke),
            MessageId::Interested => Ok(Message::Interested),
            MessageId::NotInterested => Ok(Message::NotInterested),
            MessageId::Have => {
                if payload.remaining() < 4 {
                    return Err(PeerError::InvalidMessage("have too short".into()));
                }
                Ok(Message::Have {
                    piece: payload.get_u32(),
                })
            }
            MessageId::Bitfield => Ok(Message::Bitfield(payload)),
            MessageId::Request => {
                if payload.remaining() < 4 {
                    return Err(PeerError::InvalidMessage("request too short".into()));
                }
                Ok(Message::Request {
                    piece: payload.get_u32(),
                })
            }
            MessageId::Piece => {
                if payload.remaining() < 4 {
                    return Err(PeerError::InvalidMessage("piece too short".into()));
                }
                let index = payload.get_u32();
                Ok(Message::Piece {
                    index,
                    data: payload,
                })
            }
        }
    }
}
