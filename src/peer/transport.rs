use super::error::PeerError;
use super::message::{Handshake, Message};
use crate::constants::{
    HANDSHAKE_LEN, LENGTH_PREFIX_LEN, MAX_MESSAGE_SIZE, READ_BUFFER_CAPACITY, WRITE_TIMEOUT,
};
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Framed transport over a byte stream.
///
/// Used as a whole during the handshake, then split into a
/// [`MessageReader`] and a [`MessageWriter`] so a session can receive and
/// send concurrently.
pub struct PeerTransport<S = TcpStream> {
    stream: S,
    read_buf: BytesMut,
    max_message_size: usize,
}

impl<S> PeerTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            read_buf: BytesMut::with_capacity(READ_BUFFER_CAPACITY),
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }

    /// Sets the largest frame this transport will accept.
    pub fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    pub async fn send_handshake(&mut self, handshake: &Handshake) -> Result<(), PeerError> {
        let data = handshake.encode();
        timeout(WRITE_TIMEOUT, self.stream.write_all(&data))
            .await
            .map_err(|_| PeerError::Timeout)??;
        Ok(())
    }

    pub async fn receive_handshake(&mut self) -> Result<Handshake, PeerError> {
        fill_to(&mut self.stream, &mut self.read_buf, HANDSHAKE_LEN).await?;
        let data = self.read_buf.split_to(HANDSHAKE_LEN);
        Handshake::decode(&data)
    }

    pub async fn send_message(&mut self, message: &Message) -> Result<(), PeerError> {
        write_message(&mut self.stream, message).await
    }

    pub async fn receive_message(&mut self) -> Result<Message, PeerError> {
        read_message(&mut self.stream, &mut self.read_buf, self.max_message_size).await
    }

    /// Splits the transport into independent read and write halves.
    ///
    /// Bytes already buffered past the handshake stay with the reader.
    pub fn into_split(self) -> (MessageReader<ReadHalf<S>>, MessageWriter<WriteHalf<S>>) {
        let (read, write) = tokio::io::split(self.stream);
        (
            MessageReader {
                stream: read,
                read_buf: self.read_buf,
                max_message_size: self.max_message_size,
            },
            MessageWriter { stream: write },
        )
    }
}

/// Receiving half of a split [`PeerTransport`].
pub struct MessageReader<R> {
    stream: R,
    read_buf: BytesMut,
    max_message_size: usize,
}

impl<R: AsyncRead + Unpin> MessageReader<R> {
    pub async fn receive_message(&mut self) -> Result<Message, PeerError> {
        read_message(&mut self.stream, &mut self.read_buf, self.max_message_size).await
    }
}

/// Sending half of a split [`PeerTransport`].
pub struct MessageWriter<W> {
    stream: W,
}

impl<W: AsyncWrite + Unpin> MessageWriter<W> {
    pub async fn send_message(&mut self, message: &Message) -> Result<(), PeerError> {
        write_message(&mut self.stream, message).await
    }

    pub async fn shutdown(&mut self) -> Result<(), PeerError> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

async fn fill_to<R: AsyncRead + Unpin>(
    stream: &mut R,
    read_buf: &mut BytesMut,
    len: usize,
) -> Result<(), PeerError> {
    while read_buf.len() < len {
        let n = stream.read_buf(read_buf).await?;

        if n == 0 {
            return Err(PeerError::ConnectionClosed);
        }
    }
    Ok(())
}

async fn read_message<R: AsyncRead + Unpin>(
    stream: &mut R,
    read_buf: &mut BytesMut,
    max_message_size: usize,
) -> Result<Message, PeerError> {
    fill_to(stream, read_buf, LENGTH_PREFIX_LEN).await?;

    let length = u32::from_be_bytes([read_buf[0], read_buf[1], read_buf[2], read_buf[3]]) as usize;

    if length == 0 {
        return Err(PeerError::InvalidMessage("empty frame".into()));
    }

    if length > max_message_size {
        return Err(PeerError::InvalidMessage(format!(
            "message too large: {}",
            length
        )));
    }

    let total_len = LENGTH_PREFIX_LEN + length;
    fill_to(stream, read_buf, total_len).await?;

    let data = read_buf.split_to(total_len);
    Message::decode(data.freeze())
}

async fn write_message<W: AsyncWrite + Unpin>(
    stream: &mut W,
    message: &Message,
) -> Result<(), PeerError> {
    let data = message.encode();
    timeout(WRITE_TIMEOUT, stream.write_all(&data))
        .await
        .map_err(|_| PeerError::Timeout)??;
    Ok(())
}
