use crate::config::Roster;
use crate::peer::{Handshake, PeerError, PeerId, PeerTransport, SessionRegistry};
use tokio::io::{AsyncRead, AsyncWrite};

/// Outbound side: send our handshake, then validate the reply.
///
/// The reply must come from the peer we dialed.
pub(crate) async fn initiate<S>(
    transport: &mut PeerTransport<S>,
    local: PeerId,
    expected: PeerId,
    roster: &Roster,
) -> Result<PeerId, PeerError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    transport.send_handshake(&Handshake::new(local)).await?;
    let theirs = transport.receive_handshake().await?;
    validate(theirs.peer_id, local, roster)?;

    if theirs.peer_id != expected {
        return Err(PeerError::UnexpectedPeer {
            expected: expected.get(),
            got: theirs.peer_id.get(),
        });
    }

    Ok(theirs.peer_id)
}

/// Inbound side: validate the incoming handshake, then reply.
///
/// Nothing is written back to a peer whose handshake is rejected.
pub(crate) async fn accept<S>(
    transport: &mut PeerTransport<S>,
    local: PeerId,
    roster: &Roster,
    registry: &SessionRegistry,
) -> Result<PeerId, PeerError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let theirs = transport.receive_handshake().await?;
    validate(theirs.peer_id, local, roster)?;

    if registry.contains(theirs.peer_id) {
        return Err(PeerError::DuplicateSession(theirs.peer_id.get()));
    }

    transport.send_handshake(&Handshake::new(local)).await?;
    Ok(theirs.peer_id)
}

fn validate(id: PeerId, local: PeerId, roster: &Roster) -> Result<(), PeerError> {
    if id == local || !roster.contains(id) {
        return Err(PeerError::UnknownPeer(id.get()));
    }
    Ok(())
}
