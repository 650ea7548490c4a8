use super::dispatch::Dispatcher;
use super::*;
use crate::config::{CommonConfig, Roster};
use crate::peer::{Bitfield, Handshake};
use bytes::Bytes;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

const FILE_NAME: &str = "TheFile.dat";

fn common(file_size: u64, piece_size: u64) -> CommonConfig {
    format!(
        "NumberOfPreferredNeighbors 1\n\
         UnchokingInterval 1\n\
         OptimisticUnchokingInterval 1\n\
         FileName {}\n\
         FileSize {}\n\
         PieceSize {}\n",
        FILE_NAME, file_size, piece_size
    )
    .parse()
    .unwrap()
}

fn roster(peers: &[(u32, u16, bool)]) -> Roster {
    Roster::new(
        peers
            .iter()
            .map(|&(id, port, has_file)| PeerInfo::new(id, "127.0.0.1", port, has_file))
            .collect(),
    )
    .unwrap()
}

async fn bind() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

fn sample(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

fn seed_engine(id: u32, peers: &[(u32, u16, bool)], data: &[u8], piece_size: u64) -> Engine {
    let config = EngineConfig::new(
        PeerId::new(id),
        common(data.len() as u64, piece_size),
        roster(peers),
        ".",
    )
    .unwrap();
    let store = PieceStore::seeded(Bytes::copy_from_slice(data), piece_size).unwrap();
    Engine::with_store(config, store).unwrap()
}

fn leech_engine(file_size: u64, piece_size: u64, timeout: Duration) -> Engine {
    let config = EngineConfig::new(
        PeerId::new(1),
        common(file_size, piece_size),
        roster(&[(1, 7001, false), (2, 7002, true)]),
        ".",
    )
    .unwrap()
    .with_request_timeout(timeout);
    let store = PieceStore::new(piece_size, file_size).unwrap();
    Engine::with_store(config, store).unwrap()
}

fn attach_neighbor(
    engine: &Engine,
    id: u32,
    pieces: &[usize],
) -> (Arc<Session>, mpsc::UnboundedReceiver<Message>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let piece_count = engine.store().piece_count();
    let session = Arc::new(Session::new(PeerId::new(id), piece_count, tx));

    let mut bits = Bitfield::new(piece_count);
    for &piece in pieces {
        bits.set_piece(piece);
    }
    session.merge_bitfield(&bits);
    session.set_peer_choking(false);

    assert!(engine.registry().insert(Arc::clone(&session)));
    (session, rx)
}

#[tokio::test]
async fn test_two_peers_transfer_whole_file() {
    let temp = TempDir::new().unwrap();
    let data = sample(10_000);

    let (seed_listener, seed_port) = bind().await;
    let (leech_listener, leech_port) = bind().await;
    let peers = roster(&[(1001, seed_port, true), (1002, leech_port, false)]);

    let seed_config =
        EngineConfig::new(PeerId::new(1001), common(10_000, 1024), peers.clone(), temp.path())
            .unwrap();
    std::fs::create_dir_all(seed_config.peer_dir()).unwrap();
    std::fs::write(seed_config.file_path(), &data).unwrap();

    let leech_config =
        EngineConfig::new(PeerId::new(1002), common(10_000, 1024), peers, temp.path()).unwrap();
    let output = leech_config.file_path();

    let seed = Engine::new(seed_config).await.unwrap();
    let leech = Engine::new(leech_config).await.unwrap();
    assert!(seed.has_file());
    assert!(!leech.has_file());

    seed.start_with_listener(seed_listener).unwrap();
    leech.start_with_listener(leech_listener).unwrap();

    tokio::time::timeout(Duration::from_secs(30), leech.wait_for_file())
        .await
        .expect("leech never completed");
    tokio::time::timeout(Duration::from_secs(30), seed.wait_for_swarm())
        .await
        .expect("seed never saw the swarm complete");
    tokio::time::timeout(Duration::from_secs(30), leech.wait_for_swarm())
        .await
        .expect("leech never saw the swarm complete");

    assert!(leech.store().is_complete());
    assert_eq!(std::fs::read(&output).unwrap(), data);

    seed.shutdown().await;
    leech.shutdown().await;
    assert!(seed.registry().is_empty());
}

#[tokio::test]
async fn test_unknown_peer_handshake_closes_silently() {
    let (listener, port) = bind().await;
    let engine = seed_engine(1, &[(1, port, true), (2, 7002, false)], &sample(64), 16);
    let addr = engine.start_with_listener(listener).unwrap();

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(&Handshake::new(PeerId::new(99)).encode())
        .await
        .unwrap();

    let mut buf = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert!(buf.is_empty());
    assert!(engine.registry().is_empty());

    engine.shutdown().await;
}

#[tokio::test]
async fn test_duplicate_connection_is_rejected() {
    let (listener, port) = bind().await;
    let engine = seed_engine(1, &[(1, port, true), (2, 7002, false)], &sample(64), 16);
    let addr = engine.start_with_listener(listener).unwrap();

    let mut first = PeerTransport::new(TcpStream::connect(addr).await.unwrap());
    first
        .send_handshake(&Handshake::new(PeerId::new(2)))
        .await
        .unwrap();
    assert_eq!(
        first.receive_handshake().await.unwrap().peer_id,
        PeerId::new(1)
    );
    assert!(matches!(
        first.receive_message().await.unwrap(),
        Message::Bitfield(_)
    ));
    assert!(engine.registry().contains(PeerId::new(2)));

    let mut second = TcpStream::connect(addr).await.unwrap();
    second
        .write_all(&Handshake::new(PeerId::new(2)).encode())
        .await
        .unwrap();
    let mut buf = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), second.read_to_end(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert!(buf.is_empty());
    assert_eq!(engine.registry().len(), 1);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_seed_serves_unchoked_neighbor() {
    let data = sample(100);
    let (listener, port) = bind().await;
    let engine = seed_engine(1, &[(1, port, true), (2, 7002, false)], &data, 16);
    let addr = engine.start_with_listener(listener).unwrap();

    let mut client = PeerTransport::new(TcpStream::connect(addr).await.unwrap());
    client
        .send_handshake(&Handshake::new(PeerId::new(2)))
        .await
        .unwrap();
    client.receive_handshake().await.unwrap();

    match client.receive_message().await.unwrap() {
        Message::Bitfield(bits) => assert!(Bitfield::from_bytes(&bits, 7).is_complete()),
        other => panic!("expected bitfield, got {:?}", other),
    }

    client
        .send_message(&Message::Bitfield(Bitfield::new(7).to_bytes()))
        .await
        .unwrap();
    client.send_message(&Message::Interested).await.unwrap();

    assert_eq!(
        client.receive_message().await.unwrap(),
        Message::NotInterested
    );
    let unchoke = tokio::time::timeout(Duration::from_secs(5), client.receive_message())
        .await
        .expect("never unchoked");
    assert_eq!(unchoke.unwrap(), Message::Unchoke);

    client
        .send_message(&Message::Request { piece: 6 })
        .await
        .unwrap();
    assert_eq!(
        client.receive_message().await.unwrap(),
        Message::Piece {
            index: 6,
            data: Bytes::copy_from_slice(&data[96..])
        }
    );

    engine.shutdown().await;
}

#[tokio::test]
async fn test_expired_request_frees_piece() {
    let engine = leech_engine(160, 16, Duration::from_millis(50));
    let (session, mut rx) = attach_neighbor(&engine, 2, &[7]);
    let dispatcher = Dispatcher::new(&engine.swarm, &session);

    assert_eq!(dispatcher.request_next_piece().unwrap(), Some(7));
    assert_eq!(rx.try_recv().unwrap(), Message::Request { piece: 7 });
    assert!(engine.registry().requests().is_claimed(7));

    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(!engine.registry().requests().is_claimed(7));
    assert!(!session.has_pending_request(7));
    assert_eq!(dispatcher.request_next_piece().unwrap(), Some(7));
}

#[tokio::test]
async fn test_claimed_piece_is_not_requested_twice() {
    let engine = leech_engine(160, 16, Duration::from_secs(10));
    let (first, _rx1) = attach_neighbor(&engine, 2, &[3]);
    let (second, mut rx2) = attach_neighbor(&engine, 3, &[3]);

    assert_eq!(
        Dispatcher::new(&engine.swarm, &first)
            .request_next_piece()
            .unwrap(),
        Some(3)
    );
    assert_eq!(
        Dispatcher::new(&engine.swarm, &second)
            .request_next_piece()
            .unwrap(),
        None
    );
    assert!(rx2.try_recv().is_err());
}

#[tokio::test]
async fn test_piece_arrival_completes_request() {
    let engine = leech_engine(160, 16, Duration::from_millis(50));
    let (session, mut rx) = attach_neighbor(&engine, 2, &[7]);
    let dispatcher = Dispatcher::new(&engine.swarm, &session);

    dispatcher.request_next_piece().unwrap();
    assert_eq!(rx.try_recv().unwrap(), Message::Request { piece: 7 });

    dispatcher
        .dispatch(Message::Piece {
            index: 7,
            data: Bytes::from(vec![7u8; 16]),
        })
        .await
        .unwrap();

    assert!(engine.store().has_piece(7));
    assert!(!engine.registry().requests().is_claimed(7));
    assert_eq!(session.bytes_downloaded(), 16);
    assert_eq!(rx.try_recv().unwrap(), Message::Have { piece: 7 });
    assert_eq!(rx.try_recv().unwrap(), Message::NotInterested);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!session.has_pending_request(7));
    assert!(engine.registry().requests().is_empty());
}

#[tokio::test]
async fn test_request_from_choked_neighbor_is_ignored() {
    let data = sample(64);
    let engine = seed_engine(1, &[(1, 7001, true), (2, 7002, false)], &data, 16);
    let (session, mut rx) = attach_neighbor(&engine, 2, &[]);
    let dispatcher = Dispatcher::new(&engine.swarm, &session);

    dispatcher
        .dispatch(Message::Request { piece: 1 })
        .await
        .unwrap();
    assert!(rx.try_recv().is_err());

    session.unchoke().unwrap();
    assert_eq!(rx.try_recv().unwrap(), Message::Unchoke);
    dispatcher
        .dispatch(Message::Request { piece: 1 })
        .await
        .unwrap();
    assert_eq!(
        rx.try_recv().unwrap(),
        Message::Piece {
            index: 1,
            data: Bytes::copy_from_slice(&data[16..32])
        }
    );
}

#[tokio::test]
async fn test_have_updates_interest() {
    let engine = leech_engine(160, 16, Duration::from_secs(10));
    let (session, mut rx) = attach_neighbor(&engine, 2, &[]);
    let dispatcher = Dispatcher::new(&engine.swarm, &session);

    dispatcher.dispatch(Message::Have { piece: 4 }).await.unwrap();
    assert!(session.has_piece(4));
    assert_eq!(rx.try_recv().unwrap(), Message::Interested);

    assert!(matches!(
        dispatcher.dispatch(Message::Have { piece: 10 }).await,
        Err(PeerError::InvalidMessage(_))
    ));
}

#[tokio::test]
async fn test_missing_seed_file_fails_startup() {
    let temp = TempDir::new().unwrap();
    let config = EngineConfig::new(
        PeerId::new(1),
        common(100, 16),
        roster(&[(1, 7001, true)]),
        temp.path(),
    )
    .unwrap();

    assert!(matches!(
        Engine::new(config).await,
        Err(EngineError::Storage(_))
    ));
}

#[tokio::test]
async fn test_single_seed_is_immediately_complete() {
    let (listener, port) = bind().await;
    let engine = seed_engine(1, &[(1, port, true)], &sample(32), 16);

    engine.start_with_listener(listener).unwrap();
    assert!(engine.is_swarm_complete());

    let (again, _) = bind().await;
    assert!(matches!(
        engine.start_with_listener(again),
        Err(EngineError::AlreadyStarted)
    ));

    engine.shutdown().await;
}

#[tokio::test]
async fn test_choke_stops_follow_up_requests() {
    let engine = leech_engine(160, 16, Duration::from_secs(10));
    let (session, mut rx) = attach_neighbor(&engine, 2, &[3, 7]);
    let dispatcher = Dispatcher::new(&engine.swarm, &session);

    let first = dispatcher.request_next_piece().unwrap().unwrap();
    assert_eq!(rx.try_recv().unwrap(), Message::Request { piece: first });

    dispatcher.dispatch(Message::Choke).await.unwrap();
    assert!(session.peer_choking());

    dispatcher
        .dispatch(Message::Piece {
            index: first,
            data: Bytes::from(vec![1u8; 16]),
        })
        .await
        .unwrap();

    assert!(engine.store().has_piece(first));
    assert_eq!(rx.try_recv().unwrap(), Message::Have { piece: first });
    assert!(rx.try_recv().is_err());
    assert!(session.pending_requests().is_empty());
}

#[tokio::test]
async fn test_unchoke_requests_exactly_one_piece() {
    let engine = leech_engine(160, 16, Duration::from_secs(10));
    let (session, mut rx) = attach_neighbor(&engine, 2, &[5]);
    session.set_peer_choking(true);
    let dispatcher = Dispatcher::new(&engine.swarm, &session);

    dispatcher.dispatch(Message::Unchoke).await.unwrap();

    assert!(!session.peer_choking());
    assert_eq!(rx.try_recv().unwrap(), Message::Request { piece: 5 });
    assert!(rx.try_recv().is_err());
    assert_eq!(
        engine.registry().requests().claimed_by(5),
        Some(PeerId::new(2))
    );
    assert_eq!(session.pending_requests(), vec![5]);
}

#[tokio::test]
async fn test_bitfield_sets_interest() {
    let engine = leech_engine(160, 16, Duration::from_secs(10));
    engine
        .store()
        .put_piece(0, Bytes::from(vec![0u8; 16]))
        .unwrap();

    let (useful, mut useful_rx) = attach_neighbor(&engine, 2, &[]);
    let mut bits = Bitfield::new(10);
    bits.set_piece(0);
    bits.set_piece(4);
    Dispatcher::new(&engine.swarm, &useful)
        .dispatch(Message::Bitfield(bits.to_bytes()))
        .await
        .unwrap();
    assert!(useful.has_piece(4));
    assert_eq!(useful_rx.try_recv().unwrap(), Message::Interested);

    let (redundant, mut redundant_rx) = attach_neighbor(&engine, 3, &[]);
    let mut bits = Bitfield::new(10);
    bits.set_piece(0);
    Dispatcher::new(&engine.swarm, &redundant)
        .dispatch(Message::Bitfield(bits.to_bytes()))
        .await
        .unwrap();
    assert!(redundant.has_piece(0));
    assert_eq!(redundant_rx.try_recv().unwrap(), Message::NotInterested);
}

#[tokio::test]
async fn test_claim_skips_owned_piece() {
    let engine = leech_engine(160, 16, Duration::from_secs(10));
    let (session, _rx) = attach_neighbor(&engine, 2, &[4]);
    let dispatcher = Dispatcher::new(&engine.swarm, &session);

    engine
        .store()
        .put_piece(4, Bytes::from(vec![4u8; 16]))
        .unwrap();

    assert_eq!(dispatcher.claim(4), None);
    assert!(!engine.registry().requests().is_claimed(4));
    assert!(dispatcher.claim(5).is_some());
}

#[tokio::test]
async fn test_shutdown_flushes_queued_messages() {
    let (listener, port) = bind().await;
    let engine = seed_engine(1, &[(1, port, true), (2, 7002, false)], &sample(64), 16);
    let addr = engine.start_with_listener(listener).unwrap();

    let mut client = PeerTransport::new(TcpStream::connect(addr).await.unwrap());
    client
        .send_handshake(&Handshake::new(PeerId::new(2)))
        .await
        .unwrap();
    client.receive_handshake().await.unwrap();
    assert!(matches!(
        client.receive_message().await.unwrap(),
        Message::Bitfield(_)
    ));

    assert_eq!(engine.registry().broadcast(&Message::Have { piece: 3 }), 1);
    engine.shutdown().await;

    assert_eq!(
        client.receive_message().await.unwrap(),
        Message::Have { piece: 3 }
    );
    assert!(matches!(
        client.receive_message().await,
        Err(PeerError::ConnectionClosed)
    ));
    assert!(engine.registry().is_empty());
}

#[tokio::test]
async fn test_closed_connection_leaves_registry() {
    let (listener, port) = bind().await;
    let engine = seed_engine(1, &[(1, port, true), (2, 7002, false)], &sample(64), 16);
    let addr = engine.start_with_listener(listener).unwrap();

    let mut client = PeerTransport::new(TcpStream::connect(addr).await.unwrap());
    client
        .send_handshake(&Handshake::new(PeerId::new(2)))
        .await
        .unwrap();
    client.receive_handshake().await.unwrap();
    client.receive_message().await.unwrap();
    assert!(engine.registry().contains(PeerId::new(2)));

    drop(client);

    let gone = async {
        while engine.registry().contains(PeerId::new(2)) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(5), gone)
        .await
        .expect("session outlived its connection");

    engine.shutdown().await;
}
