use super::*;
use bytes::Bytes;
use std::sync::Arc;
use tempfile::TempDir;

fn test_data(len: usize) -> Bytes {
    (0..len).map(|i| (i % 251) as u8).collect::<Vec<u8>>().into()
}

#[test]
fn test_piece_layout() {
    let store = PieceStore::new(16384, 40000).unwrap();

    assert_eq!(store.piece_count(), 3);
    assert_eq!(store.piece_length(0), 16384);
    assert_eq!(store.piece_length(1), 16384);
    assert_eq!(store.piece_length(2), 40000 - 2 * 16384);
    assert!(!store.is_complete());
}

#[test]
fn test_piece_layout_exact_multiple() {
    let store = PieceStore::new(10, 40).unwrap();
    assert_eq!(store.piece_count(), 4);
    assert_eq!(store.piece_length(3), 10);
}

#[test]
fn test_invalid_layout() {
    assert!(matches!(
        PieceStore::new(0, 10),
        Err(StorageError::InvalidLayout { .. })
    ));
    assert!(matches!(
        PieceStore::new(10, 0),
        Err(StorageError::InvalidLayout { .. })
    ));
}

#[test]
fn test_seeded_store_is_complete() {
    let data = test_data(1000);
    let store = PieceStore::seeded(data.clone(), 300).unwrap();

    assert!(store.is_complete());
    assert_eq!(store.piece_count(), 4);
    assert_eq!(store.get_piece(3).unwrap().len(), 100);
    assert_eq!(store.assemble().unwrap(), data);
}

#[test]
fn test_put_and_get_piece() {
    let store = PieceStore::new(4, 10).unwrap();

    assert!(!store.has_piece(1));
    assert!(matches!(
        store.get_piece(1),
        Err(StorageError::PieceNotFound(1))
    ));

    assert!(store.put_piece(1, Bytes::from_static(b"abcd")).unwrap());
    assert!(store.has_piece(1));
    assert_eq!(store.get_piece(1).unwrap().as_ref(), b"abcd");
    assert_eq!(store.owned_count(), 1);
}

#[test]
fn test_put_rejects_bad_index_and_length() {
    let store = PieceStore::new(4, 10).unwrap();

    assert!(matches!(
        store.put_piece(3, Bytes::from_static(b"ab")),
        Err(StorageError::InvalidPieceIndex(3))
    ));
    assert!(matches!(
        store.put_piece(2, Bytes::from_static(b"abcd")),
        Err(StorageError::InvalidPieceLength {
            piece: 2,
            expected: 2,
            got: 4
        })
    ));
    assert_eq!(store.owned_count(), 0);
}

#[test]
fn test_put_is_idempotent() {
    let seed = PieceStore::seeded(test_data(10), 4).unwrap();
    let store = PieceStore::new(4, 10).unwrap();
    for index in 0..3 {
        store.put_piece(index, seed.get_piece(index).unwrap()).unwrap();
    }
    assert!(store.is_complete());

    assert!(!store.put_piece(1, seed.get_piece(1).unwrap()).unwrap());

    assert!(store.is_complete());
    assert_eq!(store.get_piece(0).unwrap(), seed.get_piece(0).unwrap());
    assert_eq!(store.get_piece(2).unwrap(), seed.get_piece(2).unwrap());
    assert_eq!(store.assemble().unwrap(), seed.assemble().unwrap());
}

#[test]
fn test_has_piece_matches_content() {
    let store = PieceStore::new(4, 10).unwrap();
    store.put_piece(0, Bytes::from_static(b"abcd")).unwrap();
    store.put_piece(2, Bytes::from_static(b"ij")).unwrap();

    for index in 0..3 {
        assert_eq!(store.has_piece(index), store.get_piece(index).is_ok());
    }
}

#[test]
fn test_assemble_incomplete() {
    let store = PieceStore::new(4, 10).unwrap();
    store.put_piece(0, Bytes::from_static(b"abcd")).unwrap();

    assert!(matches!(
        store.assemble(),
        Err(StorageError::Incomplete { owned: 1, total: 3 })
    ));
}

#[test]
fn test_concurrent_puts() {
    let seed = Arc::new(PieceStore::seeded(test_data(64 * 100), 64).unwrap());
    let store = Arc::new(PieceStore::new(64, 64 * 100).unwrap());

    let handles: Vec<_> = (0..4u32)
        .map(|worker| {
            let seed = Arc::clone(&seed);
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for index in (worker..100).step_by(4) {
                    store.put_piece(index, seed.get_piece(index).unwrap()).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert!(store.is_complete());
    assert_eq!(store.assemble().unwrap(), seed.assemble().unwrap());
}

#[tokio::test]
async fn test_load_and_write_file() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("source.dat");
    let data = test_data(5000);
    tokio::fs::write(&source, &data).await.unwrap();

    let store = PieceStore::load(&source, 1024, 5000).await.unwrap();
    assert!(store.is_complete());
    assert_eq!(store.piece_count(), 5);

    let target = temp.path().join("peer_1002").join("copy.dat");
    store.write_file(&target).await.unwrap();

    let written = tokio::fs::read(&target).await.unwrap();
    assert_eq!(written, data.as_ref());
}

#[tokio::test]
async fn test_load_size_mismatch() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("source.dat");
    tokio::fs::write(&source, test_data(100)).await.unwrap();

    assert!(matches!(
        PieceStore::load(&source, 10, 200).await,
        Err(StorageError::FileSizeMismatch {
            expected: 200,
            found: 100
        })
    ));
}
