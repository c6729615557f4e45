#![allow(missing_docs)]

use std::fs;
use std::path::PathBuf;

use penumbra::admin::recover_ids;
use penumbra::idgen::{
    read_header, IdOpenOptions, IdentifierSpace, DEFAULT_HIGH_ID_RESERVE, ID_HEADER_LEN,
};
use penumbra::primitives::io::StdFileIo;
use penumbra::storage::MemRecordStore;
use penumbra::types::{EntityKind, LabelId, PenumbraError, PropId, PropValue, StoreKind};
use tempfile::TempDir;

fn setup_ids(name: &str, high_id: u64) -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join(format!("{name}.id"));
    IdentifierSpace::create(&path, high_id).expect("create id file");
    (dir, path)
}

fn open(path: &PathBuf) -> IdentifierSpace {
    IdentifierSpace::open(path, IdOpenOptions::default()).expect("open id file")
}

#[test]
fn crash_after_freeing_discards_free_list() {
    let (_dir, path) = setup_ids("nodes", 20);
    {
        let mut space = open(&path);
        for id in 0..15 {
            space.free_id(id).expect("free id");
        }
        assert_eq!(space.free_count(), 15);
        // Dropped without close: the marker stays set.
    }

    let mut space = open(&path);
    assert!(!space.store_ok(), "unclean shutdown must be detected");
    assert_eq!(space.free_count(), 0);
    assert_eq!(space.high_id(), 20);

    space.delete_id_generator().expect("delete generator");
    space.make_store_ok().expect("make ok");
    assert!(space.store_ok());
    assert_eq!(space.next_id().expect("next id"), 20);
    assert_eq!(space.next_id().expect("next id"), 21);
    space.close().expect("close");

    let header = read_header(&StdFileIo::open(&path).expect("reopen file")).expect("header");
    assert!(!header.sticky);
    assert_eq!(header.high_id, 22);
    assert_eq!(header.free_count, 0);
}

#[test]
fn crash_after_clean_session_keeps_high_id() {
    let (_dir, path) = setup_ids("rels", 0);
    let mut space = open(&path);
    for expected in 0..5 {
        assert_eq!(space.next_id().expect("allocate"), expected);
    }
    space.free_id(3).expect("free");
    space.close().expect("close");

    {
        let mut space = open(&path);
        assert!(space.store_ok());
        assert_eq!(space.next_id().expect("reuse"), 3);
        assert_eq!(space.next_id().expect("allocate"), 5);
    }

    let space = open(&path);
    assert!(!space.store_ok());
    assert_eq!(space.high_id(), 6 + DEFAULT_HIGH_ID_RESERVE);
    drop(space);

    let space = IdentifierSpace::open(&path, IdOpenOptions::default().store_high_id(6))
        .expect("open with store high id");
    assert_eq!(space.high_id(), 6 + DEFAULT_HIGH_ID_RESERVE);
    drop(space);

    let space = IdentifierSpace::open(&path, IdOpenOptions::default().store_high_id(5_000))
        .expect("open with larger store high id");
    assert_eq!(space.high_id(), 5_000);
}

#[test]
fn crashed_session_allocations_are_never_reissued() {
    let (_dir, path) = setup_ids("nodes", 5);
    let live: Vec<u64> = {
        let mut space = open(&path);
        (0..3).map(|_| space.next_id().expect("allocate")).collect()
    };
    assert_eq!(live, vec![5, 6, 7]);

    let report = recover_ids(&path, None).expect("recover");
    assert!(!report.was_clean);
    assert!(report.high_id > 7, "recovered high id {}", report.high_id);

    let mut space = open(&path);
    assert!(space.store_ok());
    for _ in 0..8 {
        let id = space.next_id().expect("allocate");
        assert!(!live.contains(&id), "live id {id} handed out again");
    }
    space.close().expect("close");
}

#[test]
fn on_disk_high_id_stays_ahead_of_allocation() {
    let (_dir, path) = setup_ids("props", 0);
    let mut space = IdentifierSpace::open(&path, IdOpenOptions::default().high_id_reserve(4))
        .expect("open with small reserve");
    for _ in 0..10 {
        let id = space.next_id().expect("allocate");
        let header = read_header(&StdFileIo::open(&path).expect("second handle")).expect("header");
        assert!(header.sticky);
        assert!(header.high_id > id, "id {id} beyond on-disk high id {}", header.high_id);
    }
    space.delete_id_generator().expect("delete generator");
    let header = read_header(&StdFileIo::open(&path).expect("second handle")).expect("header");
    assert!(header.high_id >= space.high_id());
    space.close().expect("close");

    let header = read_header(&StdFileIo::open(&path).expect("second handle")).expect("header");
    assert!(!header.sticky);
    assert_eq!(header.high_id, 10);
}

#[test]
fn clean_close_round_trips_free_list() {
    let (_dir, path) = setup_ids("props", 12);
    let mut space = open(&path);
    for id in [9, 1, 4] {
        space.free_id(id).expect("free");
    }
    space.close().expect("close");

    let mut space = open(&path);
    assert!(space.store_ok());
    assert_eq!(space.free_count(), 3);
    assert!(space.is_free(4));
    assert_eq!(space.next_id().expect("next"), 1);
    assert_eq!(space.next_id().expect("next"), 4);
    assert_eq!(space.next_id().expect("next"), 9);
    assert_eq!(space.next_id().expect("next"), 12);
    space.close().expect("close");
}

#[test]
fn corrupt_header_is_fatal() {
    let (_dir, path) = setup_ids("nodes", 7);
    let mut bytes = fs::read(&path).expect("read file");
    assert_eq!(bytes.len(), ID_HEADER_LEN);
    bytes[20] ^= 0xFF;
    fs::write(&path, &bytes).expect("write file");

    let err = IdentifierSpace::open(&path, IdOpenOptions::default())
        .err()
        .expect("corrupt header must not open");
    assert!(matches!(err, PenumbraError::Corruption(_)), "got {err:?}");
}

#[test]
fn truncated_file_is_fatal() {
    let (_dir, path) = setup_ids("nodes", 7);
    fs::write(&path, [0u8; 5]).expect("truncate file");
    let err = IdentifierSpace::open(&path, IdOpenOptions::default())
        .err()
        .expect("truncated header must not open");
    assert!(matches!(err, PenumbraError::Corruption(_)), "got {err:?}");
}

#[test]
fn missing_file_is_not_found() {
    let dir = TempDir::new().expect("tempdir");
    let err = IdentifierSpace::open(dir.path().join("absent.id"), IdOpenOptions::default())
        .err()
        .expect("missing file");
    assert!(matches!(err, PenumbraError::NotFound(_)));
}

#[test]
fn rebuild_recovers_free_ids_from_store() {
    let mut store = MemRecordStore::new();
    for i in 0..8 {
        store.create_node(&[LabelId(1)], &[(PropId(1), PropValue::Int(i))]);
    }
    for id in [2, 5, 6] {
        assert!(store.delete_entity(EntityKind::Node, id));
    }

    let (_dir, path) = setup_ids("nodes", 8);
    {
        let mut space = open(&path);
        space.free_id(0).expect("free");
    }

    let mut space = open(&path);
    assert!(!space.store_ok());
    let found = space
        .rebuild_free_ids(&store, StoreKind::Node)
        .expect("rebuild");
    assert_eq!(found, 3);
    assert!(space.store_ok());
    assert!(!space.is_free(0), "in-use slot must never be freed");
    assert_eq!(space.next_id().expect("next"), 2);
    assert_eq!(space.next_id().expect("next"), 5);
    assert_eq!(space.next_id().expect("next"), 6);
    assert_eq!(space.next_id().expect("next"), 8);
    space.close().expect("close");
}

#[test]
fn rebuild_extends_high_id_to_store() {
    let mut store = MemRecordStore::new();
    for _ in 0..4 {
        store.create_relationship(LabelId(3), &[]);
    }
    store.delete_entity(EntityKind::Relationship, 3);

    let (_dir, path) = setup_ids("rels", 1);
    let mut space = open(&path);
    let found = space
        .rebuild_free_ids(&store, StoreKind::Relationship)
        .expect("rebuild");
    assert_eq!(found, 1);
    assert_eq!(space.high_id(), 4);
    assert!(space.is_free(3));
    space.close().expect("close");
}
