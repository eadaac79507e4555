//! Data, counters and geometry survive close and reopen on a real file.

use crate::Direction;
use crate::config::StoreConfig;
use crate::e2e_tests::helpers::*;

#[test]
fn test_reopen_sees_every_key() {
    let path = TempStorePath::new().expect("temp path");
    let before = {
        let mut store = path.create(small_config(5)).expect("create");
        for k in 0..400 {
            store.set(&key(k), &key(k ^ 0xFFFF)).expect("set");
        }
        for k in (0..400).step_by(4) {
            store.delete(&key(k)).expect("delete");
        }
        store.set(&key(1), b"updated").expect("set");
        let stats = store.stats();
        store.close().expect("close");
        stats
    };

    let mut store = path.open(small_config(5)).expect("open");
    assert_consistent(&mut store);
    assert_eq!(store.len(), 300);
    assert_eq!(store.get(&key(1)).expect("get"), b"updated");
    for k in (0..400).filter(|k| k % 4 != 0 && *k != 1) {
        assert_eq!(store.get(&key(k)).expect("get"), key(k ^ 0xFFFF));
    }
    for k in (0..400).step_by(4) {
        assert!(!store.contains(&key(k)).expect("contains"));
    }

    let after = store.stats();
    assert_eq!(after.splits, before.splits);
    assert_eq!(after.merges, before.merges);
    assert_eq!(after.rotations_left, before.rotations_left);
    assert_eq!(after.rotations_right, before.rotations_right);
    assert_eq!(after.height, before.height);
    assert_eq!(after.pages, before.pages);
}

#[test]
fn test_open_uses_geometry_from_file() {
    let path = TempStorePath::new().expect("temp path");
    path.create(StoreConfig::new(6, 12, 20))
        .expect("create")
        .close()
        .expect("close");

    let mut store = path.open(StoreConfig::default()).expect("open");
    assert_eq!(store.geometry().order(), 6);
    assert_eq!(store.geometry().key_size(), 12);
    assert_eq!(store.geometry().value_size(), 20);
    store.set(b"twelve bytes", &[1u8; 20]).expect("set");
}

#[test]
fn test_create_on_existing_file() {
    let path = TempStorePath::new().expect("temp path");
    {
        let mut store = path.create(small_config(4)).expect("create");
        store.set(&key(7), b"seven").expect("set");
    }

    let mut store = path.create(small_config(4)).expect("create again");
    assert_eq!(store.get(&key(7)).expect("get"), b"seven");
    drop(store);

    assert!(matches!(
        path.create(small_config(8)),
        Err(crate::error::StoreError::IncompatibleHeader { .. })
    ));
}

#[test]
fn test_open_missing_file_fails() {
    let path = TempStorePath::new().expect("temp path");
    assert!(matches!(
        path.open(StoreConfig::default()),
        Err(crate::error::StoreError::Io(_))
    ));
}

#[test]
fn test_multiple_sessions() {
    let path = TempStorePath::new().expect("temp path");
    path.create(small_config(4))
        .expect("create")
        .close()
        .expect("close");

    for session in 0..5u32 {
        let mut store = path.open(small_config(4)).expect("open");
        for k in 0..50 {
            store.set(&key(session * 50 + k), b"v").expect("set");
        }
        store.close().expect("close");
    }

    let mut store = path.open(small_config(4)).expect("open");
    assert_eq!(
        collect_keys(&mut store, Direction::Forward),
        (0..250).collect::<Vec<_>>()
    );
}
