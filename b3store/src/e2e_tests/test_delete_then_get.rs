//! Deleted keys are gone and the tree stays consistent around each delete.

use crate::e2e_tests::helpers::*;
use crate::error::StoreError;

#[test]
fn test_deleted_keys_are_not_found() {
    let (_io, mut store) = sim_store(4);
    for k in 0..60 {
        store.set(&key(k), &key(k)).expect("set");
    }

    for k in (0..60).filter(|k| k % 3 == 0) {
        assert_consistent(&mut store);
        assert_eq!(store.delete(&key(k)).expect("delete"), key(k));
        assert_consistent(&mut store);

        assert!(matches!(
            store.get(&key(k)),
            Err(StoreError::KeyNotFound(missing)) if missing == key(k)
        ));
        assert!(!store.contains(&key(k)).expect("contains"));
    }

    assert_eq!(store.len(), 40);
    for k in (0..60).filter(|k| k % 3 != 0) {
        assert_eq!(store.get(&key(k)).expect("get"), key(k));
    }
}

#[test]
fn test_delete_missing_key_fails() {
    let (_io, mut store) = sim_store(4);
    store.set(&key(1), b"one").expect("set");

    assert!(matches!(
        store.delete(&key(2)),
        Err(StoreError::KeyNotFound(_))
    ));
    assert_eq!(store.len(), 1);

    store.delete(&key(1)).expect("delete");
    assert!(matches!(
        store.delete(&key(1)),
        Err(StoreError::KeyNotFound(_))
    ));
    assert!(store.is_empty());
    assert_consistent(&mut store);
}

#[test]
fn test_delete_everything_then_reuse() {
    let (_io, mut store) = sim_store(3);
    for round in 0..3 {
        for k in 0..100 {
            store.set(&key(k), &key(round)).expect("set");
        }
        for k in (0..100).rev() {
            store.delete(&key(k)).expect("delete");
        }
        assert!(store.is_empty());
        assert_eq!(store.stats().height, 1);
        assert_consistent(&mut store);
    }
}
