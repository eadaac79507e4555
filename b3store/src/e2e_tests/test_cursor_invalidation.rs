//! Detached cursors detect structural changes made after they were created.

use crate::Direction;
use crate::e2e_tests::helpers::*;
use crate::error::StoreError;

fn assert_invalidated(result: Result<Option<Vec<u8>>, StoreError>) {
    assert!(
        matches!(result, Err(StoreError::CursorInvalidated { .. })),
        "{result:?}"
    );
}

#[test]
fn test_update_keeps_cursor_valid() {
    let (_io, mut store) = sim_store(4);
    for k in 0..20 {
        store.set(&key(k), b"old").expect("set");
    }

    let mut cursor = store.cursor(Direction::Forward).expect("cursor");
    assert_eq!(store.cursor_next(&mut cursor).expect("step"), Some(key(0)));

    store.set(&key(1), b"new").expect("update");
    assert_eq!(
        store.cursor_next_entry(&mut cursor).expect("step"),
        Some((key(1), b"new".to_vec()))
    );
}

#[test]
fn test_insert_invalidates_cursor() {
    let (_io, mut store) = sim_store(4);
    for k in 0..20 {
        store.set(&key(k * 2), b"v").expect("set");
    }

    let mut cursor = store.cursor_at(&key(10), Direction::Reverse).expect("cursor");
    assert_eq!(store.cursor_next(&mut cursor).expect("step"), Some(key(10)));

    store.set(&key(7), b"v").expect("insert");
    assert_invalidated(store.cursor_next(&mut cursor));
}

#[test]
fn test_delete_invalidates_cursor() {
    let (_io, mut store) = sim_store(4);
    for k in 0..20 {
        store.set(&key(k), b"v").expect("set");
    }

    let mut cursor = store.cursor(Direction::Forward).expect("cursor");
    store.delete(&key(19)).expect("delete");
    assert_invalidated(store.cursor_next(&mut cursor));

    // A fresh cursor sees the change
    let mut fresh = store.cursor(Direction::Reverse).expect("cursor");
    assert_eq!(store.cursor_next(&mut fresh).expect("step"), Some(key(18)));
}

#[test]
fn test_failed_mutations_keep_cursor_valid() {
    let (_io, mut store) = sim_store(4);
    for k in 0..10 {
        store.set(&key(k), b"v").expect("set");
    }

    let mut cursor = store.cursor(Direction::Forward).expect("cursor");
    assert!(matches!(
        store.delete(&key(99)),
        Err(StoreError::KeyNotFound(_))
    ));
    assert!(matches!(
        store.set(&[0u8; 9], b"v"),
        Err(StoreError::KeyTooLarge { .. })
    ));
    assert_eq!(store.cursor_next(&mut cursor).expect("step"), Some(key(0)));
}

#[test]
fn test_compaction_invalidates_cursor() {
    let config = small_config(4).with_shrink_threshold(1.0);
    let (_io, mut store) = sim_store_with(config);
    for k in 0..200 {
        store.set(&key(k), b"v").expect("set");
    }
    for k in 0..100 {
        store.delete(&key(k)).expect("delete");
    }

    let mut cursor = store.cursor(Direction::Forward).expect("cursor");
    assert!(store.compact().expect("compact") > 0);
    assert_invalidated(store.cursor_next(&mut cursor));
}

#[test]
fn test_exhausted_cursor_stays_done() {
    let (_io, mut store) = sim_store(4);
    store.set(&key(1), b"v").expect("set");

    let mut cursor = store.cursor(Direction::Forward).expect("cursor");
    assert_eq!(store.cursor_next(&mut cursor).expect("step"), Some(key(1)));
    assert_eq!(store.cursor_next(&mut cursor).expect("step"), None);
    assert!(cursor.is_done());
    assert_eq!(store.cursor_next(&mut cursor).expect("step"), None);
}
