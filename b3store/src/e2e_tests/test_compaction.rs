//! Compaction fills free holes from the end of the file and truncates it.

use crate::Direction;
use crate::config::StoreConfig;
use crate::e2e_tests::helpers::*;
use crate::storage::{HEADER_SIZE, PageIo};
use crate::store::Store;

/// Never shrink automatically, so deletes leave holes behind.
fn config() -> StoreConfig {
    StoreConfig::new(4, 8, 16)
        .with_cache_capacity(8)
        .with_shrink_threshold(1.0)
}

#[test]
fn test_compact_removes_every_free_page() {
    let (io, mut store) = sim_store_with(config());
    for k in 0..400 {
        store.set(&key(k), &key(k)).expect("set");
    }
    for k in 0..400 {
        if k % 7 != 0 {
            store.delete(&key(k)).expect("delete");
        }
    }
    let before = store.stats();
    assert!(before.free_pages > 0);

    let removed = store.compact().expect("compact");
    let after = store.stats();
    assert_eq!(removed, before.pages - after.pages);
    assert_eq!(after.free_pages, 0);
    assert_eq!(after.pages, after.nodes);
    assert_eq!(after.nodes, before.nodes);
    assert_consistent(&mut store);

    let expected: Vec<u32> = (0..400).filter(|k| k % 7 == 0).collect();
    assert_eq!(collect_keys(&mut store, Direction::Forward), expected);
    assert_eq!(collect_keys(&mut store, Direction::Reverse).len(), expected.len());

    store.flush().expect("flush");
    let page_size = store.geometry().page_size() as u64;
    assert_eq!(
        io.size().expect("size"),
        HEADER_SIZE as u64 + after.pages * page_size
    );

    let mut reopened = Store::open_with_io(io.crash_image(), config()).expect("reopen");
    assert_consistent(&mut reopened);
    assert_eq!(reopened.len(), expected.len() as u64);
}

#[test]
fn test_compact_on_tight_store_is_noop() {
    let (_io, mut store) = sim_store_with(config());
    for k in 0..50 {
        store.set(&key(k), b"v").expect("set");
    }
    let before = store.stats();

    assert_eq!(store.compact().expect("compact"), 0);
    assert_eq!(store.stats().pages, before.pages);
    assert_consistent(&mut store);
}

#[test]
fn test_store_keeps_working_after_compaction() {
    let (_io, mut store) = sim_store_with(config());
    for k in 0..200 {
        store.set(&key(k), b"v").expect("set");
    }
    for k in 50..150 {
        store.delete(&key(k)).expect("delete");
    }
    store.compact().expect("compact");

    for k in 50..150 {
        store.set(&key(k), b"back").expect("set");
    }
    assert_eq!(store.len(), 200);
    assert_eq!(store.get(&key(99)).expect("get"), b"back");
    assert_consistent(&mut store);
}
