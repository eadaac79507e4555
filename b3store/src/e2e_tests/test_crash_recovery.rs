//! After a crash only what was flushed survives, and it is consistent.
//!
//! A power loss keeps only synced data (`crash_image`). A process crash
//! keeps every write the store issued (`process_crash_image`, or a real file
//! whose store is never dropped).

use crate::Direction;
use crate::e2e_tests::helpers::*;
use crate::storage::PageIo;
use crate::store::Store;

#[test]
fn test_crash_loses_only_unflushed_work() {
    let (io, mut store) = sim_store(4);
    for k in 0..150 {
        store.set(&key(k), b"a").expect("set");
    }
    store.flush().expect("flush");

    // Many more nodes change than the cache holds
    for k in 150..300 {
        store.set(&key(k), b"b").expect("set");
    }
    for k in 0..50 {
        store.delete(&key(k)).expect("delete");
    }

    let mut recovered = Store::open_with_io(io.crash_image(), small_config(4)).expect("reopen");
    assert_consistent(&mut recovered);
    assert_eq!(recovered.len(), 150);
    assert_eq!(
        collect_keys(&mut recovered, Direction::Forward),
        (0..150).collect::<Vec<_>>()
    );
    assert_eq!(recovered.get(&key(0)).expect("get"), b"a");
}

#[test]
fn test_crash_before_any_flush_leaves_empty_store() {
    let (io, mut store) = sim_store(4);
    for k in 0..40 {
        store.set(&key(k), b"lost").expect("set");
    }

    let mut recovered = Store::open_with_io(io.crash_image(), small_config(4)).expect("reopen");
    assert!(recovered.is_empty());
    assert_consistent(&mut recovered);
}

#[test]
fn test_repeated_flush_and_crash() {
    let (io, mut store) = sim_store(5);
    for round in 0..5u32 {
        for k in round * 40..(round + 1) * 40 {
            store.set(&key(k), &round.to_le_bytes()).expect("set");
        }
        for k in (0..round * 40).step_by(3) {
            let _ = store.delete(&key(k));
        }
        store.flush().expect("flush");

        let mut recovered =
            Store::open_with_io(io.crash_image(), small_config(5)).expect("reopen");
        assert_consistent(&mut recovered);
        assert_eq!(recovered.len(), store.len());
        assert_eq!(
            collect_keys(&mut recovered, Direction::Forward),
            collect_keys(&mut store, Direction::Forward)
        );
    }
}

/// Flush 150 keys, then split, merge and free pages well past the cache
/// capacity without flushing again.
fn churn_after_flush<I: PageIo>(store: &mut Store<I>) {
    for k in 0..150 {
        store.set(&key(k), b"a").expect("set");
    }
    store.flush().expect("flush");

    for k in 150..300 {
        store.set(&key(k), b"b").expect("set");
    }
    for k in 0..50 {
        store.delete(&key(k)).expect("delete");
    }
}

#[test]
fn test_process_crash_keeps_last_flush() {
    let (io, mut store) = sim_store(4);
    churn_after_flush(&mut store);

    let mut recovered =
        Store::open_with_io(io.process_crash_image(), small_config(4)).expect("reopen");
    assert_consistent(&mut recovered);
    assert_eq!(
        collect_keys(&mut recovered, Direction::Forward),
        (0..150).collect::<Vec<_>>()
    );
    assert_eq!(recovered.get(&key(100)).expect("get"), b"a");
}

#[test]
fn test_unflushed_changes_never_reach_storage() {
    let (io, mut store) = sim_store(4);
    for k in 0..150 {
        store.set(&key(k), b"a").expect("set");
    }
    store.flush().expect("flush");
    let flushed = io.image();
    let writes = io.stats().writes;

    for k in 150..300 {
        store.set(&key(k), b"b").expect("set");
    }
    for k in 0..50 {
        store.delete(&key(k)).expect("delete");
    }
    assert_eq!(io.stats().writes, writes);
    assert_eq!(io.image(), flushed);

    store.flush().expect("flush");
    assert_ne!(io.image(), flushed);
}

#[test]
fn test_abandoned_file_store_reopens_at_last_flush() {
    let path = TempStorePath::new().expect("temp path");
    let mut store = path.create(small_config(4)).expect("create");
    churn_after_flush(&mut store);

    // Skip the flush on drop, as a killed process would
    std::mem::forget(store);

    let mut reopened = path.open(small_config(4)).expect("reopen");
    assert_consistent(&mut reopened);
    assert_eq!(reopened.len(), 150);
    assert_eq!(
        collect_keys(&mut reopened, Direction::Forward),
        (0..150).collect::<Vec<_>>()
    );
}
