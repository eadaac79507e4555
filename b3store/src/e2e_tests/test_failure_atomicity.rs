//! A set or delete that fails part way leaves the store exactly as it was.

use crate::config::StoreConfig;
use crate::e2e_tests::helpers::*;
use crate::error::StoreError;
use crate::simulation::{FaultConfig, SimulatedIo};
use crate::storage::StorageError;
use crate::store::Store;

const FAIL_READS: FaultConfig = FaultConfig {
    read_error_rate: 1.0,
    write_error_rate: 0.0,
    sync_error_rate: 0.0,
    corruption_rate: 0.0,
};

const FAIL_WRITES: FaultConfig = FaultConfig {
    read_error_rate: 0.0,
    write_error_rate: 1.0,
    sync_error_rate: 0.0,
    corruption_rate: 0.0,
};

/// A flushed order-4 tree of 200 keys with a single-node cache, so every
/// descent has to read pages.
fn populated() -> (SimulatedIo, Store<SimulatedIo>) {
    let (io, mut store) = sim_store_with(StoreConfig::new(4, 8, 16).with_cache_capacity(1));
    for k in 0..200 {
        store.set(&key(k * 2), &key(k)).expect("set");
    }
    store.flush().expect("flush");
    assert!(store.stats().height >= 3);
    (io, store)
}

#[test]
fn test_failed_insert_changes_nothing() {
    let (io, mut store) = populated();
    let before = store.stats();

    io.set_fault_config(FAIL_READS);
    let result = store.set(&key(201), b"new");
    io.set_fault_config(FaultConfig::default());

    assert!(matches!(
        result,
        Err(StoreError::Io(StorageError::InjectedFault(_)))
    ));
    assert_eq!(store.len(), 200);
    assert!(!store.contains(&key(201)).expect("contains"));
    let after = store.stats();
    assert_eq!(after.splits, before.splits);
    assert_eq!(after.pages, before.pages);
    assert_consistent(&mut store);

    // The same insert succeeds once the storage recovers
    store.set(&key(201), b"new").expect("set");
    assert_eq!(store.get(&key(201)).expect("get"), b"new");
}

#[test]
fn test_failed_delete_changes_nothing() {
    let (io, mut store) = populated();

    io.set_fault_config(FAIL_READS);
    assert!(store.delete(&key(100)).is_err());
    io.set_fault_config(FaultConfig::default());

    assert_eq!(store.len(), 200);
    assert_eq!(store.get(&key(100)).expect("get"), key(50));
    assert_consistent(&mut store);
}

#[test]
fn test_failed_flush_keeps_changes_in_memory() {
    let (io, mut store) = populated();

    // Sets never write, so only the flush sees the failing storage
    io.set_fault_config(FAIL_WRITES);
    for k in 0..20 {
        store.set(&key(k * 2 + 1), b"odd").expect("set");
    }
    assert!(store.flush().is_err());
    io.set_fault_config(FaultConfig::default());

    assert_eq!(store.len(), 220);
    assert_consistent(&mut store);
    store.flush().expect("flush");

    let mut reopened =
        Store::open_with_io(io.crash_image(), StoreConfig::default()).expect("reopen");
    assert_eq!(reopened.len(), 220);
    assert_eq!(reopened.get(&key(39)).expect("get"), b"odd");
    assert_consistent(&mut reopened);
}

#[test]
fn test_oversized_input_rejected_up_front() {
    let (_io, mut store) = populated();

    assert!(matches!(
        store.set(&[0u8; 9], b"v"),
        Err(StoreError::KeyTooLarge { len: 9, max: 8 })
    ));
    assert!(matches!(
        store.set(&key(1), &[0u8; 17]),
        Err(StoreError::ValueTooLarge { len: 17, max: 16 })
    ));
    assert_eq!(store.len(), 200);
}
