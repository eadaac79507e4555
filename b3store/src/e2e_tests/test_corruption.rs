//! Damaged files are reported, never silently read.

use crate::Direction;
use crate::config::StoreConfig;
use crate::e2e_tests::helpers::*;
use crate::error::StoreError;
use crate::simulation::SimulatedIo;
use crate::storage::btree::ConsistencyViolation;
use crate::storage::{HEADER_SIZE, HeaderError, PageIo};
use crate::store::Store;

/// A closed store of 100 keys. The first page is the leftmost leaf.
fn closed_store() -> SimulatedIo {
    let (io, mut store) = sim_store(4);
    for k in 0..100 {
        store.set(&key(k), &key(k)).expect("set");
    }
    store.close().expect("close");
    io
}

#[test]
fn test_verify_on_open_reports_damaged_page() {
    let io = closed_store();
    io.corrupt(HEADER_SIZE + 20, 0xFF);

    match Store::open_with_io(io.crash_image(), small_config(4)) {
        Err(StoreError::Inconsistent(violations)) => {
            assert!(
                violations
                    .iter()
                    .any(|v| matches!(v, ConsistencyViolation::UnreadablePage { .. })),
                "{violations:?}"
            );
        }
        Err(e) => panic!("unexpected error: {e}"),
        Ok(_) => panic!("damaged store opened cleanly"),
    }
}

#[test]
fn test_damaged_page_fails_reads_through_it() {
    let io = closed_store();
    io.corrupt(HEADER_SIZE + 20, 0xFF);
    let config = small_config(4).with_verify_on_open(false);
    let mut store = Store::open_with_io(io.crash_image(), config).expect("open");

    let forward: Result<Vec<Vec<u8>>, StoreError> =
        store.iter(Direction::Forward).and_then(Iterator::collect);
    assert!(matches!(forward, Err(StoreError::CorruptPage { .. })));
    assert!(matches!(
        store.get(&key(0)),
        Err(StoreError::CorruptPage { .. })
    ));

    // Leaves away from the damage are still readable
    assert_eq!(store.get(&key(99)).expect("get"), key(99));
    assert!(!store.check_consistency().is_empty());
}

#[test]
fn test_damaged_header_is_rejected() {
    let io = closed_store();
    io.corrupt(40, 0x01);

    assert!(matches!(
        Store::open_with_io(io.crash_image(), small_config(4)),
        Err(StoreError::CorruptHeader(HeaderError::ChecksumMismatch { .. }))
    ));
}

#[test]
fn test_truncated_file_is_rejected() {
    let io = closed_store();
    let mut truncated = io.crash_image();
    truncated.set_len(100).expect("truncate");

    assert!(matches!(
        Store::open_with_io(truncated, small_config(4)),
        Err(StoreError::CorruptHeader(HeaderError::Truncated(100)))
    ));
}

#[test]
fn test_wrong_geometry_is_rejected_on_create() {
    let io = closed_store();
    let other = StoreConfig::new(8, 8, 16);

    assert!(matches!(
        Store::create_with_io(io.crash_image(), other),
        Err(StoreError::IncompatibleHeader { .. })
    ));
}
