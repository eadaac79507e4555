//! Deleting one key below `min_keys` in a two-leaf tree repairs the
//! underflow with exactly one merge or rotation.

use crate::Direction;
use crate::e2e_tests::helpers::*;
use crate::simulation::SimulatedIo;
use crate::store::Store;

/// Two leaves after `order + 1` ascending inserts: the left one holds
/// `(order + 1) / 2` keys.
fn two_leaf_store(order: usize) -> (SimulatedIo, Store<SimulatedIo>) {
    let (io, mut store) = sim_store(order);
    for k in 0..=u32::try_from(order).expect("small order") {
        store.set(&key(k), b"v").expect("set");
    }
    assert_eq!(store.stats().nodes, 3);
    (io, store)
}

#[test]
fn test_underflow_repaired_once() {
    for order in [3, 4, 5, 6, 9] {
        let (_io, mut store) = two_leaf_store(order);
        let min_keys = store.geometry().min_keys();
        let left_len = (order + 1) / 2;

        // Drain the left leaf down to min_keys without any repair
        let mut next = 0u32;
        for _ in min_keys..left_len {
            store.delete(&key(next)).expect("delete");
            next += 1;
        }
        let stats = store.stats();
        assert_eq!(stats.merges + stats.rotations(), 0, "order {order}");

        // One more goes below min_keys
        store.delete(&key(next)).expect("delete");
        let stats = store.stats();
        assert_eq!(stats.merges + stats.rotations(), 1, "order {order}");
        assert_consistent(&mut store);
    }
}

#[test]
fn test_rotation_from_right_sibling() {
    // Order 5: leaves [0, 1, 2] and [3, 4, 5], min_keys 2
    let (_io, mut store) = two_leaf_store(5);
    store.set(&key(6), b"v").expect("set");

    store.delete(&key(0)).expect("delete");
    store.delete(&key(1)).expect("delete");

    let stats = store.stats();
    assert_eq!(stats.rotations_left, 1);
    assert_eq!(stats.rotations_right, 0);
    assert_eq!(stats.merges, 0);
    assert_eq!(stats.nodes, 3);
    assert_consistent(&mut store);
}

#[test]
fn test_rotation_from_left_sibling() {
    // Order 5: leaves [0, 1, 2] and [3, 4, 5], min_keys 2
    let (_io, mut store) = two_leaf_store(5);
    store.delete(&key(5)).expect("delete");
    store.delete(&key(4)).expect("delete");

    let stats = store.stats();
    assert_eq!(stats.rotations_right, 1);
    assert_eq!(stats.merges, 0);
    assert_eq!(collect_keys(&mut store, Direction::Forward), vec![0, 1, 2, 3]);
    assert_consistent(&mut store);
}

#[test]
fn test_merge_collapses_root() {
    // Order 4: leaves [0, 1] and [2, 3, 4], min_keys 1
    let (_io, mut store) = two_leaf_store(4);
    store.delete(&key(4)).expect("delete");
    store.delete(&key(3)).expect("delete");
    // Right leaf holds [2] at min_keys; emptying the left forces a merge
    store.delete(&key(0)).expect("delete");
    store.delete(&key(1)).expect("delete");

    let stats = store.stats();
    assert_eq!(stats.merges, 1);
    assert_eq!(stats.height, 1);
    assert_eq!(stats.nodes, 1);
    assert_eq!(store.get(&key(2)).expect("get"), b"v");
    assert_consistent(&mut store);
}
