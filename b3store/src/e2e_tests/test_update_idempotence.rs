//! Setting an existing key overwrites it in place.

use crate::e2e_tests::helpers::*;

#[test]
fn test_second_set_overwrites() {
    let (_io, mut store) = sim_store(4);
    for k in 0..10 {
        store.set(&key(k), b"first").expect("set");
    }
    let before = store.stats();

    assert_eq!(
        store.set(&key(5), b"second").expect("set"),
        Some(b"first".to_vec())
    );

    let after = store.stats();
    assert_eq!(store.len(), 10);
    assert_eq!(store.get(&key(5)).expect("get"), b"second");
    assert_eq!(after.splits, before.splits);
    assert_eq!(after.nodes, before.nodes);
    assert_consistent(&mut store);
}

#[test]
fn test_repeated_identical_sets() {
    let (_io, mut store) = sim_store(4);
    for _ in 0..5 {
        store.set(b"same", b"value").expect("set");
    }
    assert_eq!(store.len(), 1);
    assert_eq!(store.get(b"same").expect("get"), b"value");
}

#[test]
fn test_update_can_shrink_and_grow_value() {
    let (_io, mut store) = sim_store(4);
    store.set(b"k", &[7u8; 16]).expect("set");
    store.set(b"k", b"").expect("set");
    assert_eq!(store.get(b"k").expect("get"), Vec::<u8>::new());

    store.set(b"k", &[9u8; 16]).expect("set");
    assert_eq!(store.get(b"k").expect("get"), vec![9u8; 16]);
}
