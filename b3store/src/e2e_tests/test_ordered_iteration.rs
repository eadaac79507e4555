//! Forward iteration is strictly increasing and reverse is its mirror.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::Direction;
use crate::e2e_tests::helpers::*;

#[test]
fn test_shuffled_inserts_iterate_in_order() {
    let (_io, mut store) = sim_store(5);
    let mut keys: Vec<u32> = (0..500).collect();
    keys.shuffle(&mut StdRng::seed_from_u64(11));

    for &k in &keys {
        store.set(&key(k), b"v").expect("set");
    }

    let forward = collect_keys(&mut store, Direction::Forward);
    assert_eq!(forward, (0..500).collect::<Vec<_>>());

    let mut reverse = collect_keys(&mut store, Direction::Reverse);
    reverse.reverse();
    assert_eq!(reverse, forward);
}

#[test]
fn test_iteration_is_restartable() {
    let (_io, mut store) = sim_store(4);
    for k in 0..20 {
        store.set(&key(k), &key(k * 10)).expect("set");
    }

    let first = collect_keys(&mut store, Direction::Forward);
    let second = collect_keys(&mut store, Direction::Forward);
    assert_eq!(first, second);

    let entries: Vec<(Vec<u8>, Vec<u8>)> = store
        .entries(Direction::Reverse)
        .expect("entries")
        .take(2)
        .collect::<Result<_, _>>()
        .expect("entries");
    assert_eq!(entries, vec![(key(19), key(190)), (key(18), key(180))]);
}

#[test]
fn test_range_from_both_directions() {
    let (_io, mut store) = sim_store(4);
    for k in (0..100).step_by(5) {
        store.set(&key(k), b"v").expect("set");
    }

    let up: Vec<u32> = store
        .range_from(&key(42), Direction::Forward)
        .expect("range")
        .map(|k| key_value(&k.expect("step")).expect("key"))
        .collect();
    assert_eq!(up, vec![45, 50, 55, 60, 65, 70, 75, 80, 85, 90, 95]);

    let down: Vec<u32> = store
        .range_from(&key(15), Direction::Reverse)
        .expect("range")
        .map(|k| key_value(&k.expect("step")).expect("key"))
        .collect();
    assert_eq!(down, vec![15, 10, 5, 0]);
}

#[test]
fn test_empty_store_iterates_nothing() {
    let (_io, mut store) = sim_store(4);
    assert!(collect_keys(&mut store, Direction::Forward).is_empty());
    assert!(collect_keys(&mut store, Direction::Reverse).is_empty());
}
