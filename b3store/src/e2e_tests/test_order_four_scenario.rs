//! Order 4: insert 1..=10, then delete 1..=9 down to a single leaf.

use crate::Direction;
use crate::e2e_tests::helpers::*;

#[test]
fn test_order_four_insert_then_drain() {
    let (_io, mut store) = sim_store(4);

    for k in 1..=10 {
        store.set(&key(k), &key(k * 100)).expect("set");
    }
    let stats = store.stats();
    assert!(stats.splits >= 2, "splits: {}", stats.splits);
    assert!(stats.height >= 2, "height: {}", stats.height);
    assert_eq!(
        collect_keys(&mut store, Direction::Forward),
        (1..=10).collect::<Vec<_>>()
    );
    assert_consistent(&mut store);

    for k in 1..=9 {
        store.delete(&key(k)).expect("delete");
        assert_consistent(&mut store);
    }

    let stats = store.stats();
    assert_eq!(stats.keys, 1);
    assert_eq!(stats.height, 1);
    assert_eq!(store.get(&key(10)).expect("get"), key(1000));
    assert_eq!(collect_keys(&mut store, Direction::Reverse), vec![10]);
}
