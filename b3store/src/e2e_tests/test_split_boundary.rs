//! Exactly `order + 1` keys into an empty tree cause exactly one split.

use crate::e2e_tests::helpers::*;

#[test]
fn test_order_plus_one_keys_split_once() {
    for order in [3, 4, 5, 8, 16] {
        let (_io, mut store) = sim_store(order);
        let order = u32::try_from(order).expect("small order");

        for k in 0..order {
            store.set(&key(k), b"v").expect("set");
        }
        let stats = store.stats();
        assert_eq!(stats.splits, 0, "order {order}");
        assert_eq!(stats.height, 1, "order {order}");

        store.set(&key(order), b"v").expect("set");
        let stats = store.stats();
        assert_eq!(stats.splits, 1, "order {order}");
        assert_eq!(stats.height, 2, "order {order}");
        assert_eq!(stats.nodes, 3, "order {order}");
        assert_consistent(&mut store);
    }
}

#[test]
fn test_root_split_grows_height() {
    let (_io, mut store) = sim_store(3);
    let mut height = 1;
    for k in 0..200 {
        store.set(&key(k), b"v").expect("set");
        let stats = store.stats();
        assert!(stats.height == height || stats.height == height + 1);
        height = stats.height;
    }
    assert!(height >= 4);
    assert_consistent(&mut store);
}
