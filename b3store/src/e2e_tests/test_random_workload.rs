//! Long seeded workloads of mixed sets, deletes and gets, checked against a
//! `BTreeMap` model and the consistency checker after every operation.

use crate::config::StoreConfig;
use crate::e2e_tests::helpers::*;
use crate::simulation::{FaultConfig, Simulator, SimulatorConfig};
use crate::storage::StatsSnapshot;

fn run(order: usize, seed: u64, key_space: u32, operations: usize) -> StatsSnapshot {
    let (io, mut store) = sim_store_with(StoreConfig::new(order, 4, 8).with_cache_capacity(6));
    let mut sim = Simulator::new(SimulatorConfig::new(seed).with_key_space(key_space));

    let result = sim.run(&mut store, &io, operations);
    assert!(
        result.passed(),
        "seed {seed}: {:#?}",
        &result.invariant_violations[..result.invariant_violations.len().min(5)]
    );
    assert_eq!(result.failed_operations, 0);

    let stats = store.stats();
    assert_eq!(stats.keys, sim.model().len() as u64);
    stats
}

#[test]
fn test_ten_thousand_ops_order_three() {
    let stats = run(3, 0x5eed, 400, 10_000);
    assert!(stats.splits > 0 && stats.merges > 0 && stats.rotations() > 0);
}

#[test]
fn test_ten_thousand_ops_order_four() {
    let stats = run(4, 42, 300, 10_000);
    assert!(stats.splits > 0 && stats.merges > 0 && stats.rotations() > 0);
}

#[test]
fn test_wider_order() {
    let stats = run(16, 7, 2_000, 5_000);
    assert!(stats.height >= 2);
}

#[test]
fn test_long_workload_under_rare_faults() {
    let (io, mut store) = sim_store_with(StoreConfig::new(5, 4, 8).with_cache_capacity(4));
    let mut sim = Simulator::new(
        SimulatorConfig::new(2024)
            .with_key_space(500)
            .with_fault_config(FaultConfig::low_faults()),
    );

    let result = sim.run(&mut store, &io, 5_000);
    assert!(result.passed(), "{:#?}", result.invariant_violations);
    assert_eq!(store.len(), sim.model().len() as u64);
}

#[test]
fn test_workload_under_injected_faults() {
    let (io, mut store) = sim_store_with(StoreConfig::new(4, 4, 8).with_cache_capacity(3));
    let faults = FaultConfig {
        read_error_rate: 0.02,
        write_error_rate: 0.02,
        ..FaultConfig::default()
    };
    let mut sim = Simulator::new(
        SimulatorConfig::new(99)
            .with_key_space(200)
            .with_fault_config(faults),
    );

    let result = sim.run(&mut store, &io, 3_000);
    assert!(result.passed(), "{:#?}", result.invariant_violations);
    assert!(result.failed_operations > 0);
    assert_eq!(store.len(), sim.model().len() as u64);
}
