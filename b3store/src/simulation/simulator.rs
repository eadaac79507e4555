//! Randomized workload harness.
//!
//! Drives a store over `SimulatedIo` with a seeded stream of sets, deletes
//! and gets, flushing periodically, mirrors every successful operation in a `BTreeMap` model, and
//! checks the store against the model and the consistency checker as it
//! goes. Faults are injected only while operations run; checks run with
//! faults switched off so they see the store's real state.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::StoreError;
use crate::simulation::storage::{FaultConfig, SimulatedIo};
use crate::storage::btree::Direction;
use crate::store::Store;

/// Configuration for a simulation run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulatorConfig {
    /// Random seed for reproducibility.
    pub seed: u64,
    /// Keys are drawn from `0..key_space`, encoded as 4 big-endian bytes.
    pub key_space: u32,
    /// Percentage of operations that are sets; the rest are split between
    /// deletes and gets.
    pub set_percent: u32,
    /// Percentage of operations that are deletes.
    pub delete_percent: u32,
    /// Run the consistency checker every this many operations (0 = never).
    pub check_every: usize,
    /// Flush the store every this many operations (0 = never).
    pub flush_every: usize,
    /// Faults injected while operations run.
    pub fault_config: FaultConfig,
}

impl SimulatorConfig {
    /// Default mix: 55% sets, 35% deletes, 10% gets over 512 keys,
    /// checking after every operation and flushing every 64.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            key_space: 512,
            set_percent: 55,
            delete_percent: 35,
            check_every: 1,
            flush_every: 64,
            fault_config: FaultConfig::default(),
        }
    }

    /// Set the key space.
    #[must_use]
    pub const fn with_key_space(mut self, key_space: u32) -> Self {
        self.key_space = key_space;
        self
    }

    /// Set the check interval.
    #[must_use]
    pub const fn with_check_every(mut self, check_every: usize) -> Self {
        self.check_every = check_every;
        self
    }

    /// Set the flush interval.
    #[must_use]
    pub const fn with_flush_every(mut self, flush_every: usize) -> Self {
        self.flush_every = flush_every;
        self
    }

    /// Set the fault configuration.
    #[must_use]
    pub const fn with_fault_config(mut self, config: FaultConfig) -> Self {
        self.fault_config = config;
        self
    }
}

/// An invariant violation detected during simulation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvariantViolation {
    /// Operation index where it was detected.
    pub operation_index: usize,
    /// Description of the violation.
    pub description: String,
}

/// Results from a simulation run.
#[derive(Debug, Default)]
pub struct SimulationResult {
    /// The seed used for this run.
    pub seed: u64,
    /// Operations attempted.
    pub operations: usize,
    /// Operations and flushes that returned an error other than
    /// `KeyNotFound`.
    pub failed_operations: usize,
    /// Keys in the model at the end.
    pub live_keys: usize,
    /// Invariant violations detected.
    pub invariant_violations: Vec<InvariantViolation>,
}

impl SimulationResult {
    /// True if no invariant was violated.
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.invariant_violations.is_empty()
    }
}

/// The workload harness.
pub struct Simulator {
    config: SimulatorConfig,
    rng: StdRng,
    model: BTreeMap<Vec<u8>, Vec<u8>>,
    result: SimulationResult,
}

impl Simulator {
    /// Create a harness with an empty model.
    #[must_use]
    pub fn new(config: SimulatorConfig) -> Self {
        Self {
            config,
            rng: StdRng::seed_from_u64(config.seed),
            model: BTreeMap::new(),
            result: SimulationResult {
                seed: config.seed,
                ..SimulationResult::default()
            },
        }
    }

    /// The model of what the store should hold.
    #[must_use]
    pub const fn model(&self) -> &BTreeMap<Vec<u8>, Vec<u8>> {
        &self.model
    }

    /// Run `count` operations against `store`, whose storage is `io`.
    ///
    /// The store must start empty, and needs keys of at least 4 bytes and
    /// values of at least 8.
    pub fn run(
        &mut self,
        store: &mut Store<SimulatedIo>,
        io: &SimulatedIo,
        count: usize,
    ) -> SimulationResult {
        for _ in 0..count {
            let index = self.result.operations;
            self.result.operations += 1;

            io.set_fault_config(self.config.fault_config);
            self.step(store, index);
            let flush_every = self.config.flush_every;
            if flush_every > 0 && (index + 1) % flush_every == 0 && store.flush().is_err() {
                self.result.failed_operations += 1;
            }
            io.set_fault_config(FaultConfig::default());

            let every = self.config.check_every;
            if every > 0 && (index + 1) % every == 0 {
                self.check(store, index);
            }
        }

        self.check(store, self.result.operations);
        self.check_contents(store);
        self.result.live_keys = self.model.len();
        let result = std::mem::take(&mut self.result);
        self.result.seed = result.seed;
        self.result.operations = result.operations;
        result
    }

    fn step(&mut self, store: &mut Store<SimulatedIo>, index: usize) {
        let key = self
            .rng
            .random_range(0..self.config.key_space.max(1))
            .to_be_bytes()
            .to_vec();
        let roll = self.rng.random_range(0..100);

        if roll < self.config.set_percent {
            let value = (index as u64).to_le_bytes().to_vec();
            match store.set(&key, &value) {
                Ok(old) => {
                    let expected = self.model.insert(key, value);
                    if old != expected {
                        self.violation(index, format!("set returned {old:?}, expected {expected:?}"));
                    }
                }
                Err(_) => self.result.failed_operations += 1,
            }
        } else if roll < self.config.set_percent + self.config.delete_percent {
            match store.delete(&key) {
                Ok(value) => {
                    if self.model.remove(&key) != Some(value) {
                        self.violation(index, format!("delete of {key:02x?} returned wrong value"));
                    }
                }
                Err(StoreError::KeyNotFound(_)) => {
                    if self.model.contains_key(&key) {
                        self.violation(index, format!("delete missed live key {key:02x?}"));
                    }
                }
                Err(_) => self.result.failed_operations += 1,
            }
        } else {
            match store.get(&key) {
                Ok(value) => {
                    if self.model.get(&key) != Some(&value) {
                        self.violation(index, format!("get of {key:02x?} returned wrong value"));
                    }
                }
                Err(StoreError::KeyNotFound(_)) => {
                    if self.model.contains_key(&key) {
                        self.violation(index, format!("get missed live key {key:02x?}"));
                    }
                }
                Err(_) => self.result.failed_operations += 1,
            }
        }
    }

    fn check(&mut self, store: &mut Store<SimulatedIo>, index: usize) {
        for violation in store.check_consistency() {
            self.violation(index, violation.to_string());
        }
        if store.len() != self.model.len() as u64 {
            self.violation(
                index,
                format!("store has {} keys, model has {}", store.len(), self.model.len()),
            );
        }
    }

    fn check_contents(&mut self, store: &mut Store<SimulatedIo>) {
        let index = self.result.operations;
        let entries: Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> = store
            .entries(Direction::Forward)
            .and_then(Iterator::collect);

        match entries {
            Ok(entries) => {
                let expected: Vec<(Vec<u8>, Vec<u8>)> = self
                    .model
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                if entries != expected {
                    self.violation(index, "store contents differ from model".to_string());
                }
            }
            Err(e) => self.violation(index, format!("iteration failed: {e}")),
        }
    }

    fn violation(&mut self, operation_index: usize, description: String) {
        self.result.invariant_violations.push(InvariantViolation {
            operation_index,
            description,
        });
    }
}
